use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::agents::{AgentManager, AgentRegistry, AgentServices};
use crate::cache::AnalysisCache;
use crate::config::{parse_config, GitMentorConfig};
use crate::db::Database;
use crate::errors::AgentError;
use crate::llm::create_provider;
use crate::pipeline::{MemoryStorage, QualityController, StorageSink};
use crate::prompts::PromptLibrary;

/// Everything a command needs, built from one config file.
pub struct System {
    pub config: GitMentorConfig,
    pub manager: Arc<AgentManager>,
    pub controller: Arc<QualityController>,
}

pub async fn load(config_path: &str) -> Result<GitMentorConfig, AgentError> {
    parse_config(Path::new(config_path)).await
}

/// Completion clients and prompt templates named by the config.
pub fn build_services(config: &GitMentorConfig) -> Result<Arc<AgentServices>, AgentError> {
    let prompts = match &config.prompts_dir {
        Some(dir) => PromptLibrary::with_overrides(dir)?,
        None => PromptLibrary::builtin(),
    };

    let mut services = AgentServices::new(prompts);
    for client in &config.llm.clients {
        let provider = create_provider(
            &client.name,
            &client.provider,
            client.api_key.as_deref().unwrap_or_default(),
            client.model.as_deref(),
            client.base_url.as_deref(),
        )?;
        services = services.with_provider(&client.name, Arc::from(provider));
    }
    Ok(Arc::new(services))
}

/// Manager with every configured agent created. Workers are not started.
pub fn build_manager(config: &GitMentorConfig, services: Arc<AgentServices>) -> Result<AgentManager, AgentError> {
    let manager = AgentManager::new(config.manager.clone(), AgentRegistry::with_builtin(services));
    for spec in &config.agents {
        manager.create_agent(&spec.id, &spec.agent_type, spec.config.clone())?;
    }
    if config.agents.is_empty() {
        warn!("No agents configured");
    }
    Ok(manager)
}

pub fn build_sink(config: &GitMentorConfig) -> Result<Arc<dyn StorageSink>, AgentError> {
    match &config.storage.database {
        Some(path) => {
            info!(path = %path.display(), "Storing decided commits in SQLite");
            Ok(Arc::new(Database::new(path)?))
        }
        None => Ok(Arc::new(MemoryStorage::new())),
    }
}

/// The controller calls agents directly, so the manager's worker pool stays idle.
pub async fn build_system(config: GitMentorConfig) -> Result<System, AgentError> {
    let services = build_services(&config)?;
    let manager = Arc::new(build_manager(&config, services)?);

    let mut controller = QualityController::new(config.pipeline.clone(), manager.clone(), build_sink(&config)?);
    if config.cache.enabled {
        controller = controller.with_cache(Arc::new(AnalysisCache::new(&config.cache)));
    }

    Ok(System {
        config,
        manager,
        controller: Arc::new(controller),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_system_leaves_worker_pool_idle() {
        let system = build_system(GitMentorConfig::default()).await.unwrap();
        assert_eq!(system.manager.running_workers(), 0);
        assert!(system.manager.list_agents().is_empty());

        system.manager.shutdown().await;
        assert!(system.manager.is_shut_down());
    }
}
