use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::AgentError;
use crate::llm::LLMProvider;
use crate::prompts::PromptLibrary;
use super::analyzer::CommitAnalyzer;
use super::base::Agent;
use super::reviewer::QualityReviewer;

pub const ANALYZER_TYPE: &str = "analyzer";
pub const REVIEWER_TYPE: &str = "reviewer";

/// Shared collaborators handed to built-in agents: named completion clients
/// and the prompt templates.
#[derive(Clone)]
pub struct AgentServices {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    prompts: Arc<PromptLibrary>,
}

impl AgentServices {
    pub fn new(prompts: PromptLibrary) -> Self {
        Self {
            providers: HashMap::new(),
            prompts: Arc::new(prompts),
        }
    }

    pub fn with_provider(mut self, name: &str, provider: Arc<dyn LLMProvider>) -> Self {
        self.providers.insert(name.to_string(), provider);
        self
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn LLMProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }
}

impl std::fmt::Debug for AgentServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentServices")
            .field("providers", &self.provider_names())
            .finish()
    }
}

/// Builds a fresh, unconfigured agent behaviour.
pub type AgentFactory = Arc<dyn Fn() -> Box<dyn Agent> + Send + Sync>;

/// Type tag → constructor map used by the manager's `create_agent`.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    factories: HashMap<String, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the `analyzer` and `reviewer` types.
    pub fn with_builtin(services: Arc<AgentServices>) -> Self {
        let mut registry = Self::new();
        let analyzer_services = services.clone();
        registry.register(
            ANALYZER_TYPE,
            Arc::new(move || Box::new(CommitAnalyzer::new(analyzer_services.clone())) as Box<dyn Agent>),
        );
        registry.register(
            REVIEWER_TYPE,
            Arc::new(move || Box::new(QualityReviewer::new(services.clone())) as Box<dyn Agent>),
        );
        registry
    }

    /// Registering an existing tag replaces its factory.
    pub fn register(&mut self, agent_type: &str, factory: AgentFactory) {
        self.factories.insert(agent_type.to_string(), factory);
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.factories.contains_key(agent_type)
    }

    pub fn build(&self, agent_type: &str) -> Result<Box<dyn Agent>, AgentError> {
        let factory = self
            .factories
            .get(agent_type)
            .ok_or_else(|| AgentError::UnknownAgentType(agent_type.to_string()))?;
        Ok(factory())
    }

    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry").field("types", &self.types()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_registered() {
        let registry = AgentRegistry::with_builtin(Arc::new(AgentServices::new(PromptLibrary::builtin())));
        assert_eq!(registry.types(), vec!["analyzer".to_string(), "reviewer".to_string()]);
        assert_eq!(registry.build(ANALYZER_TYPE).unwrap().agent_type(), ANALYZER_TYPE);
        assert_eq!(registry.build(REVIEWER_TYPE).unwrap().agent_type(), REVIEWER_TYPE);
    }

    #[test]
    fn test_unknown_type() {
        let registry = AgentRegistry::new();
        let err = registry.build("summarizer").err().unwrap();
        assert!(matches!(err, AgentError::UnknownAgentType(t) if t == "summarizer"));
    }
}
