use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::llm::CompletionOptions;
use crate::utils::truncation::truncate_chars;
use super::base::Agent;
use super::extract::{extract_json_object, f64_field, round_to, str_field, u64_field};
use super::registry::{AgentServices, ANALYZER_TYPE};
use super::schema::{validate_against, ANALYZER_CONFIG_SCHEMA};
use super::types::{AgentInput, AgentOutput, JsonMap};

pub const CATEGORIES: &[&str] = &["feature", "bugfix", "refactor", "docs", "style", "test", "chore"];
pub const IMPACT_LEVELS: &[&str] = &["low", "medium", "high"];

const REQUIRED_COMMIT_FIELDS: &[&str] = &["hash", "message", "author_name", "author_email", "commit_date"];
const MAX_SUMMARY_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_FILES_AFFECTED: usize = 10;

/// Producer agent: turns one commit into a categorized, scored analysis.
pub struct CommitAnalyzer {
    services: Arc<AgentServices>,
}

impl CommitAnalyzer {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Agent for CommitAnalyzer {
    fn agent_type(&self) -> &str {
        ANALYZER_TYPE
    }

    fn validate_config(&self, config: &JsonMap) -> Result<(), AgentError> {
        validate_against(&ANALYZER_CONFIG_SCHEMA, ANALYZER_TYPE, config)?;
        check_collaborators(&self.services, config)
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "commit_analysis",
            "semantic_understanding",
            "change_categorization",
            "impact_assessment",
            "confidence_scoring",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect()
    }

    async fn process(&self, input: &AgentInput, config: &JsonMap) -> Result<AgentOutput, AgentError> {
        let commit = validate_commit(&input.data)?;
        let vars = prompt_variables(commit);

        let template = str_field(config, "prompt_template");
        let prompt = self.services.prompts().render(template, &vars)?;

        let client_name = str_field(config, "llm_client");
        let provider = self.services.provider(client_name).ok_or_else(|| {
            AgentError::ConfigValidation(format!("LLM client not available: {}", client_name))
        })?;

        let options = CompletionOptions::from_config(config, 1000, 0.3);
        let system = config.get("system_prompt").and_then(Value::as_str);
        let response = provider.complete(&prompt, system, &options).await?;

        let (raw, fallback) = match extract_json_object(&response.content) {
            Some(parsed) => (parsed, false),
            None => {
                warn!(task_id = %input.task_id, "No JSON in analyzer reply, using heuristic analysis");
                (fallback_analysis(&response.content, &vars), true)
            }
        };

        let result = normalize_analysis(&raw, commit);
        let confidence = analysis_confidence(&result, &vars);
        debug!(
            task_id = %input.task_id,
            category = str_field(&result, "category"),
            impact = str_field(&result, "impact_level"),
            confidence,
            "Commit analyzed"
        );

        Ok(AgentOutput::success(&input.task_id, result, confidence)
            .with_metadata("agent_version", config.get("version").cloned().unwrap_or(json!("1.0")))
            .with_metadata("llm_client", client_name)
            .with_metadata("prompt_template", template)
            .with_metadata("model", response.model)
            .with_metadata("fallback", fallback))
    }

    async fn health_check(&self, config: &JsonMap) -> bool {
        collaborators_healthy(&self.services, config).await
    }
}

/// Referenced LLM client and prompt template must exist.
pub(crate) fn check_collaborators(services: &AgentServices, config: &JsonMap) -> Result<(), AgentError> {
    let client = str_field(config, "llm_client");
    if !services.has_provider(client) {
        return Err(AgentError::ConfigValidation(format!("LLM client does not exist: {}", client)));
    }
    let template = str_field(config, "prompt_template");
    if !services.prompts().has_template(template) {
        return Err(AgentError::ConfigValidation(format!("Prompt template does not exist: {}", template)));
    }
    Ok(())
}

pub(crate) async fn collaborators_healthy(services: &AgentServices, config: &JsonMap) -> bool {
    if !services.prompts().has_template(str_field(config, "prompt_template")) {
        return false;
    }
    match services.provider(str_field(config, "llm_client")) {
        Some(provider) => provider.health_check().await,
        None => false,
    }
}

fn validate_commit(data: &JsonMap) -> Result<&JsonMap, AgentError> {
    for field in REQUIRED_COMMIT_FIELDS {
        if !data.contains_key(*field) {
            return Err(AgentError::InvalidInput(format!("commit is missing required field: {}", field)));
        }
    }
    Ok(data)
}

fn prompt_variables(commit: &JsonMap) -> JsonMap {
    let files: Vec<String> = commit
        .get("file_changes")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(file_label).collect())
        .unwrap_or_default();

    let mut vars = JsonMap::new();
    vars.insert("commit_hash".into(), json!(truncate_chars(str_field(commit, "hash"), 8)));
    vars.insert("commit_message".into(), json!(str_field(commit, "message").trim()));
    vars.insert("author_name".into(), json!(str_field(commit, "author_name")));
    vars.insert("author_email".into(), json!(str_field(commit, "author_email")));
    vars.insert("commit_date".into(), json!(str_field(commit, "commit_date")));
    vars.insert("files_changed".into(), json!(u64_field(commit, "files_changed")));
    vars.insert("insertions".into(), json!(u64_field(commit, "insertions")));
    vars.insert("deletions".into(), json!(u64_field(commit, "deletions")));
    vars.insert(
        "file_changes".into(),
        json!(files.iter().map(|f| format!("- {}", f)).collect::<Vec<_>>().join("\n")),
    );
    vars
}

fn file_label(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(obj) => ["path", "filename", "file"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| item.to_string()),
        other => other.to_string(),
    }
}

/// Keyword heuristic used when the reply carries no parseable JSON.
fn fallback_analysis(content: &str, vars: &JsonMap) -> JsonMap {
    let message = str_field(vars, "commit_message").to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| message.contains(w));

    let category = if has_any(&["fix", "bug", "error", "issue"]) {
        "bugfix"
    } else if has_any(&["add", "new", "feature", "implement"]) {
        "feature"
    } else if has_any(&["refactor", "clean", "improve"]) {
        "refactor"
    } else if has_any(&["doc", "readme", "comment"]) {
        "docs"
    } else if has_any(&["test", "spec"]) {
        "test"
    } else {
        "chore"
    };

    let files_changed = u64_field(vars, "files_changed");
    let impact_level = match files_changed {
        n if n > 10 => "high",
        n if n > 3 => "medium",
        _ => "low",
    };

    let content = content.trim();
    let summary = if content.is_empty() {
        truncate_chars(str_field(vars, "commit_message"), 100)
    } else {
        truncate_chars(content, 100)
    };
    let description = if content.is_empty() { "Automatically generated analysis" } else { content };

    let mut result = JsonMap::new();
    result.insert("summary".into(), json!(summary));
    result.insert("category".into(), json!(category));
    result.insert("impact_level".into(), json!(impact_level));
    result.insert("confidence_score".into(), json!(0.5));
    result.insert("description".into(), json!(description));
    result
}

pub fn normalize_category(category: &str) -> &'static str {
    let lower = category.trim().to_lowercase();
    if let Some(valid) = CATEGORIES.iter().copied().find(|c| *c == lower) {
        return valid;
    }
    match lower.as_str() {
        "feat" => "feature",
        "fix" | "bug" => "bugfix",
        "doc" | "documentation" => "docs",
        "tests" | "testing" => "test",
        _ => "chore",
    }
}

pub fn normalize_impact_level(level: &str) -> &'static str {
    let lower = level.trim().to_lowercase();
    if let Some(valid) = IMPACT_LEVELS.iter().copied().find(|l| *l == lower) {
        return valid;
    }
    match lower.as_str() {
        "moderate" => "medium",
        "major" | "large" | "critical" => "high",
        _ => "low",
    }
}

fn normalize_analysis(raw: &JsonMap, commit: &JsonMap) -> JsonMap {
    let files_affected: Vec<Value> = commit
        .get("file_changes")
        .and_then(Value::as_array)
        .map(|items| items.iter().take(MAX_FILES_AFFECTED).cloned().collect())
        .unwrap_or_default();
    let category = raw.get("category").and_then(Value::as_str).unwrap_or("chore");
    let impact = raw.get("impact_level").and_then(Value::as_str).unwrap_or("low");

    let mut result = JsonMap::new();
    result.insert("summary".into(), json!(truncate_chars(str_field(raw, "summary"), MAX_SUMMARY_CHARS)));
    result.insert("category".into(), json!(normalize_category(category)));
    result.insert("impact_level".into(), json!(normalize_impact_level(impact)));
    result.insert(
        "confidence_score".into(),
        json!(f64_field(raw, "confidence_score").unwrap_or(0.5).clamp(0.0, 1.0)),
    );
    result.insert(
        "description".into(),
        json!(truncate_chars(str_field(raw, "description"), MAX_DESCRIPTION_CHARS)),
    );
    result.insert("files_affected".into(), Value::Array(files_affected));
    result
}

/// Reported confidence plus bonuses for a descriptive message, known file
/// counts and a complete result.
fn analysis_confidence(result: &JsonMap, vars: &JsonMap) -> f64 {
    let base = f64_field(result, "confidence_score").unwrap_or(0.5);
    let message_len = str_field(vars, "commit_message").chars().count();

    let mut adjustment = 0.0;
    if message_len > 10 {
        adjustment += 0.1;
    }
    if message_len > 50 {
        adjustment += 0.1;
    }
    if u64_field(vars, "files_changed") > 0 {
        adjustment += 0.1;
    }
    if !str_field(result, "summary").is_empty() && !str_field(result, "description").is_empty() {
        adjustment += 0.1;
    }
    round_to((base + adjustment).min(1.0), 2)
}
