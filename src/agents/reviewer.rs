use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::llm::CompletionOptions;
use crate::utils::truncation::truncate_chars;
use super::analyzer::{check_collaborators, collaborators_healthy};
use super::base::Agent;
use super::extract::{extract_json_object, f64_field, round_to, str_field, u64_field};
use super::registry::{AgentServices, REVIEWER_TYPE};
use super::schema::{validate_against, REVIEWER_CONFIG_SCHEMA};
use super::types::{AgentInput, AgentOutput, JsonMap};

pub const DIMENSIONS: [&str; 4] = ["accuracy", "completeness", "consistency", "clarity"];
const DEFAULT_WEIGHTS: [f64; 4] = [0.3, 0.25, 0.25, 0.2];
pub const DEFAULT_APPROVAL_THRESHOLD: f64 = 0.85;
const REVISION_FLOOR: f64 = 0.70;
const MAX_FEEDBACK_CHARS: usize = 500;
const MAX_SUGGESTIONS: usize = 5;

/// Reviewer agent: scores an analysis on four dimensions and decides whether
/// it is good enough to keep.
pub struct QualityReviewer {
    services: Arc<AgentServices>,
}

impl QualityReviewer {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Agent for QualityReviewer {
    fn agent_type(&self) -> &str {
        REVIEWER_TYPE
    }

    fn validate_config(&self, config: &JsonMap) -> Result<(), AgentError> {
        validate_against(&REVIEWER_CONFIG_SCHEMA, REVIEWER_TYPE, config)?;
        check_collaborators(&self.services, config)
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "quality_assessment",
            "accuracy_evaluation",
            "completeness_check",
            "consistency_validation",
            "clarity_assessment",
            "feedback_generation",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect()
    }

    async fn process(&self, input: &AgentInput, config: &JsonMap) -> Result<AgentOutput, AgentError> {
        let (commit, analysis) = validate_review_input(&input.data)?;
        let vars = review_variables(commit, analysis);
        let settings = ReviewSettings::from_config(config);

        let template = str_field(config, "prompt_template");
        let prompt = self.services.prompts().render(template, &vars)?;

        let client_name = str_field(config, "llm_client");
        let provider = self.services.provider(client_name).ok_or_else(|| {
            AgentError::ConfigValidation(format!("LLM client not available: {}", client_name))
        })?;

        let options = CompletionOptions::from_config(config, 800, 0.2);
        let system = config.get("system_prompt").and_then(Value::as_str);
        let response = provider.complete(&prompt, system, &options).await?;

        let raw = match extract_json_object(&response.content) {
            Some(parsed) => parsed,
            None => {
                warn!(task_id = %input.task_id, "No JSON in reviewer reply, using rule-based review");
                fallback_review(&response.content, &vars, &settings)
            }
        };

        let review = normalize_review(&raw, &settings);
        let decision = final_decision(review);
        let confidence = f64_field(&decision, "confidence").unwrap_or(0.8);
        debug!(
            task_id = %input.task_id,
            approved = decision["approved"].as_bool().unwrap_or(false),
            overall_score = f64_field(&decision, "overall_score").unwrap_or(0.0),
            "Analysis reviewed"
        );

        Ok(AgentOutput::success(&input.task_id, decision, confidence)
            .with_metadata("agent_version", config.get("version").cloned().unwrap_or(json!("1.0")))
            .with_metadata("llm_client", client_name)
            .with_metadata("prompt_template", template)
            .with_metadata("approval_threshold", settings.approval_threshold))
    }

    async fn health_check(&self, config: &JsonMap) -> bool {
        collaborators_healthy(&self.services, config).await
    }
}

#[derive(Debug, Clone, Copy)]
struct ReviewSettings {
    approval_threshold: f64,
    weights: [f64; 4],
}

impl ReviewSettings {
    fn from_config(config: &JsonMap) -> Self {
        let approval_threshold = f64_field(config, "approval_threshold").unwrap_or(DEFAULT_APPROVAL_THRESHOLD);
        let mut weights = DEFAULT_WEIGHTS;
        if let Some(Value::Object(custom)) = config.get("dimension_weights") {
            for (i, dim) in DIMENSIONS.iter().enumerate() {
                if let Some(w) = f64_field(custom, dim) {
                    weights[i] = w;
                }
            }
        }
        Self { approval_threshold, weights }
    }
}

fn validate_review_input(data: &JsonMap) -> Result<(&JsonMap, &JsonMap), AgentError> {
    let commit = require_object(data, "original_commit")?;
    let analysis = require_object(data, "analysis_result")?;
    for field in ["hash", "message"] {
        if !commit.contains_key(field) {
            return Err(AgentError::InvalidInput(format!("original_commit is missing field: {}", field)));
        }
    }
    for field in ["summary", "category", "confidence_score"] {
        if !analysis.contains_key(field) {
            return Err(AgentError::InvalidInput(format!("analysis_result is missing field: {}", field)));
        }
    }
    Ok((commit, analysis))
}

fn require_object<'a>(data: &'a JsonMap, key: &str) -> Result<&'a JsonMap, AgentError> {
    match data.get(key) {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(AgentError::InvalidInput(format!("{} must be an object", key))),
        None => Err(AgentError::InvalidInput(format!("review input is missing field: {}", key))),
    }
}

fn review_variables(commit: &JsonMap, analysis: &JsonMap) -> JsonMap {
    let mut vars = JsonMap::new();
    vars.insert("commit_hash".into(), json!(truncate_chars(str_field(commit, "hash"), 8)));
    vars.insert("commit_message".into(), json!(str_field(commit, "message").trim()));
    vars.insert("files_changed".into(), json!(u64_field(commit, "files_changed")));
    vars.insert("analysis_summary".into(), json!(str_field(analysis, "summary")));
    vars.insert("analysis_category".into(), json!(str_field(analysis, "category")));
    vars.insert("analysis_impact_level".into(), json!(str_field(analysis, "impact_level")));
    vars.insert(
        "analysis_confidence".into(),
        json!(f64_field(analysis, "confidence_score").unwrap_or(0.0)),
    );
    vars.insert("analysis_description".into(), json!(str_field(analysis, "description")));
    vars
}

fn fallback_review(content: &str, vars: &JsonMap, settings: &ReviewSettings) -> JsonMap {
    let summary = str_field(vars, "analysis_summary");
    let accuracy = (f64_field(vars, "analysis_confidence").unwrap_or(0.0) + 0.1).min(1.0);
    let completeness = if summary.is_empty() { 0.5 } else { 0.8 };
    let consistency = if str_field(vars, "analysis_category").is_empty() { 0.5 } else { 0.8 };
    let clarity = if summary.chars().count() > 20 { 0.7 } else { 0.5 };
    let overall = (accuracy + completeness + consistency + clarity) / 4.0;
    let approved = overall >= settings.approval_threshold;

    let content = content.trim();
    let mut result = JsonMap::new();
    result.insert("approved".into(), json!(approved));
    result.insert("overall_score".into(), json!(overall));
    result.insert(
        "dimension_scores".into(),
        json!({
            "accuracy": accuracy,
            "completeness": completeness,
            "consistency": consistency,
            "clarity": clarity,
        }),
    );
    result.insert(
        "feedback".into(),
        json!(if content.is_empty() { "Automatically generated review" } else { content }),
    );
    let suggestions: Vec<&str> = if approved { vec![] } else { vec!["Improve the analysis quality"] };
    result.insert("suggestions".into(), json!(suggestions));
    result
}

/// Clamp dimension scores (missing ones count as 0.5) and recompute the
/// weighted overall score. An explicit `approved` in the reply wins over the
/// threshold comparison.
fn normalize_review(raw: &JsonMap, settings: &ReviewSettings) -> JsonMap {
    let empty = JsonMap::new();
    let scores = match raw.get("dimension_scores") {
        Some(Value::Object(map)) => map,
        _ => &empty,
    };

    let mut dimensions = JsonMap::new();
    let mut overall = 0.0;
    for (dim, weight) in DIMENSIONS.iter().zip(settings.weights) {
        let score = f64_field(scores, dim).unwrap_or(0.5).clamp(0.0, 1.0);
        overall += score * weight;
        dimensions.insert(dim.to_string(), json!(score));
    }
    let overall = round_to(overall, 3);

    let approved = raw
        .get("approved")
        .and_then(Value::as_bool)
        .unwrap_or(overall >= settings.approval_threshold);

    let suggestions: Vec<Value> = raw
        .get("suggestions")
        .and_then(Value::as_array)
        .map(|items| items.iter().take(MAX_SUGGESTIONS).cloned().collect())
        .unwrap_or_default();

    let feedback = match raw.get("feedback") {
        Some(Value::String(s)) => truncate_chars(s, MAX_FEEDBACK_CHARS),
        Some(Value::Null) | None => String::new(),
        Some(other) => truncate_chars(&other.to_string(), MAX_FEEDBACK_CHARS),
    };

    let mut review = JsonMap::new();
    review.insert("approved".into(), json!(approved));
    review.insert("overall_score".into(), json!(overall));
    review.insert("dimension_scores".into(), Value::Object(dimensions));
    review.insert("feedback".into(), json!(feedback));
    review.insert("suggestions".into(), Value::Array(suggestions));
    review
}

fn final_decision(mut review: JsonMap) -> JsonMap {
    let approved = review.get("approved").and_then(Value::as_bool).unwrap_or(false);
    let overall = f64_field(&review, "overall_score").unwrap_or(0.0);
    let dims: Vec<(String, f64)> = match review.get("dimension_scores") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.as_f64().unwrap_or(0.0)))
            .collect(),
        _ => Vec::new(),
    };

    review.insert("confidence".into(), json!(review_confidence(overall, &dims)));
    review.insert("revision_required".into(), json!(!approved && overall >= REVISION_FLOOR));
    review.insert("decision_reason".into(), json!(decision_reason(approved, overall, &dims)));
    review
}

/// Overall score plus a bonus of up to 0.2 when the dimensions agree.
fn review_confidence(overall: f64, dims: &[(String, f64)]) -> f64 {
    let mut confidence = overall;
    if !dims.is_empty() {
        let variance = dims.iter().map(|(_, s)| (s - overall).powi(2)).sum::<f64>() / dims.len() as f64;
        confidence += (0.2 - variance).max(0.0);
    }
    round_to(confidence.min(1.0), 3)
}

fn decision_reason(approved: bool, overall: f64, dims: &[(String, f64)]) -> String {
    if approved {
        return format!("Analysis quality is good; overall score {:.2} meets the bar", overall);
    }
    match dims.iter().min_by(|a, b| a.1.total_cmp(&b.1)) {
        Some((dim, score)) => format!(
            "Analysis quality is insufficient; overall score {:.2}, weakest dimension {} ({:.2})",
            overall, dim, score
        ),
        None => format!("Analysis quality is insufficient; overall score {:.2}", overall),
    }
}
