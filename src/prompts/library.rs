use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use crate::agents::JsonMap;
use crate::errors::AgentError;

pub const COMMIT_ANALYZER_TEMPLATE: &str = "git_commit_analyzer";
pub const QUALITY_REVIEWER_TEMPLATE: &str = "quality_reviewer";

const COMMIT_ANALYZER_PROMPT: &str = r#"Analyze the following git commit and summarize it.

Commit: {{commit_hash}}
Author: {{author_name}} <{{author_email}}>
Date: {{commit_date}}
Files changed: {{files_changed}} (+{{insertions}} / -{{deletions}})

Message:
{{commit_message}}

Changed files:
{{file_changes}}

Respond with a single JSON object:
{"summary": "...", "category": "feature|bugfix|refactor|docs|style|test|chore",
 "impact_level": "low|medium|high", "confidence_score": 0.0-1.0, "description": "..."}"#;

const QUALITY_REVIEWER_PROMPT: &str = r#"Review the quality of an automated commit analysis.

Commit: {{commit_hash}} ({{files_changed}} files changed)
Message:
{{commit_message}}

Analysis under review:
- summary: {{analysis_summary}}
- category: {{analysis_category}}
- impact level: {{analysis_impact_level}}
- analyzer confidence: {{analysis_confidence}}
- description: {{analysis_description}}

Score accuracy, completeness, consistency and clarity between 0.0 and 1.0.
Respond with a single JSON object:
{"approved": true|false, "dimension_scores": {"accuracy": 0.0, "completeness": 0.0,
 "consistency": 0.0, "clarity": 0.0}, "feedback": "...", "suggestions": ["..."]}"#;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder regex"));

/// Named prompt templates with `{{key}}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<String, String>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptLibrary {
    pub fn empty() -> Self {
        Self { templates: HashMap::new() }
    }

    /// Library holding the analyzer and reviewer templates.
    pub fn builtin() -> Self {
        let mut library = Self::empty();
        library.insert(COMMIT_ANALYZER_TEMPLATE, COMMIT_ANALYZER_PROMPT);
        library.insert(QUALITY_REVIEWER_TEMPLATE, QUALITY_REVIEWER_PROMPT);
        library
    }

    /// Built-in templates overridden (or extended) by every `<name>.txt` in `dir`.
    pub fn with_overrides(dir: &Path) -> Result<Self, AgentError> {
        let mut library = Self::builtin();
        if !dir.is_dir() {
            return Err(AgentError::Prompt(format!("Prompt directory not found: {}", dir.display())));
        }
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path).map_err(|e| {
                AgentError::Prompt(format!("Failed to read prompt {}: {}", path.display(), e))
            })?;
            debug!(template = name, path = %path.display(), "Loaded prompt template");
            library.insert(name, &content);
        }
        Ok(library)
    }

    pub fn insert(&mut self, name: &str, template: &str) {
        self.templates.insert(name.to_string(), template.to_string());
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Render `name`, replacing each `{{key}}` with `vars[key]`.
    /// Strings are inserted verbatim, other values as JSON, missing keys as "".
    pub fn render(&self, name: &str, vars: &JsonMap) -> Result<String, AgentError> {
        let template = self
            .get(name)
            .ok_or_else(|| AgentError::Prompt(format!("Prompt template not found: {}", name)))?;
        Ok(interpolate(template, vars))
    }
}

pub fn interpolate(template: &str, vars: &JsonMap) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_builtin_templates_present() {
        let library = PromptLibrary::builtin();
        assert!(library.has_template(COMMIT_ANALYZER_TEMPLATE));
        assert!(library.has_template(QUALITY_REVIEWER_TEMPLATE));
        assert!(!library.has_template("nonexistent"));
    }

    #[test]
    fn test_interpolate_values() {
        let vars = json!({"name": "abc123", "count": 3, "missing_null": null});
        let out = interpolate(
            "hash={{name}} n={{ count }} x={{missing_null}} y={{absent}}",
            vars.as_object().unwrap(),
        );
        assert_eq!(out, "hash=abc123 n=3 x= y=");
    }

    #[test]
    fn test_render_unknown_template_is_prompt_error() {
        let err = PromptLibrary::builtin().render("nope", &JsonMap::new()).unwrap_err();
        assert!(matches!(err, AgentError::Prompt(_)));
    }

    #[test]
    fn test_overrides_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("git_commit_analyzer.txt"), "custom {{commit_hash}}").unwrap();
        fs::write(dir.path().join("extra.txt"), "extra").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let library = PromptLibrary::with_overrides(dir.path()).unwrap();
        let vars = json!({"commit_hash": "deadbeef"});
        assert_eq!(
            library.render(COMMIT_ANALYZER_TEMPLATE, vars.as_object().unwrap()).unwrap(),
            "custom deadbeef"
        );
        assert!(library.has_template("extra"));
        assert!(!library.has_template("notes"));
        assert!(library.has_template(QUALITY_REVIEWER_TEMPLATE));
    }

    #[test]
    fn test_missing_override_dir_errors() {
        assert!(PromptLibrary::with_overrides(Path::new("/definitely/not/here")).is_err());
    }
}
