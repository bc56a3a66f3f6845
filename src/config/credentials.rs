use tracing::debug;

/// Environment variables consulted, in order, when a client has no key.
pub const API_KEY_ENV_VARS: &[&str] = &["GITMENTOR_API_KEY", "OPENAI_API_KEY"];

/// Resolve a configured value. A leading `$` names an environment variable;
/// an unset variable resolves to `None`.
pub fn resolve_credential(value: &str) -> Option<String> {
    match value.strip_prefix('$') {
        Some(var_name) => match std::env::var(var_name) {
            Ok(resolved) => {
                debug!(var = %var_name, "Resolved credential from environment");
                Some(resolved)
            }
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set");
                None
            }
        },
        None => Some(value.to_string()),
    }
}

/// API key for an LLM client: the configured value, else the first set
/// variable from [`API_KEY_ENV_VARS`].
pub fn resolve_api_key(configured: Option<&str>) -> Option<String> {
    if let Some(key) = configured.and_then(resolve_credential).filter(|k| !k.is_empty()) {
        return Some(key);
    }
    API_KEY_ENV_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|k| !k.is_empty()))
}

/// Keep the first four characters of a secret for recognition.
pub fn redact_secret(secret: &str) -> String {
    if secret.chars().count() <= 8 {
        return "[REDACTED]".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}…[REDACTED]", prefix)
}
