const MAX_ERROR_LENGTH: usize = 2_000;

/// Keep at most `max_chars` characters, cutting on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

pub fn truncate_error(error: &str) -> String {
    if error.chars().count() <= MAX_ERROR_LENGTH {
        error.to_string()
    } else {
        format!("{}...", truncate_chars(error, MAX_ERROR_LENGTH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("提交分析结果", 2), "提交");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_truncate_error_appends_marker() {
        let long = "x".repeat(MAX_ERROR_LENGTH + 10);
        let out = truncate_error(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.len(), MAX_ERROR_LENGTH + 3);
        assert_eq!(truncate_error("short"), "short");
    }
}
