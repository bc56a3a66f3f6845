use serde_json::Value;
use tracing::debug;

use super::types::JsonMap;

/// Pull the first JSON object out of a completion reply.
///
/// Fenced ```json blocks are tried first, then every balanced `{...}` span in
/// the raw text, in order of appearance.
pub fn extract_json_object(text: &str) -> Option<JsonMap> {
    let mut candidates = extract_json_blocks(text);
    candidates.extend(balanced_objects(text));

    for candidate in &candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => return Some(map),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Failed to parse JSON candidate"),
        }
    }
    None
}

const JSON_FENCE: &str = "```json";

/// Byte offset of the next ```json fence at or after `from`, ignoring ASCII case.
fn find_json_fence(text: &str, from: usize) -> Option<usize> {
    text.get(from..)?
        .char_indices()
        .map(|(i, _)| from + i)
        .find(|&i| {
            text[i..]
                .get(..JSON_FENCE.len())
                .is_some_and(|s| s.eq_ignore_ascii_case(JSON_FENCE))
        })
}

fn extract_json_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut search_from = 0;

    while let Some(marker_pos) = find_json_fence(text, search_from) {
        let after_marker = marker_pos + JSON_FENCE.len();
        let Some(end_offset) = text[after_marker..].find("```") else {
            break;
        };
        let block = text[after_marker..after_marker + end_offset].trim();
        if !block.is_empty() {
            blocks.push(block.to_string());
        }
        search_from = after_marker + end_offset + 3;
    }
    blocks
}

fn balanced_objects(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

pub fn str_field<'a>(map: &'a JsonMap, key: &str) -> &'a str {
    map.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Numeric field; numeric strings are accepted too.
pub fn f64_field(map: &JsonMap, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn u64_field(map: &JsonMap, key: &str) -> u64 {
    f64_field(map, key).map(|v| v.max(0.0) as u64).unwrap_or(0)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
