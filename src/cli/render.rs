use console::style;

use crate::pipeline::{PipelineStatistics, ProcessResult, ProcessStatus};
use crate::utils::formatting::{format_percent, format_secs};

/// One line per decided commit.
pub fn render_result(result: &ProcessResult) -> String {
    let hash = result
        .input_payload
        .get("hash")
        .and_then(|v| v.as_str())
        .map(|h| h.chars().take(10).collect::<String>())
        .unwrap_or_else(|| "?".to_string());
    let summary = result
        .produce_result
        .as_ref()
        .and_then(|r| r.get("summary"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let score = result
        .overall_score()
        .map(|s| format!("{:.3}", s))
        .unwrap_or_else(|| "-".to_string());

    let line = match result.status {
        ProcessStatus::Approved => format!(
            "{} {} {} {}",
            style("✓").green(),
            style(hash).cyan(),
            style(score).green(),
            summary
        ),
        ProcessStatus::Rejected => format!(
            "{} {} {} {}",
            style("✗").yellow(),
            style(hash).cyan(),
            style(score).yellow(),
            summary
        ),
        ProcessStatus::Error => format!(
            "{} {} {}",
            style("!").red().bold(),
            style(hash).cyan(),
            style(result.error_message.as_deref().unwrap_or("unknown error")).red().dim()
        ),
        other => format!("{} {} {}", style("…").dim(), style(hash).cyan(), other),
    };

    match &result.storage_error {
        Some(e) => format!("{} {}", line, style(format!("(not stored: {})", e)).red().dim()),
        None => line,
    }
}

pub fn render_statistics(stats: &PipelineStatistics) -> String {
    format!(
        "{}\n  total {}  approved {}  rejected {}  error {}\n  approval rate {}  avg latency {}",
        style("Pipeline statistics").white().bold(),
        stats.total_tasks,
        style(stats.approved_count).green(),
        style(stats.rejected_count).yellow(),
        style(stats.error_count).red(),
        format_percent(stats.approval_rate),
        format_secs(stats.average_latency_secs),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_error_line_includes_message() {
        console::set_colors_enabled(false);
        let mut result = ProcessResult::new("t1", json!({"hash": "0123456789abcdef"}).as_object().cloned().unwrap());
        result.status = ProcessStatus::Error;
        result.error_message = Some("provider down".into());
        let line = render_result(&result);
        assert!(line.contains("0123456789"));
        assert!(!line.contains("abcdef"));
        assert!(line.contains("provider down"));
    }

    #[test]
    fn test_render_statistics() {
        console::set_colors_enabled(false);
        let stats = PipelineStatistics {
            total_tasks: 4,
            approved_count: 3,
            rejected_count: 1,
            approval_rate: 0.75,
            ..Default::default()
        };
        let text = render_statistics(&stats);
        assert!(text.contains("total 4"));
        assert!(text.contains("approved 3"));
    }
}
