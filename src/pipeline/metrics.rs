use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{ProcessResult, ProcessStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStatistics {
    pub total_tasks: usize,
    pub counts_by_status: BTreeMap<String, usize>,
    pub approved_count: usize,
    pub rejected_count: usize,
    pub error_count: usize,
    /// Submissions not yet in a terminal state.
    pub pending_count: usize,
    /// `approved / (approved + rejected)`, 0 when nothing was decided.
    pub approval_rate: f64,
    pub average_latency_secs: f64,
}

pub fn compute_statistics<'a>(results: impl IntoIterator<Item = &'a ProcessResult>) -> PipelineStatistics {
    let mut stats = PipelineStatistics::default();
    let mut total_latency = 0.0;
    let mut completed = 0usize;

    for result in results {
        stats.total_tasks += 1;
        *stats.counts_by_status.entry(result.status.to_string()).or_default() += 1;
        match result.status {
            ProcessStatus::Approved => stats.approved_count += 1,
            ProcessStatus::Rejected => stats.rejected_count += 1,
            ProcessStatus::Error => stats.error_count += 1,
            _ => stats.pending_count += 1,
        }
        if let Some(latency) = result.latency_secs() {
            total_latency += latency;
            completed += 1;
        }
    }

    let decided = stats.approved_count + stats.rejected_count;
    if decided > 0 {
        stats.approval_rate = stats.approved_count as f64 / decided as f64;
    }
    if completed > 0 {
        stats.average_latency_secs = total_latency / completed as f64;
    }
    stats
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityTrends {
    pub average_quality_score: f64,
    pub sample_count: usize,
    pub dimension_averages: BTreeMap<String, f64>,
}

/// Review scores of approved submissions created at or after `since`.
pub fn compute_trends<'a>(
    results: impl IntoIterator<Item = &'a ProcessResult>,
    since: DateTime<Utc>,
) -> QualityTrends {
    let mut total_score = 0.0;
    let mut count = 0usize;
    let mut dimensions: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for result in results {
        if result.status != ProcessStatus::Approved || result.created_at < since {
            continue;
        }
        count += 1;
        let Some(review) = &result.review_result else {
            continue;
        };
        total_score += result.overall_score().unwrap_or(0.0);
        if let Some(scores) = review.get("dimension_scores").and_then(|v| v.as_object()) {
            for (dim, score) in scores {
                if let Some(score) = score.as_f64() {
                    let entry = dimensions.entry(dim.clone()).or_default();
                    entry.0 += score;
                    entry.1 += 1;
                }
            }
        }
    }

    if count == 0 {
        return QualityTrends::default();
    }

    QualityTrends {
        average_quality_score: ((total_score / count as f64) * 1000.0).round() / 1000.0,
        sample_count: count,
        dimension_averages: dimensions
            .into_iter()
            .map(|(dim, (sum, n))| (dim, sum / n as f64))
            .collect(),
    }
}
