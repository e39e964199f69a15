//! Summary statistics derived from the accumulated pipeline state.
//!
//! Pure functions used for display and monitoring; summaries are recomputed
//! after each completed stage and never merged back into pipeline state.
//! Every rate is `count / total` with an empty denominator defined as 0.

use serde::Serialize;
use std::collections::HashSet;

use crate::stages::{DatasetItem, FilterStatus, FilteredConversation};

use super::state::PipelineState;

/// Post-processing attrition: verdict counts and proportions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSummary {
    pub total: usize,
    pub kept: usize,
    pub modified: usize,
    pub removed: usize,
    pub kept_ratio: f64,
    pub modified_ratio: f64,
    pub removed_ratio: f64,
}

/// Dataset-level statistics after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub total_items: usize,
    pub total_turns: usize,
    pub distinct_domains: usize,
    pub mean_quality_score: f64,
    pub task_success_rate: f64,
}

/// Cross-stage summary of the whole pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub experiences: usize,
    pub conversations: usize,
    /// Present once post-processing has completed.
    pub filter: Option<FilterSummary>,
    /// Present once dataset construction has completed.
    pub dataset: Option<DatasetSummary>,
}

/// Derives summaries from pipeline state.
pub struct Aggregator;

impl Aggregator {
    /// Summarizes the whole pipeline state.
    ///
    /// Stage-specific summaries appear only after their stage completed, so
    /// a summary never reflects partial or stale data.
    pub fn summarize(state: &PipelineState) -> PipelineSummary {
        PipelineSummary {
            experiences: state.experiences().map_or(0, <[_]>::len),
            conversations: state.conversations().map_or(0, <[_]>::len),
            filter: state.verdicts().map(Self::filter_summary),
            dataset: state.dataset().map(Self::dataset_summary),
        }
    }

    /// Kept/modified/removed counts and proportions over a verdict batch.
    pub fn filter_summary(verdicts: &[FilteredConversation]) -> FilterSummary {
        let total = verdicts.len();
        let kept = verdicts
            .iter()
            .filter(|v| v.status == FilterStatus::Kept)
            .count();
        let modified = verdicts
            .iter()
            .filter(|v| v.status == FilterStatus::Modified)
            .count();
        let removed = total - kept - modified;

        FilterSummary {
            total,
            kept,
            modified,
            removed,
            kept_ratio: ratio(kept, total),
            modified_ratio: ratio(modified, total),
            removed_ratio: ratio(removed, total),
        }
    }

    /// Item/turn/domain counts, mean quality and task-success rate over the
    /// dataset.
    pub fn dataset_summary(items: &[DatasetItem]) -> DatasetSummary {
        let total_items = items.len();
        let total_turns = items.iter().map(|i| i.turns.len()).sum();
        let distinct_domains = items
            .iter()
            .map(|i| i.domain.as_str())
            .collect::<HashSet<_>>()
            .len();
        let mean_quality_score = if total_items == 0 {
            0.0
        } else {
            items.iter().map(|i| i.metadata.quality_score).sum::<f64>() / total_items as f64
        };
        let successes = items.iter().filter(|i| i.task_success).count();

        DatasetSummary {
            total_items,
            total_turns,
            distinct_domains,
            mean_quality_score,
            task_success_rate: ratio(successes, total_items),
        }
    }
}

/// `count / total`, with division by zero defined as 0.
fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
