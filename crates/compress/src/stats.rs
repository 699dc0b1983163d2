//! Aggregate statistics over batch outcomes.

use crate::batch::BatchItemOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;

const KB_PER_MB: f64 = 1024.0;

/// Summary of a finished batch.
///
/// Size totals cover successful items only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items in the batch
    pub total_items: usize,
    /// Items that produced a result
    pub successful: usize,
    /// Items that failed
    pub failed: usize,
    /// Sum of original sizes, in MB
    pub total_original_mb: f64,
    /// Sum of final sizes, in MB
    pub total_final_mb: f64,
    /// `total_original_mb - total_final_mb`
    pub total_saved_mb: f64,
    /// Mean compression ratio over successful items; 0.0 when there are none
    pub average_compression_ratio_pct: f64,
}

impl BatchSummary {
    /// Summarize a batch. Returns `None` for an empty batch.
    pub fn from_outcomes(outcomes: &[BatchItemOutcome]) -> Option<Self> {
        if outcomes.is_empty() {
            return None;
        }

        let results: Vec<_> = outcomes.iter().filter_map(BatchItemOutcome::result).collect();
        let successful = results.len();

        let original_kb: f64 = results.iter().map(|r| r.original_size_kb).sum();
        let final_kb: f64 = results.iter().map(|r| r.final_size_kb).sum();
        let average_compression_ratio_pct = if successful == 0 {
            0.0
        } else {
            results.iter().map(|r| r.compression_ratio_pct).sum::<f64>() / successful as f64
        };

        let total_original_mb = original_kb / KB_PER_MB;
        let total_final_mb = final_kb / KB_PER_MB;

        Some(Self {
            total_items: outcomes.len(),
            successful,
            failed: outcomes.len() - successful,
            total_original_mb,
            total_final_mb,
            total_saved_mb: total_original_mb - total_final_mb,
            average_compression_ratio_pct,
        })
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} compressed, {} failed, {:.2} MB -> {:.2} MB (saved {:.2} MB, avg {:.1}%)",
            self.successful,
            self.total_items,
            self.failed,
            self.total_original_mb,
            self.total_final_mb,
            self.total_saved_mb,
            self.average_compression_ratio_pct
        )
    }
}
