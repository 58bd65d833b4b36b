//! Pre-flight statistics used to decide whether a dataset is worth scoring.

use std::fmt;

use serde::Serialize;

use crate::dataset::{Dataset, DatasetLayout};
use crate::error::PipelineError;
use crate::subject::{count_subjects, filter_valid};

/// Scoring proceeds only when the filtered-out fraction is below this.
pub const DEFAULT_MAX_FILTERED_OUT: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub database: Dataset,
    pub total_identifiers: usize,
    pub filtered_identifiers: usize,
    /// Fraction in `[0, 1]`, rounded to two decimals.
    pub filtered_out_percentage: f64,
}

impl AnalysisResult {
    pub fn passes_gate(&self, max_filtered_out: f64) -> bool {
        self.filtered_out_percentage < max_filtered_out
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Database: {}", self.database)?;
        writeln!(f, "Total Identifiers: {}", self.total_identifiers)?;
        writeln!(f, "Filtered Identifiers: {}", self.filtered_identifiers)?;
        write!(f, "Filtered Out Percentage: {:.2}", self.filtered_out_percentage)
    }
}

/// `round((total - filtered) / total, 2)`, or 0 for an empty dataset.
pub fn filtered_out_fraction(total: usize, filtered: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let fraction = total.saturating_sub(filtered) as f64 / total as f64;
    (fraction * 100.0).round() / 100.0
}

/// Count subjects in the probe directory and how many survive the
/// minimum-probe filter.
pub fn analyze(layout: &DatasetLayout, min_count: usize) -> Result<AnalysisResult, PipelineError> {
    let dataset = layout.dataset;
    tracing::info!(dataset = %dataset, dir = %layout.probe_dir.display(), "reading probe images");
    let probes = layout.probe_files()?;

    let counts = count_subjects(&probes, dataset.naming_convention());
    let total = counts.len();
    let filtered = filter_valid(&counts, min_count).len();
    let fraction = filtered_out_fraction(total, filtered);

    tracing::info!(
        dataset = %dataset,
        probes = probes.len(),
        total_identifiers = total,
        filtered_identifiers = filtered,
        filtered_out = fraction,
        "dataset analyzed"
    );

    Ok(AnalysisResult {
        database: dataset,
        total_identifiers: total,
        filtered_identifiers: filtered,
        filtered_out_percentage: fraction,
    })
}
