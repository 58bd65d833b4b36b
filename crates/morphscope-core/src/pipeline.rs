use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::analyzer::{analyze, AnalysisResult, DEFAULT_MAX_FILTERED_OUT};
use crate::cache::{EmbeddingCache, EmbeddingStore};
use crate::dataset::{Dataset, DatasetLayout};
use crate::error::{ConfigError, PipelineError};
use crate::extractor::EmbeddingExtractor;
use crate::frs::FrsConfig;
use crate::scoring::{PassSummary, ScoringEngine};
use crate::subject::DEFAULT_MIN_PROBES;

/// The fixed set of operations a run can perform on a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStep {
    Analyze,
    MorphScores,
    MatedScores,
    NonMatedScores,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 4] = [
        PipelineStep::Analyze,
        PipelineStep::MorphScores,
        PipelineStep::MatedScores,
        PipelineStep::NonMatedScores,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStep::Analyze => "analyze",
            PipelineStep::MorphScores => "morph",
            PipelineStep::MatedScores => "mated",
            PipelineStep::NonMatedScores => "non-mated",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PipelineStep {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.name() == s)
            .ok_or_else(|| ConfigError::UnknownStep(s.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Empty means every dataset found under `input`.
    pub datasets: Vec<Dataset>,
    /// Run in [`PipelineStep`] order regardless of the order given.
    pub steps: Vec<PipelineStep>,
    pub min_probes: usize,
    pub max_filtered_out: f64,
    /// Score even when the analysis gate fails.
    pub force: bool,
}

impl PipelineOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            datasets: Vec::new(),
            steps: PipelineStep::ALL.to_vec(),
            min_probes: DEFAULT_MIN_PROBES,
            max_filtered_out: DEFAULT_MAX_FILTERED_OUT,
            force: false,
        }
    }
}

/// What happened to one dataset.
#[derive(Debug)]
pub struct DatasetReport {
    pub dataset: Dataset,
    pub analysis: AnalysisResult,
    /// True when scoring was skipped by the filtered-out gate.
    pub gated: bool,
    pub passes: Vec<(PipelineStep, PassSummary)>,
}

pub struct Pipeline<S, E> {
    options: PipelineOptions,
    frs: Vec<FrsConfig>,
    cache: EmbeddingCache<S, E>,
}

impl<S: EmbeddingStore, E: EmbeddingExtractor> Pipeline<S, E> {
    pub fn new(
        options: PipelineOptions,
        frs: Vec<FrsConfig>,
        cache: EmbeddingCache<S, E>,
    ) -> Result<Self, PipelineError> {
        if frs.is_empty() {
            return Err(ConfigError::NoFrs.into());
        }
        if !options.output.exists() {
            tracing::info!(path = %options.output.display(), "creating output directory");
            std::fs::create_dir_all(&options.output)
                .map_err(|e| PipelineError::io(&options.output, e))?;
        }
        let mut options = options;
        options.steps.sort();
        options.steps.dedup();
        Ok(Self {
            options,
            frs,
            cache,
        })
    }

    /// Run every selected dataset. A failure aborts only that dataset.
    pub fn run(&mut self) -> Result<Vec<(Dataset, Result<DatasetReport, PipelineError>)>, PipelineError> {
        let datasets = if self.options.datasets.is_empty() {
            Dataset::discover(&self.options.input)?
        } else {
            self.options.datasets.clone()
        };

        let mut outcomes = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            let outcome = self.run_dataset(dataset);
            if let Err(e) = &outcome {
                tracing::error!(dataset = %dataset, error = %e, "dataset run aborted");
            }
            outcomes.push((dataset, outcome));
        }
        Ok(outcomes)
    }

    pub fn run_dataset(&mut self, dataset: Dataset) -> Result<DatasetReport, PipelineError> {
        let layout = DatasetLayout::open(&self.options.input, dataset)?;
        let analysis = analyze(&layout, self.options.min_probes)?;

        let mut report = DatasetReport {
            dataset,
            analysis,
            gated: false,
            passes: Vec::new(),
        };

        let gate_ok = report.analysis.passes_gate(self.options.max_filtered_out);
        if !gate_ok && !self.options.force {
            tracing::warn!(
                dataset = %dataset,
                filtered_out = report.analysis.filtered_out_percentage,
                max = self.options.max_filtered_out,
                "too many subjects filtered out; skipping scoring"
            );
            report.gated = true;
            return Ok(report);
        }

        let mut engine = ScoringEngine::new(
            &layout,
            &self.frs,
            &self.options.output,
            &mut self.cache,
            self.options.min_probes,
        )?;
        for &step in &self.options.steps {
            if let Some(summary) = execute(&mut engine, step)? {
                report.passes.push((step, summary));
            }
        }
        Ok(report)
    }

    pub fn cache(&self) -> &EmbeddingCache<S, E> {
        &self.cache
    }
}

/// Run one scoring step. `Analyze` has already happened by the time an
/// engine exists, so it yields no pass.
pub fn execute<S: EmbeddingStore, E: EmbeddingExtractor>(
    engine: &mut ScoringEngine<'_, S, E>,
    step: PipelineStep,
) -> Result<Option<PassSummary>, PipelineError> {
    let summary = match step {
        PipelineStep::Analyze => return Ok(None),
        PipelineStep::MorphScores => engine.score_morphs()?,
        PipelineStep::MatedScores => engine.score_mated()?,
        PipelineStep::NonMatedScores => engine.score_non_mated()?,
    };
    Ok(Some(summary))
}
