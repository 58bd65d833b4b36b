//! `morphscope analyze` and `morphscope score`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use morphscope_core::cache::{JsonDirStore, SqliteStore};
use morphscope_core::{
    analyze, CacheBackend, CommandExtractor, Config, Dataset, DatasetLayout, EmbeddingCache,
    EmbeddingStore, FrsRegistry, Pipeline, PipelineOptions, PipelineStep,
};

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Input directory containing FRGC and/or FERET
    #[arg(short, long)]
    input: PathBuf,
    /// Output directory for score files (created if missing)
    #[arg(short, long)]
    output: PathBuf,
    /// Restrict to these datasets (FRGC, FERET); default: all present
    #[arg(short, long)]
    dataset: Vec<String>,
    /// Steps to run: analyze, morph, mated, non-mated; default: all
    #[arg(long)]
    step: Vec<String>,
    /// FRS configurations to evaluate, by name; default: all configured
    #[arg(long)]
    frs: Vec<String>,
    /// TOML file of [[frs]] tables replacing the built-in configurations
    #[arg(long)]
    frs_config: Option<PathBuf>,
    /// Embedding cache backend: json or sqlite
    #[arg(long)]
    cache_backend: Option<CacheBackend>,
    /// Embedding cache directory (default: output directory)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Extractor command; invoked as `<cmd> <image> <model> <detector>`
    #[arg(long)]
    extractor: Option<String>,
    /// Minimum probe images per subject (inclusive)
    #[arg(long)]
    min_probes: Option<usize>,
    /// Skip scoring when the filtered-out fraction reaches this value
    #[arg(long)]
    max_filtered_out: Option<f64>,
    /// Score even when the filtered-out gate fails
    #[arg(long)]
    force: bool,
}

fn parse_datasets(names: &[String]) -> Result<Vec<Dataset>> {
    names
        .iter()
        .map(|n| n.parse::<Dataset>().map_err(anyhow::Error::from))
        .collect()
}

pub fn run_analyze(input: &Path, dataset: Option<&str>, min_probes: Option<usize>) -> Result<()> {
    let config = Config::from_env();
    let min_probes = min_probes.unwrap_or(config.min_probes);

    let datasets = match dataset {
        Some(name) => vec![name.parse::<Dataset>()?],
        None => Dataset::discover(input)?,
    };

    for dataset in datasets {
        let layout = DatasetLayout::open(input, dataset)?;
        let result = analyze(&layout, min_probes)
            .with_context(|| format!("failed to analyze {dataset}"))?;
        let verdict = if result.passes_gate(config.max_filtered_out) {
            "ok"
        } else {
            "too many subjects filtered out"
        };
        println!("{result}");
        println!("Gate ({:.2}): {verdict}\n", config.max_filtered_out);
    }
    Ok(())
}

pub fn run(args: ScoreArgs) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(v) = args.min_probes {
        config.min_probes = v;
    }
    if let Some(v) = args.max_filtered_out {
        config.max_filtered_out = v;
    }
    if let Some(v) = args.extractor.clone() {
        config.extractor_command = v;
    }
    if let Some(v) = args.cache_backend {
        config.cache_backend = v;
    }
    if args.cache_dir.is_some() {
        config.cache_dir = args.cache_dir.clone();
    }
    if args.frs_config.is_some() {
        config.frs_file = args.frs_config.clone();
    }
    config.validate()?;

    let registry = match &config.frs_file {
        Some(path) => FrsRegistry::from_toml_file(path)?,
        None => FrsRegistry::default(),
    };
    let frs = registry.select(&args.frs)?;

    let mut options = PipelineOptions::new(&args.input, &args.output);
    options.datasets = parse_datasets(&args.dataset)?;
    if !args.step.is_empty() {
        options.steps = args
            .step
            .iter()
            .map(|s| s.parse::<PipelineStep>())
            .collect::<Result<Vec<_>, _>>()?;
    }
    options.min_probes = config.min_probes;
    options.max_filtered_out = config.max_filtered_out;
    options.force = args.force;

    let extractor = CommandExtractor::from_command_line(&config.extractor_command)?;
    let cache_dir = config
        .cache_dir
        .clone()
        .unwrap_or_else(|| args.output.clone());

    tracing::info!(
        input = %args.input.display(),
        output = %args.output.display(),
        cache = %cache_dir.display(),
        frs = ?frs.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        "starting scoring run"
    );

    match config.cache_backend {
        CacheBackend::Json => {
            let store = JsonDirStore::new(cache_dir);
            run_pipeline(options, frs, EmbeddingCache::new(store, extractor))
        }
        CacheBackend::Sqlite => {
            let db_path = cache_dir.join("embeddings.db");
            let store = SqliteStore::open(&db_path)
                .with_context(|| format!("failed to open {}", db_path.display()))?;
            run_pipeline(options, frs, EmbeddingCache::new(store, extractor))
        }
    }
}

fn run_pipeline<S: EmbeddingStore>(
    options: PipelineOptions,
    frs: Vec<morphscope_core::FrsConfig>,
    cache: EmbeddingCache<S, CommandExtractor>,
) -> Result<()> {
    let mut pipeline = Pipeline::new(options, frs, cache)?;
    let outcomes = pipeline.run()?;

    let mut failed = Vec::new();
    for (dataset, outcome) in outcomes {
        match outcome {
            Ok(report) => {
                println!("{}", report.analysis);
                if report.gated {
                    println!("Scoring skipped: filtered-out fraction too high\n");
                    continue;
                }
                for (step, summary) in &report.passes {
                    println!(
                        "{step}: {} records, {} skipped",
                        summary.records, summary.skipped
                    );
                    for path in &summary.outputs {
                        println!("  {}", path.display());
                    }
                }
                println!();
            }
            Err(e) => {
                eprintln!("{dataset}: {e}");
                failed.push(dataset);
            }
        }
    }

    let stats = pipeline.cache().stats();
    println!(
        "Embeddings: {} extracted, {} loaded from cache, {} reused in memory",
        stats.extractions, stats.store_hits, stats.memo_hits
    );

    if !failed.is_empty() {
        bail!(
            "{} dataset(s) failed: {}",
            failed.len(),
            failed
                .iter()
                .map(|d| d.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}
