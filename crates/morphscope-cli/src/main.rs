use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod rates;
mod score;

#[derive(Parser)]
#[command(
    name = "morphscope",
    version,
    about = "Morphing attack vulnerability scoring for face recognition systems"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report subject counts and the filtered-out fraction per dataset
    Analyze {
        /// Input directory containing FRGC and/or FERET
        #[arg(short, long)]
        input: PathBuf,
        /// Restrict to one dataset (FRGC or FERET)
        #[arg(short, long)]
        dataset: Option<String>,
        /// Minimum probe images per subject (inclusive)
        #[arg(long)]
        min_probes: Option<usize>,
    },
    /// Compute morph, mated and non-mated dissimilarity score files
    Score(score::ScoreArgs),
    /// Compute MMPMR, FNMR and RMMR from mated and non-mated score files
    Rates {
        /// File containing mated (genuine) scores
        #[arg(short = 'g', long)]
        mated: PathBuf,
        /// File containing non-mated (impostor) scores
        #[arg(short, long)]
        non_mated: PathBuf,
        /// Decision threshold on dissimilarity scores
        #[arg(short, long)]
        threshold: f64,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze {
            input,
            dataset,
            min_probes,
        } => score::run_analyze(&input, dataset.as_deref(), min_probes),
        Command::Score(args) => score::run(args),
        Command::Rates {
            mated,
            non_mated,
            threshold,
            json,
        } => rates::run(&mated, &non_mated, threshold, json),
    }
}
