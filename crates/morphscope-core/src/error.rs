use std::path::PathBuf;
use thiserror::Error;

use crate::cache::CacheError;
use crate::extractor::ExtractionError;
use crate::similarity::SimilarityError;

/// Problems with the input layout or the requested run configuration.
///
/// Always fatal for the affected dataset.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("input directory does not exist: {0}")]
    MissingInput(PathBuf),
    #[error("no supported dataset under {0} (expected FRGC and/or FERET)")]
    NoDataset(PathBuf),
    #[error("{path} does not exist; expected <input>/<DATASET>/{subdir}")]
    MissingSubdirectory { path: PathBuf, subdir: &'static str },
    #[error("unknown dataset '{0}' (expected FRGC or FERET)")]
    UnknownDataset(String),
    #[error("unknown FRS configuration '{0}'")]
    UnknownFrs(String),
    #[error("no FRS configurations selected")]
    NoFrs,
    #[error("invalid FRS config file {path}: {reason}")]
    InvalidFrsFile { path: PathBuf, reason: String },
    #[error("unknown pipeline step '{0}'")]
    UnknownStep(String),
    #[error("invalid configuration: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// A subject that passed the validity filter has no images in one of the
    /// bona fide directories. Indicates a resolver/filesystem mismatch.
    #[error("data integrity error for subject {subject}: {detail}")]
    DataIntegrity { subject: String, detail: String },
    #[error("embedding cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("embedding extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("similarity error: {0}")]
    Similarity(#[from] SimilarityError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
