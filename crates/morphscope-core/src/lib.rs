//! Face morphing attack vulnerability evaluation.
//!
//! Resolves subjects from dataset filenames, pairs morph, probe and reference
//! images, writes per-FRS dissimilarity score files through a persistent
//! embedding cache, and reduces score files to MMPMR, FNMR and RMMR.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod extractor;
pub mod frs;
pub mod pipeline;
pub mod rates;
pub mod scoring;
pub mod similarity;
pub mod subject;

pub use analyzer::{analyze, AnalysisResult};
pub use cache::{Embedding, EmbeddingCache, EmbeddingKey, EmbeddingStore};
pub use config::{CacheBackend, Config};
pub use dataset::{Dataset, DatasetLayout, MorphTechnique};
pub use error::{ConfigError, PipelineError};
pub use extractor::{CommandExtractor, EmbeddingExtractor, ExtractionError};
pub use frs::{FrsConfig, FrsRegistry};
pub use pipeline::{DatasetReport, Pipeline, PipelineOptions, PipelineStep};
pub use rates::{MatchRates, ScoreFileError};
pub use scoring::{ScoreRecord, ScoringEngine};
pub use subject::{NamingConvention, SubjectId};
