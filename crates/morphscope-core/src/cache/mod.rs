//! Embedding persistence and the compute-if-absent cache built on it.
//!
//! Extraction is by far the most expensive primitive of a run, and the three
//! scoring passes revisit the same images many times. [`EmbeddingCache`]
//! checks an in-process memo, then the persistent [`EmbeddingStore`], and only
//! calls the extractor on a miss in both.
//!
//! The get-then-put sequence assumes a single writer per store.

mod json;
mod memory;
mod sqlite;

pub use json::JsonDirStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::extractor::{EmbeddingExtractor, ExtractionError};
use crate::frs::FrsConfig;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cache entry {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid embedding blob size: {0} bytes")]
    InvalidBlob(usize),
    #[error("invalid embedding value (NaN/Inf)")]
    InvalidEmbeddingValue,
    #[error("empty embedding")]
    EmptyEmbedding,
}

/// Feature vector produced by a recognition model for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f64>,
}

impl Embedding {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Cache identity: image stem plus the model/detector that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbeddingKey {
    pub image: String,
    pub model: String,
    pub detector: String,
}

impl EmbeddingKey {
    pub fn new(image: &Path, frs: &FrsConfig) -> Self {
        let image = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            image,
            model: frs.model.clone(),
            detector: frs.detector.clone(),
        }
    }
}

/// Key/value persistence for embeddings. Entries are never mutated once put.
pub trait EmbeddingStore {
    fn get(&self, key: &EmbeddingKey) -> Result<Option<Embedding>, CacheError>;
    fn put(&mut self, key: &EmbeddingKey, embedding: &Embedding) -> Result<(), CacheError>;
}

pub(crate) fn validate_embedding_values(values: &[f64]) -> Result<(), CacheError> {
    if values.is_empty() {
        return Err(CacheError::EmptyEmbedding);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(CacheError::InvalidEmbeddingValue);
    }
    Ok(())
}

/// Lookup counters, reported at the end of each pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memo_hits: u64,
    pub store_hits: u64,
    pub extractions: u64,
}

/// Error from [`EmbeddingCache::embedding`]; extraction failures pass
/// through unmodified.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

pub struct EmbeddingCache<S, E> {
    store: S,
    extractor: E,
    memo: HashMap<EmbeddingKey, Embedding>,
    stats: CacheStats,
}

impl<S: EmbeddingStore, E: EmbeddingExtractor> EmbeddingCache<S, E> {
    pub fn new(store: S, extractor: E) -> Self {
        Self {
            store,
            extractor,
            memo: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Embedding of `image` under `frs`, extracting and persisting it on
    /// first use.
    pub fn embedding(&mut self, image: &Path, frs: &FrsConfig) -> Result<Embedding, LookupError> {
        let key = EmbeddingKey::new(image, frs);

        if let Some(hit) = self.memo.get(&key) {
            self.stats.memo_hits += 1;
            return Ok(hit.clone());
        }

        let embedding = match self.store.get(&key)? {
            Some(stored) => {
                self.stats.store_hits += 1;
                tracing::debug!(image = %key.image, model = %key.model, detector = %key.detector, "embedding already stored");
                stored
            }
            None => {
                let fresh = self.extractor.extract(image, frs)?;
                self.stats.extractions += 1;
                self.store.put(&key, &fresh)?;
                tracing::debug!(
                    image = %key.image,
                    model = %key.model,
                    detector = %key.detector,
                    dim = fresh.len(),
                    "embedding extracted"
                );
                fresh
            }
        };

        self.memo.insert(key, embedding.clone());
        Ok(embedding)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (S, E) {
        (self.store, self.extractor)
    }
}
