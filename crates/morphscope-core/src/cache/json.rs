use std::fs;
use std::path::{Path, PathBuf};

use super::{validate_embedding_values, CacheError, Embedding, EmbeddingKey, EmbeddingStore};

/// One JSON file per key: `{image}_{model}_{detector}_embeddings.json`,
/// holding a bare array of floats.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &EmbeddingKey) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}_embeddings.json",
            key.image, key.model, key.detector
        ))
    }
}

impl EmbeddingStore for JsonDirStore {
    fn get(&self, key: &EmbeddingKey) -> Result<Option<Embedding>, CacheError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        let values: Vec<f64> =
            serde_json::from_str(&text).map_err(|source| CacheError::Json { path, source })?;
        validate_embedding_values(&values)?;
        Ok(Some(Embedding::new(values)))
    }

    fn put(&mut self, key: &EmbeddingKey, embedding: &Embedding) -> Result<(), CacheError> {
        validate_embedding_values(&embedding.values)?;
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.entry_path(key);
        let json = serde_json::to_string(&embedding.values).map_err(|source| CacheError::Json {
            path: path.clone(),
            source,
        })?;

        // Write-then-rename so an interrupted run never leaves a truncated entry.
        let tmp_path = path.with_extension("json.part");
        fs::write(&tmp_path, json).map_err(|source| CacheError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| CacheError::Io { path, source })?;
        Ok(())
    }
}
