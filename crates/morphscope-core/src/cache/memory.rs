use std::collections::HashMap;

use super::{validate_embedding_values, CacheError, Embedding, EmbeddingKey, EmbeddingStore};

/// Non-persistent store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<EmbeddingKey, Embedding>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EmbeddingStore for MemoryStore {
    fn get(&self, key: &EmbeddingKey) -> Result<Option<Embedding>, CacheError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &EmbeddingKey, embedding: &Embedding) -> Result<(), CacheError> {
        validate_embedding_values(&embedding.values)?;
        self.entries
            .entry(key.clone())
            .or_insert_with(|| embedding.clone());
        Ok(())
    }
}
