use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use super::{validate_embedding_values, CacheError, Embedding, EmbeddingKey, EmbeddingStore};

/// SQLite-backed embedding store.
///
/// Vectors are stored as little-endian `f64` blobs in a single table keyed by
/// `(image, model, detector)`. A second `put` for an existing key is ignored,
/// so the first stored vector is the one every later run sees.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at the given path and run migrations.
    /// `:memory:` opens a private in-memory database.
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        let conn = if db_path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            Connection::open(db_path)?
        };

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS embeddings (
                 image TEXT NOT NULL,
                 model TEXT NOT NULL,
                 detector TEXT NOT NULL,
                 dim INTEGER NOT NULL,
                 embedding BLOB NOT NULL,
                 created_at TEXT NOT NULL,
                 PRIMARY KEY (image, model, detector)
             );",
        )?;

        tracing::debug!(path = %db_path.display(), "embedding database opened");
        Ok(Self { conn })
    }

    /// Number of stored embeddings across all models.
    pub fn count_all(&self) -> Result<u64, CacheError> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl EmbeddingStore for SqliteStore {
    fn get(&self, key: &EmbeddingKey) -> Result<Option<Embedding>, CacheError> {
        let row: Option<(i64, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT dim, embedding FROM embeddings
                 WHERE image = ?1 AND model = ?2 AND detector = ?3",
                rusqlite::params![key.image, key.model, key.detector],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((dim, blob)) = row else {
            return Ok(None);
        };
        let values = bytes_to_embedding(&blob)?;
        if values.len() as i64 != dim {
            return Err(CacheError::InvalidBlob(blob.len()));
        }
        Ok(Some(Embedding::new(values)))
    }

    fn put(&mut self, key: &EmbeddingKey, embedding: &Embedding) -> Result<(), CacheError> {
        validate_embedding_values(&embedding.values)?;
        let blob = embedding_to_bytes(&embedding.values);
        let created_at = chrono::Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT OR IGNORE INTO embeddings (image, model, detector, dim, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                key.image,
                key.model,
                key.detector,
                embedding.len() as i64,
                blob,
                created_at
            ],
        )?;
        Ok(())
    }
}

fn embedding_to_bytes(values: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> Result<Vec<f64>, CacheError> {
    if bytes.is_empty() || bytes.len() % 8 != 0 {
        return Err(CacheError::InvalidBlob(bytes.len()));
    }

    let mut values = Vec::with_capacity(bytes.len() / 8);
    for chunk in bytes.chunks_exact(8) {
        let arr: [u8; 8] = chunk
            .try_into()
            .map_err(|_| CacheError::InvalidBlob(bytes.len()))?;
        let v = f64::from_le_bytes(arr);
        if !v.is_finite() {
            return Err(CacheError::InvalidEmbeddingValue);
        }
        values.push(v);
    }
    Ok(values)
}
