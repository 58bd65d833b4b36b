use std::path::PathBuf;
use std::str::FromStr;

use crate::analyzer::DEFAULT_MAX_FILTERED_OUT;
use crate::error::ConfigError;
use crate::subject::DEFAULT_MIN_PROBES;

/// Which [`crate::cache::EmbeddingStore`] backs the embedding cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// One JSON file per embedding.
    Json,
    /// `embeddings.db` in the cache directory.
    Sqlite,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(CacheBackend::Json),
            "sqlite" => Ok(CacheBackend::Sqlite),
            other => Err(format!("unknown cache backend '{other}' (expected json or sqlite)")),
        }
    }
}

/// Run configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum probe images for a subject to be valid (inclusive).
    pub min_probes: usize,
    /// Scoring is skipped when the filtered-out fraction reaches this.
    pub max_filtered_out: f64,
    /// External embedding extractor command line.
    pub extractor_command: String,
    /// Where embeddings are persisted. `None` means the output directory.
    pub cache_dir: Option<PathBuf>,
    pub cache_backend: CacheBackend,
    /// Optional TOML file replacing the built-in FRS configurations.
    pub frs_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_probes: DEFAULT_MIN_PROBES,
            max_filtered_out: DEFAULT_MAX_FILTERED_OUT,
            extractor_command: "deepface-embed".to_string(),
            cache_dir: None,
            cache_backend: CacheBackend::Json,
            frs_file: None,
        }
    }
}

impl Config {
    /// Load configuration from `MORPHSCOPE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_probes: env_parse("MORPHSCOPE_MIN_PROBES", defaults.min_probes),
            max_filtered_out: env_parse("MORPHSCOPE_MAX_FILTERED_OUT", defaults.max_filtered_out),
            extractor_command: std::env::var("MORPHSCOPE_EXTRACTOR")
                .unwrap_or(defaults.extractor_command),
            cache_dir: std::env::var("MORPHSCOPE_CACHE_DIR").ok().map(PathBuf::from),
            cache_backend: env_parse("MORPHSCOPE_CACHE_BACKEND", defaults.cache_backend),
            frs_file: std::env::var("MORPHSCOPE_FRS_FILE").ok().map(PathBuf::from),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.max_filtered_out) {
            return Err(ConfigError::InvalidValue(format!(
                "max filtered-out fraction must be in [0, 1], got {}",
                self.max_filtered_out
            )));
        }
        if self.extractor_command.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "extractor command is empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
