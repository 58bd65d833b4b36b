//! Seam to the face embedding service.
//!
//! Detection and recognition models run outside this crate. The pipeline only
//! needs "image + model + detector -> vector", expressed by
//! [`EmbeddingExtractor`].

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::cache::Embedding;
use crate::frs::FrsConfig;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("failed to launch extractor '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("extractor failed on {image} ({status}): {stderr}")]
    Failed {
        image: PathBuf,
        status: String,
        stderr: String,
    },
    #[error("extractor returned unparseable output for {image}: {source}")]
    Output {
        image: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("extractor returned an empty embedding for {0}")]
    Empty(PathBuf),
    #[error("{0}")]
    Other(String),
}

pub trait EmbeddingExtractor {
    fn extract(&mut self, image: &Path, frs: &FrsConfig) -> Result<Embedding, ExtractionError>;
}

impl<T: EmbeddingExtractor + ?Sized> EmbeddingExtractor for Box<T> {
    fn extract(&mut self, image: &Path, frs: &FrsConfig) -> Result<Embedding, ExtractionError> {
        (**self).extract(image, frs)
    }
}

/// Runs `<program> [args..] <image> <model> <detector>` and reads a JSON array
/// of numbers from its stdout.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    /// Split a command line on whitespace: the first word is the program,
    /// the rest are leading arguments.
    pub fn from_command_line(command: &str) -> Result<Self, ExtractionError> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| ExtractionError::Other("empty extractor command".to_string()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }
}

impl EmbeddingExtractor for CommandExtractor {
    fn extract(&mut self, image: &Path, frs: &FrsConfig) -> Result<Embedding, ExtractionError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .arg(&frs.model)
            .arg(&frs.detector)
            .output()
            .map_err(|source| ExtractionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Failed {
                image: image.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_vector(image, &output.stdout)
    }
}

fn parse_vector(image: &Path, stdout: &[u8]) -> Result<Embedding, ExtractionError> {
    let values: Vec<f64> =
        serde_json::from_slice(stdout).map_err(|source| ExtractionError::Output {
            image: image.to_path_buf(),
            source,
        })?;
    if values.is_empty() {
        return Err(ExtractionError::Empty(image.to_path_buf()));
    }
    Ok(Embedding::new(values))
}
