use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::error::PipelineError;
use crate::frs::FrsConfig;
use crate::subject::SubjectId;

/// Which of a morph's two constituent subjects a record compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectSlot {
    S1,
    S2,
}

impl fmt::Display for SubjectSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubjectSlot::S1 => "S1",
            SubjectSlot::S2 => "S2",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreCategory {
    Dissimilarity,
    Mated,
    NonMated,
}

impl ScoreCategory {
    fn suffix(&self) -> &'static str {
        match self {
            ScoreCategory::Dissimilarity => "dissimilarity_scores",
            ScoreCategory::Mated => "mated_scores",
            ScoreCategory::NonMated => "non_mated_scores",
        }
    }

    /// `{dataset}_{frs}_{category}.txt`
    pub fn file_name(&self, dataset: Dataset, frs_name: &str) -> String {
        format!("{}_{}_{}.txt", dataset.name(), frs_name, self.suffix())
    }
}

/// One output line. Scores are printed with six decimals, fields are
/// tab-separated.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreRecord {
    Morph {
        morph_id: String,
        slot: SubjectSlot,
        scores: Vec<f64>,
    },
    Mated {
        subject: SubjectId,
        score: f64,
    },
    NonMated {
        probe_subject: SubjectId,
        reference_subject: SubjectId,
        score: f64,
    },
}

impl fmt::Display for ScoreRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreRecord::Morph {
                morph_id,
                slot,
                scores,
            } => {
                write!(f, "{morph_id}\t{slot}")?;
                for score in scores {
                    write!(f, "\t{score:.6}")?;
                }
                Ok(())
            }
            ScoreRecord::Mated { subject, score } => write!(f, "{subject}\t{score:.6}"),
            ScoreRecord::NonMated {
                probe_subject,
                reference_subject,
                score,
            } => write!(f, "{probe_subject}\t{reference_subject}\t{score:.6}"),
        }
    }
}

/// `M0001`, `M0002`, ...
pub fn morph_id(n: usize) -> String {
    format!("M{n:04}")
}

/// One open output file per FRS for a single category.
///
/// Files are truncated on creation and flushed after every record, so an
/// interrupted pass leaves valid output up to the last completed record.
pub struct ScoreWriters {
    files: Vec<(PathBuf, BufWriter<File>)>,
    written: usize,
}

impl ScoreWriters {
    pub fn create(
        output_dir: &Path,
        dataset: Dataset,
        frs: &[FrsConfig],
        category: ScoreCategory,
    ) -> Result<Self, PipelineError> {
        let mut files = Vec::with_capacity(frs.len());
        for config in frs {
            let path = output_dir.join(category.file_name(dataset, &config.name));
            let file = File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
            files.push((path, BufWriter::new(file)));
        }
        Ok(Self { files, written: 0 })
    }

    /// Append a record to the file of the FRS at `frs_index`.
    pub fn append(&mut self, frs_index: usize, record: &ScoreRecord) -> Result<(), PipelineError> {
        let (path, writer) = &mut self.files[frs_index];
        writeln!(writer, "{record}")
            .and_then(|_| writer.flush())
            .map_err(|e| PipelineError::io(path.as_path(), e))?;
        self.written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.written
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|(p, _)| p.clone()).collect()
    }
}
