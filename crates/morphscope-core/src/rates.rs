//! Vulnerability metrics from mated and non-mated score files.
//!
//! Definitions follow Scherhag et al., "Biometric systems under morphing
//! attacks: assessment of morphing techniques and vulnerability reporting":
//!
//! - MMPMR: fraction of mated scores strictly below the threshold.
//! - FNMR: fraction of non-mated scores at or above the threshold.
//! - RMMR: `1 + (MMPMR - (1 - FNMR))`.
//!
//! The `<` / `>=` asymmetry is the decision boundary convention and is kept
//! as-is.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreFileError {
    #[error("could not read scores from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: malformed score '{value}'")]
    Malformed {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("{0} contains no scores")]
    Empty(PathBuf),
    #[error("no {0} scores to reduce")]
    NoScores(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchRates {
    pub mmpmr: f64,
    pub fnmr: f64,
    pub rmmr: f64,
}

impl fmt::Display for MatchRates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MMPMR: {:.3}, FNMR: {:.3}, RMMR: {:.3}",
            self.mmpmr, self.fnmr, self.rmmr
        )
    }
}

/// Read one score per non-blank line.
///
/// Accepted row shapes are a bare score, `subject\tscore` (mated) and
/// `probe_subject\treference_subject\tscore` (non-mated). Any other shape,
/// an empty identifier or a score that is not a finite float fails the read.
pub fn read_scores(path: &Path) -> Result<Vec<f64>, ScoreFileError> {
    let text = fs::read_to_string(path).map_err(|source| ScoreFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let scores = parse_scores(path, &text)?;
    tracing::debug!(path = %path.display(), count = scores.len(), "scores read");
    Ok(scores)
}

fn parse_scores(path: &Path, text: &str) -> Result<Vec<f64>, ScoreFileError> {
    let mut scores = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = |value: &str| ScoreFileError::Malformed {
            path: path.to_path_buf(),
            line: i + 1,
            value: value.to_string(),
        };

        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let (ids, score) = match fields.split_last() {
            Some((score, ids)) if ids.len() <= 2 => (ids, *score),
            _ => return Err(malformed(line)),
        };
        if ids.iter().any(|id| id.is_empty()) {
            return Err(malformed(line));
        }
        match score.parse::<f64>() {
            Ok(v) if v.is_finite() => scores.push(v),
            _ => return Err(malformed(score)),
        }
    }
    if scores.is_empty() {
        return Err(ScoreFileError::Empty(path.to_path_buf()));
    }
    Ok(scores)
}

fn fraction(scores: &[f64], pred: impl Fn(f64) -> bool) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let hits = scores.iter().filter(|&&s| pred(s)).count();
    Some(hits as f64 / scores.len() as f64)
}

/// Mated Morph Presentation Match Rate.
pub fn mmpmr(mated: &[f64], threshold: f64) -> Result<f64, ScoreFileError> {
    fraction(mated, |s| s < threshold).ok_or(ScoreFileError::NoScores("mated"))
}

/// False Non-Match Rate over non-mated comparisons.
pub fn fnmr(non_mated: &[f64], threshold: f64) -> Result<f64, ScoreFileError> {
    fraction(non_mated, |s| s >= threshold).ok_or(ScoreFileError::NoScores("non-mated"))
}

/// Relative Morph Match Rate.
pub fn rmmr(mmpmr: f64, fnmr: f64) -> f64 {
    1.0 + (mmpmr - (1.0 - fnmr))
}

pub fn rates_from_scores(
    mated: &[f64],
    non_mated: &[f64],
    threshold: f64,
) -> Result<MatchRates, ScoreFileError> {
    let mmpmr = mmpmr(mated, threshold)?;
    let fnmr = fnmr(non_mated, threshold)?;
    Ok(MatchRates {
        mmpmr,
        fnmr,
        rmmr: rmmr(mmpmr, fnmr),
    })
}

/// Read both score files and compute all three rates.
pub fn compute(
    mated_scores: &Path,
    non_mated_scores: &Path,
    threshold: f64,
) -> Result<MatchRates, ScoreFileError> {
    let mated = read_scores(mated_scores)?;
    let non_mated = read_scores(non_mated_scores)?;
    let rates = rates_from_scores(&mated, &non_mated, threshold)?;
    tracing::info!(
        mated = mated.len(),
        non_mated = non_mated.len(),
        threshold,
        mmpmr = rates.mmpmr,
        fnmr = rates.fnmr,
        rmmr = rates.rmmr,
        "match rates computed"
    );
    Ok(rates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn mmpmr_is_strictly_below() {
        assert!(close(mmpmr(&[0.1, 0.5, 0.9], 0.6).unwrap(), 2.0 / 3.0));
        assert!(close(mmpmr(&[0.6], 0.6).unwrap(), 0.0));
    }

    #[test]
    fn fnmr_is_at_or_above() {
        assert!(close(fnmr(&[0.2, 0.7, 0.8], 0.6).unwrap(), 2.0 / 3.0));
        assert!(close(fnmr(&[0.6], 0.6).unwrap(), 1.0));
    }

    #[test]
    fn rmmr_combines_both() {
        let rates = rates_from_scores(&[0.1, 0.5, 0.9], &[0.2, 0.7, 0.8], 0.6).unwrap();
        assert!(close(rates.rmmr, 1.0 + (2.0 / 3.0 - (1.0 - 2.0 / 3.0))));
        assert_eq!(
            rates.to_string(),
            "MMPMR: 0.667, FNMR: 0.667, RMMR: 1.333"
        );
    }

    #[test]
    fn parses_single_column_and_tabbed_rows() {
        let path = Path::new("scores.txt");
        let scores = parse_scores(path, "0.1\n\n0.25\n").unwrap();
        assert_eq!(scores, vec![0.1, 0.25]);

        let scores = parse_scores(path, "001\t0.500000\n001\t002\t0.750000\n").unwrap();
        assert_eq!(scores, vec![0.5, 0.75]);
    }

    #[test]
    fn malformed_row_reports_line() {
        let err = parse_scores(Path::new("s.txt"), "0.1\nabc\n").unwrap_err();
        match err {
            ScoreFileError::Malformed { line, value, .. } => {
                assert_eq!(line, 2);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse_scores(Path::new("s.txt"), "NaN\n").is_err());
    }

    #[test]
    fn rejects_rows_of_other_shapes() {
        let path = Path::new("s.txt");
        let err = parse_scores(path, "M0001\tS1\t0.1\t0.2\t0.9\n").unwrap_err();
        assert!(matches!(err, ScoreFileError::Malformed { line: 1, .. }));

        let err = parse_scores(path, "0.3\n001\t\t0.5\n").unwrap_err();
        assert!(matches!(err, ScoreFileError::Malformed { line: 2, .. }));

        let err = parse_scores(path, "001\tnot-a-score\n").unwrap_err();
        match err {
            ScoreFileError::Malformed { value, .. } => assert_eq!(value, "not-a-score"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_score_lists_are_errors() {
        assert!(matches!(mmpmr(&[], 0.5), Err(ScoreFileError::NoScores("mated"))));
        assert!(matches!(fnmr(&[], 0.5), Err(ScoreFileError::NoScores("non-mated"))));
        assert!(rates_from_scores(&[0.1], &[], 0.5).is_err());
    }

    #[test]
    fn empty_file_is_fatal() {
        assert!(matches!(
            parse_scores(Path::new("s.txt"), "\n\n"),
            Err(ScoreFileError::Empty(_))
        ));
    }

    #[test]
    fn compute_reads_files() {
        let dir = std::env::temp_dir().join(format!(
            "morphscope-rates-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        fs::create_dir_all(&dir).unwrap();
        let mated = dir.join("mated.txt");
        let non_mated = dir.join("non_mated.txt");
        fs::write(&mated, "0.1\n0.5\n0.9\n").unwrap();
        fs::write(&non_mated, "0.2\n0.7\n0.8\n").unwrap();

        let rates = compute(&mated, &non_mated, 0.6).unwrap();
        assert!(close(rates.mmpmr, 2.0 / 3.0));
        assert!(close(rates.fnmr, 2.0 / 3.0));

        assert!(matches!(
            compute(&dir.join("missing.txt"), &non_mated, 0.6),
            Err(ScoreFileError::Read { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
