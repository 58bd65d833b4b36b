use ndarray::ArrayView1;
use thiserror::Error;

use crate::cache::Embedding;

#[derive(Error, Debug, PartialEq)]
pub enum SimilarityError {
    #[error("embedding dimension mismatch: {0} vs {1}")]
    DimensionMismatch(usize, usize),
    #[error("zero-norm embedding")]
    ZeroNorm,
}

/// Cosine distance `1 - a·b / (|a||b|)`, in `[0, 2]`.
pub fn cosine_dissimilarity(a: &Embedding, b: &Embedding) -> Result<f64, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch(a.len(), b.len()));
    }
    let a = ArrayView1::from(&a.values[..]);
    let b = ArrayView1::from(&b.values[..]);

    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(SimilarityError::ZeroNorm);
    }

    let similarity = (a.dot(&b) / (norm_a * norm_b)).clamp(-1.0, 1.0);
    Ok(1.0 - similarity)
}
