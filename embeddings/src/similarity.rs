//! Similarity computation for embeddings.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::Embedding;
use crate::error::VectorError;

fn check_dimensions(a: &[f32], b: &[f32]) -> Result<(), VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

// Products are accumulated in f64 so that very small or very large
// components neither underflow to zero nor overflow to infinity.
fn dot_f64(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

/// Compute the dot product between two embeddings.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_dimensions(a, b)?;
    Ok(dot_f64(a, b) as f32)
}

/// Euclidean (L2) norm of an embedding.
pub fn norm(a: &[f32]) -> f32 {
    dot_f64(a, a).sqrt() as f32
}

fn checked_norm(a: &[f32]) -> Result<f64, VectorError> {
    let n = dot_f64(a, a).sqrt();
    if n == 0.0 || !n.is_finite() {
        return Err(VectorError::DegenerateVector);
    }
    Ok(n)
}

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0 (up to rounding), where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
///
/// A zero vector on either side has no direction, so it is reported as
/// [`VectorError::DegenerateVector`] instead of producing NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_dimensions(a, b)?;
    let dot = dot_f64(a, b);
    Ok((dot / (checked_norm(a)? * checked_norm(b)?)) as f32)
}

/// A corpus text together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredText {
    /// The original text.
    pub text: String,

    /// Embedding of `text`.
    pub embedding: Embedding,
}

impl ScoredText {
    pub fn new(text: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            text: text.into(),
            embedding,
        }
    }
}

/// A text and its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// The matched text.
    pub text: String,

    /// Cosine similarity against the query.
    pub score: f32,
}

impl SimilarityResult {
    /// Create a new similarity result.
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// Score every candidate against `query` and order them by descending score.
///
/// The sort is stable: candidates with equal scores keep their input order.
pub fn rank_by_similarity(
    query: &[f32],
    candidates: &[ScoredText],
) -> Result<Vec<SimilarityResult>, VectorError> {
    let mut results = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let score = cosine_similarity(&candidate.embedding, query)?;
        results.push(SimilarityResult::new(candidate.text.clone(), score));
    }

    results.sort_by_key(|r| Reverse(OrderedFloat(r.score)));

    Ok(results)
}
