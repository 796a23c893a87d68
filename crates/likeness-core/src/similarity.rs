//! Similarity scoring between face embeddings.
//!
//! Cosine similarity with explicit degenerate-input handling. Non-finite
//! components and zero vectors score 0.0 instead of failing the request:
//! pathological-but-decodable images (solid color, heavy occlusion) commonly
//! embed that way, and they should read as "no match", not as an error.

use thiserror::Error;

use crate::types::Embedding;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("embedding length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
}

/// Score two embeddings into [0.0, 1.0].
///
/// 1.0 means identical direction, 0.0 unrelated or degenerate. Negative
/// cosine clamps to 0.0: for verification purposes an anti-correlated pair
/// reads the same as an unrelated one. Symmetric in its arguments. The only
/// error is a length mismatch; every well-formed pair gets a definite score.
pub fn score(a: &Embedding, b: &Embedding) -> Result<f32, ScoreError> {
    if a.len() != b.len() {
        return Err(ScoreError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    if !all_finite(&a.values) || !all_finite(&b.values) {
        tracing::warn!("non-finite embedding component; scoring pair as 0.0");
        return Ok(0.0);
    }
    if is_zero(&a.values) || is_zero(&b.values) {
        tracing::warn!("zero-vector embedding; scoring pair as 0.0");
        return Ok(0.0);
    }

    // Scoring strategies tried in order; the first finite cosine is
    // definitive. The f64 pass rescues f32 overflow and underflow in the dot
    // product and norms.
    const STRATEGIES: [fn(&[f32], &[f32]) -> Option<f32>; 2] = [cosine_f32, cosine_f64];
    for strategy in STRATEGIES {
        if let Some(value) = strategy(&a.values, &b.values) {
            return Ok(value.clamp(0.0, 1.0));
        }
    }

    tracing::warn!("cosine degenerate in both precisions; scoring pair as 0.0");
    Ok(0.0)
}

fn all_finite(values: &[f32]) -> bool {
    values.iter().all(|v| v.is_finite())
}

fn is_zero(values: &[f32]) -> bool {
    values.iter().all(|v| *v == 0.0)
}

/// Single-pass f32 cosine: dot(a,b) / (|a| * |b|).
fn cosine_f32(a: &[f32], b: &[f32]) -> Option<f32> {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let value = dot / (norm_a.sqrt() * norm_b.sqrt());
    value.is_finite().then_some(value)
}

/// Same formula with f64 accumulation. Squares of any finite f32 fit in f64,
/// so this pass only fails if the inputs themselves were degenerate.
fn cosine_f64(a: &[f32], b: &[f32]) -> Option<f32> {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let value = (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32;
    value.is_finite().then_some(value)
}
