//! Vector similarity utilities.
//!
//! Pure-Rust cosine similarity plus the thresholded nearest-chunk ranking
//! used by the retriever.

use flint_core::Embedding;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is empty, all zero, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

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

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Cosine distance: `1 - similarity`, in [0, 2].
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// A stored chunk embedding together with its distance to a query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub embedding: Embedding,
    pub distance: f32,
}

/// Keep the candidates within `threshold` of `query`, nearest first, capped
/// at `top_n`.
///
/// The sort is stable, so candidates at equal distance keep their storage
/// order and the ranking is deterministic for a fixed candidate list.
pub fn nearest_within(
    candidates: Vec<Embedding>,
    query: &[f32],
    threshold: f32,
    top_n: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter_map(|embedding| {
            let distance = cosine_distance(&embedding.vector, query);
            (distance <= threshold).then_some(ScoredChunk {
                embedding,
                distance,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_n);
    scored
}
