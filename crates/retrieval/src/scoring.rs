//! Late-interaction similarity scoring.
//!
//! ```text
//! MaxSim(Q, D) = sum over q in Q of max over d in D of sim(q, d)
//! ```

use crate::types::{Distance, MultiVector};

/// Similarity of two single vectors of equal length.
///
/// Euclidean distance is negated so that larger is always more similar.
pub fn similarity(a: &[f32], b: &[f32], distance: Distance) -> f32 {
    match distance {
        Distance::Cosine => cosine_similarity(a, b),
        Distance::Dot => dot(a, b),
        Distance::Euclid => -a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

/// Cosine similarity; zero when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// MaxSim score of a query multi-vector against a document multi-vector.
pub fn max_sim(query: &MultiVector, document: &MultiVector, distance: Distance) -> f32 {
    query
        .vectors()
        .iter()
        .map(|q| {
            document
                .vectors()
                .iter()
                .map(|d| similarity(q, d, distance))
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .sum()
}
