//! Vector helpers shared by the partitioner and the retrieval engine.

use std::cmp::Ordering;

use crate::integrations::Embedder;
use crate::Result;

/// Norms at or below this are treated as zero vectors and left unscaled.
const MIN_NORM: f32 = 1e-6;

/// A name with its similarity to some query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub name: String,
    pub score: f32,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > MIN_NORM {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Truncate or zero-pad to `dim`, then unit-normalize.
pub fn fit_dimension(mut vec: Vec<f32>, dim: usize) -> Vec<f32> {
    vec.resize(dim, 0.0);
    normalize(&mut vec);
    vec
}

/// Embed `text` and fit the result to `dim`.
pub async fn embed_fitted(embedder: &dyn Embedder, text: &str, dim: usize) -> Result<Vec<f32>> {
    let raw = embedder.embed(text).await?;
    Ok(fit_dimension(raw, dim))
}

/// The `n` candidates most similar to `query`, best first.
///
/// Ties keep candidate order, so callers should pass candidates in a stable order.
pub fn top_k<'a, I>(query: &[f32], candidates: I, n: usize) -> Vec<Scored>
where
    I: IntoIterator<Item = (&'a String, &'a Vec<f32>)>,
{
    let mut scored: Vec<Scored> = candidates
        .into_iter()
        .map(|(name, vec)| Scored {
            name: name.clone(),
            score: cosine_similarity(query, vec),
        })
        .collect();
    sort_by_score(&mut scored);
    scored.truncate(n);
    scored
}

/// Stable descending sort by score.
pub fn sort_by_score(scored: &mut [Scored]) {
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Render a vector the way the entity table stores it.
pub fn vec_to_str(vec: &[f32]) -> String {
    vec.iter()
        .map(|v| format!("{:.8}", v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-joined vector; `None` if any component is not a number.
pub fn str_to_vec(text: &str) -> Option<Vec<f32>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.split(',')
        .map(|part| part.trim().parse::<f32>().ok())
        .collect()
}
