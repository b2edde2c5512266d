//! Exhaustive cosine-similarity ranking.

use std::cmp::Ordering;

use thiserror::Error;

use crate::matrix::EmbeddingMatrix;

/// A query vector and a corpus matrix disagree on dimension.
///
/// This is a build or wiring bug, never an expected runtime condition.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("query has dimension {query} but corpus rows have dimension {corpus}")]
pub struct DimensionMismatch {
    pub query: usize,
    pub corpus: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredIndex {
    pub index: usize,
    /// Raw cosine similarity in [-1, 1].
    pub score: f32,
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine_with_query_norm(query: &[f32], query_norm: f32, row: &[f32]) -> f32 {
    let row_norm = norm(row);
    if query_norm == 0.0 || row_norm == 0.0 || !query_norm.is_finite() || !row_norm.is_finite() {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(row).map(|(a, b)| a * b).sum();
    let score = dot / (query_norm * row_norm);
    if score.is_nan() {
        0.0
    } else {
        // Adding +0.0 turns -0.0 into +0.0 so equal scores tie on index.
        score.clamp(-1.0, 1.0) + 0.0
    }
}

/// Cosine similarity; a zero-norm side yields 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_query_norm(a, norm(a), b)
}

/// Ranks every row of `matrix` against `query` and keeps the best `k`.
///
/// Ordering is descending score, then ascending row index. `k` beyond the corpus
/// size returns every row.
pub fn rank_top_k(
    query: &[f32],
    matrix: &EmbeddingMatrix,
    k: usize,
) -> Result<Vec<ScoredIndex>, DimensionMismatch> {
    if matrix.is_empty() || k == 0 {
        return Ok(Vec::new());
    }
    if query.len() != matrix.dimension() {
        return Err(DimensionMismatch {
            query: query.len(),
            corpus: matrix.dimension(),
        });
    }

    let query_norm = norm(query);
    let mut scored: Vec<ScoredIndex> = matrix
        .rows()
        .enumerate()
        .map(|(index, row)| ScoredIndex {
            index,
            score: cosine_with_query_norm(query, query_norm, row),
        })
        .collect();

    let by_rank = |a: &ScoredIndex, b: &ScoredIndex| -> Ordering {
        b.score.total_cmp(&a.score).then(a.index.cmp(&b.index))
    };
    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, by_rank);
        scored.truncate(k);
    }
    scored.sort_by(by_rank);
    Ok(scored)
}
