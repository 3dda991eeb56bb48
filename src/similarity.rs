//! The similarity oracle seam and its lexical backend.
//!
//! An oracle turns a batch of normalized documents into an N×N symmetric
//! similarity matrix with a unit diagonal. The dedup engine is agnostic to
//! which backend produced the matrix; `TfIdfOracle` is the lexical one, the
//! embedding-based one lives in `crate::embedding`.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::error::{DedupError, Result};
use crate::TARGET_SIMILARITY;

/// Symmetric pairwise similarity over one document batch. Scores are in
/// `[0, 1]` with `get(i, i) == 1.0`.
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    n: usize,
    scores: Vec<f64>,
}

impl SimilarityMatrix {
    pub fn new(n: usize) -> Self {
        let mut matrix = Self {
            n,
            scores: vec![0.0; n * n],
        };
        for i in 0..n {
            matrix.set(i, i, 1.0);
        }
        matrix
    }

    /// Builds a matrix from explicit entries, for fixed-score test oracles.
    /// Unlisted pairs stay 0; the diagonal stays 1.
    pub fn from_pairs(n: usize, pairs: &[(usize, usize, f64)]) -> Self {
        let mut matrix = Self::new(n);
        for &(i, j, score) in pairs {
            matrix.set(i, j, score);
        }
        matrix
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.scores[i * self.n + j]
    }

    pub fn set(&mut self, i: usize, j: usize, score: f64) {
        self.scores[i * self.n + j] = score;
        self.scores[j * self.n + i] = score;
    }
}

/// Produces the pairwise similarity matrix for a batch of normalized
/// documents. Implementations must be shareable across the per-group
/// worker fan-out.
pub trait SimilarityOracle: Send + Sync {
    fn name(&self) -> &'static str;

    fn similarity_matrix(&self, docs: &[String]) -> Result<SimilarityMatrix>;
}

/// TF-IDF + cosine backend.
///
/// Matches the usual vectorizer conventions: raw term counts, smoothed idf
/// `ln((1 + n) / (1 + df)) + 1`, L2-normalized document vectors. An empty
/// document has a zero vector and scores 0 against everything, itself
/// excepted (the diagonal is pinned to 1).
#[derive(Debug, Default, Clone)]
pub struct TfIdfOracle;

impl TfIdfOracle {
    fn vectorize(&self, docs: &[String]) -> Vec<Vec<(usize, f64)>> {
        let n = docs.len();

        // Vocabulary and document frequencies over the whole batch.
        let mut vocab: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();
        let mut term_ids: Vec<Vec<usize>> = Vec::with_capacity(n);

        for doc in docs {
            let mut ids: Vec<usize> = Vec::new();
            for term in doc.split_whitespace() {
                let next_id = vocab.len();
                let id = *vocab.entry(term).or_insert(next_id);
                if id == doc_freq.len() {
                    doc_freq.push(0);
                }
                ids.push(id);
            }
            let mut seen = ids.clone();
            seen.sort_unstable();
            seen.dedup();
            for &id in &seen {
                doc_freq[id] += 1;
            }
            term_ids.push(ids);
        }

        let idf: Vec<f64> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n as f64) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        // Sparse tf-idf vectors, L2-normalized, sorted by term id.
        term_ids
            .into_iter()
            .map(|ids| {
                let mut counts: HashMap<usize, f64> = HashMap::new();
                for id in ids {
                    *counts.entry(id).or_insert(0.0) += 1.0;
                }
                let mut vector: Vec<(usize, f64)> = counts
                    .into_iter()
                    .map(|(id, tf)| (id, tf * idf[id]))
                    .collect();
                vector.sort_unstable_by_key(|&(id, _)| id);

                let norm = vector.iter().map(|&(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for entry in &mut vector {
                        entry.1 /= norm;
                    }
                }
                vector
            })
            .collect()
    }
}

fn sparse_dot(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut ai, mut bi) = (0, 0);
    let mut dot = 0.0;
    while ai < a.len() && bi < b.len() {
        match a[ai].0.cmp(&b[bi].0) {
            std::cmp::Ordering::Less => ai += 1,
            std::cmp::Ordering::Greater => bi += 1,
            std::cmp::Ordering::Equal => {
                dot += a[ai].1 * b[bi].1;
                ai += 1;
                bi += 1;
            }
        }
    }
    dot
}

impl SimilarityOracle for TfIdfOracle {
    fn name(&self) -> &'static str {
        "tfidf"
    }

    fn similarity_matrix(&self, docs: &[String]) -> Result<SimilarityMatrix> {
        let start = Instant::now();
        let vectors = self.vectorize(docs);
        let mut matrix = SimilarityMatrix::new(docs.len());

        for i in 0..docs.len() {
            for j in (i + 1)..docs.len() {
                let score = sparse_dot(&vectors[i], &vectors[j]);
                if !score.is_finite() {
                    return Err(DedupError::Compute(format!(
                        "non-finite cosine for documents {i} and {j}"
                    )));
                }
                matrix.set(i, j, score.clamp(0.0, 1.0));
            }
        }

        debug!(
            target: TARGET_SIMILARITY,
            documents = docs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tf-idf similarity matrix computed"
        );
        Ok(matrix)
    }
}
