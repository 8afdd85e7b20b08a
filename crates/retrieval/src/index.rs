//! Flat inner-product index over unit-normalised embeddings.
//!
//! After L2 normalisation the inner product equals cosine similarity, so a
//! search is an exhaustive dot product against every stored row.

use cryslgen_core::error::RetrievalError;

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// Chunk ids parallel to a row-major matrix of normalised vectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingIndex {
    ids: Vec<String>,
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingIndex {
    /// Normalise `vectors` and index them under `ids`.
    ///
    /// Zero vectors give an empty index. Lengths and row dimensions must agree
    /// and every value must be finite.
    pub fn build(vectors: Vec<Vec<f32>>, ids: Vec<String>) -> Result<Self, RetrievalError> {
        if vectors.len() != ids.len() {
            return Err(RetrievalError::ShapeMismatch(format!(
                "{} vectors for {} ids",
                vectors.len(),
                ids.len()
            )));
        }
        let Some(dim) = vectors.first().map(Vec::len) else {
            return Ok(Self::default());
        };
        if dim == 0 {
            return Err(RetrievalError::ShapeMismatch("empty embedding vectors".into()));
        }

        let mut data = Vec::with_capacity(vectors.len() * dim);
        for (i, row) in vectors.iter().enumerate() {
            if row.len() != dim {
                return Err(RetrievalError::ShapeMismatch(format!(
                    "row {i} has dimension {}, expected {dim}",
                    row.len()
                )));
            }
            if row.iter().any(|x| !x.is_finite()) {
                return Err(RetrievalError::ShapeMismatch(format!("row {i} has non-finite values")));
            }
            data.extend(normalized(row));
        }

        Ok(Self { ids, dim, data })
    }

    /// Top-`k` ids by cosine similarity to `query`, best first.
    ///
    /// Ties keep insertion order; non-finite scores rank last. Returns nothing for `k == 0`, an empty
    /// index, or a query of the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if k == 0 || self.is_empty() || query.len() != self.dim {
            return Vec::new();
        }

        let q = normalized(query);
        let mut scored: Vec<(usize, f32)> = self
            .rows()
            .enumerate()
            .map(|(i, row)| (i, dot(row, &q)))
            .collect();

        for (_, score) in scored.iter_mut() {
            if !score.is_finite() {
                *score = f32::NEG_INFINITY;
            }
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                id: self.ids[i].clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Normalised rows in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on 0; an empty index has no rows anyway.
        self.data.chunks_exact(self.dim.max(1))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Unit-length copy of `v`. A zero vector stays zero.
fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm < 1e-12 {
        return v.to_vec();
    }
    v.iter().map(|x| ((*x as f64) / norm) as f32).collect()
}
