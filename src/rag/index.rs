use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::ApiError;

/// A knowledge-base entry. Immutable once the index is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Exact nearest-neighbor index over a fixed document set. Embeddings live in a
/// dense N x D matrix whose row `i` belongs to `documents[i]`; the whole
/// structure is read-only after `build`, so concurrent reads need no locking.
pub struct VectorIndex {
    documents: Vec<Document>,
    embeddings: Array2<f32>,
}

impl VectorIndex {
    /// Packs one embedding per document into the dense matrix. Fails when no
    /// embeddings were computed, when counts disagree, or when the embeddings
    /// do not share a single dimension.
    pub fn build(documents: Vec<Document>, embeddings: Vec<Vec<f32>>) -> Result<Self, ApiError> {
        if embeddings.is_empty() {
            return Err(ApiError::Internal(
                "no embeddings computed for knowledge base".to_string(),
            ));
        }
        if embeddings.len() != documents.len() {
            return Err(ApiError::Internal(format!(
                "embedding count {} does not match document count {}",
                embeddings.len(),
                documents.len()
            )));
        }

        let dim = embeddings[0].len();
        if dim == 0 {
            return Err(ApiError::Internal("embeddings are empty vectors".to_string()));
        }
        for (idx, embedding) in embeddings.iter().enumerate() {
            if embedding.len() != dim {
                return Err(ApiError::Internal(format!(
                    "embedding dimension mismatch at document {}: {} != {}",
                    idx,
                    embedding.len(),
                    dim
                )));
            }
        }

        let flat: Vec<f32> = embeddings.into_iter().flatten().collect();
        let embeddings = Array2::from_shape_vec((documents.len(), dim), flat)
            .map_err(ApiError::internal)?;

        Ok(Self {
            documents,
            embeddings,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn document(&self, idx: usize) -> Option<&Document> {
        self.documents.get(idx)
    }

    /// Exact k-NN by squared Euclidean distance, ascending, at most
    /// `min(k, N)` results. Equal distances keep insertion order (stable sort),
    /// so repeated runs rank identically.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, ApiError> {
        if query.len() != self.dim() {
            return Err(ApiError::BadRequest(format!(
                "query dimension mismatch: {} != {}",
                query.len(),
                self.dim()
            )));
        }

        let query_view = ArrayView1::from(query);
        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .rows()
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                let diff = &row - &query_view;
                (idx, diff.dot(&diff))
            })
            .collect();

        scored.sort_by(|left, right| left.1.partial_cmp(&right.1).unwrap_or(Ordering::Equal));
        scored.truncate(k.min(scored.len()));
        Ok(scored)
    }
}

/// Maps a squared L2 distance into (0, 1]; monotonically decreasing in
/// distance. Not a probability.
pub fn similarity_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        Document::new(id, format!("content of {}", id))
    }

    fn index_of(embeddings: Vec<Vec<f32>>) -> VectorIndex {
        let documents = (0..embeddings.len()).map(|i| doc(&format!("d{}", i))).collect();
        VectorIndex::build(documents, embeddings).expect("index should build")
    }

    #[test]
    fn build_rejects_empty_embedding_set() {
        let err = VectorIndex::build(vec![], vec![]);
        assert!(err.is_err());
    }

    #[test]
    fn build_rejects_dimension_mismatch() {
        let err = VectorIndex::build(
            vec![doc("a"), doc("b")],
            vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]],
        );
        assert!(err.is_err());
    }

    #[test]
    fn build_rejects_count_mismatch() {
        let err = VectorIndex::build(vec![doc("a"), doc("b")], vec![vec![1.0, 2.0]]);
        assert!(err.is_err());
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let index = index_of(vec![
            vec![10.0, 0.0],
            vec![1.0, 0.0],
            vec![5.0, 0.0],
        ]);
        let hits = index.search(&[0.0, 0.0], 3).expect("search should work");

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].0, 2);
        assert_eq!(hits[2].0, 0);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn search_returns_at_most_min_k_n() {
        let index = index_of(vec![vec![1.0], vec![2.0]]);
        assert_eq!(index.search(&[0.0], 5).expect("search").len(), 2);
        assert_eq!(index.search(&[0.0], 1).expect("search").len(), 1);
    }

    #[test]
    fn equal_distances_keep_insertion_order() {
        let index = index_of(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]]);
        let hits = index.search(&[0.0, 0.0], 3).expect("search should work");

        let order: Vec<usize> = hits.iter().map(|(idx, _)| *idx).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn search_rejects_query_dimension_mismatch() {
        let index = index_of(vec![vec![1.0, 2.0]]);
        let err = index.search(&[1.0, 2.0, 3.0], 1);
        assert!(matches!(err, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn similarity_score_is_bounded_and_decreasing() {
        assert_eq!(similarity_score(0.0), 1.0);
        assert!(similarity_score(1.0) > similarity_score(2.0));
        for d in [0.0, 0.5, 10.0, 1e6] {
            let score = similarity_score(d);
            assert!(score > 0.0 && score <= 1.0);
        }
    }

    #[test]
    fn distances_are_squared_l2() {
        let index = index_of(vec![vec![3.0, 4.0]]);
        let hits = index.search(&[0.0, 0.0], 1).expect("search should work");
        assert!((hits[0].1 - 25.0).abs() < 1e-5);
    }
}
