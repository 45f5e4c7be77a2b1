//! Exact inner-product similarity index.
//!
//! Vectors are L2-normalized on insert and at query time, so inner product
//! equals cosine similarity. Search is an exact O(n) scan — corpus sizes are
//! bounded by per-session uploads, and correctness beats approximate
//! indexing at this scale.

use crate::types::EngineError;

/// Flat inner-product index over fixed-dimension vectors.
#[derive(Clone, Debug, Default)]
pub struct FlatIpIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIpIndex {
    /// Creates an empty index accepting vectors of `dimension`.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// The dimension every stored vector must have.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns `true` when no vectors are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Adds a vector, normalizing it in place.
    ///
    /// Mixing dimensions within one index is a fatal
    /// [`EngineError::Validation`].
    pub fn add(&mut self, mut vector: Vec<f32>) -> Result<(), EngineError> {
        if vector.len() != self.dimension {
            return Err(EngineError::Validation(format!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        l2_normalize(&mut vector);
        self.vectors.push(vector);
        Ok(())
    }

    /// Returns up to `k` `(position, score)` pairs ordered by descending
    /// inner-product score. An empty index yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, EngineError> {
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(EngineError::Validation(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut normalized = query.to_vec();
        l2_normalize(&mut normalized);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, dot(vector, &normalized)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Normalizes `vector` to unit L2 length. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_dimension() {
        let mut index = FlatIpIndex::new(3);
        assert!(matches!(
            index.add(vec![1.0, 0.0]),
            Err(EngineError::Validation(_))
        ));
        index.add(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn search_orders_by_descending_similarity() {
        let mut index = FlatIpIndex::new(2);
        index.add(vec![1.0, 0.0]).unwrap();
        index.add(vec![0.0, 1.0]).unwrap();
        index.add(vec![1.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1, "scores must be non-increasing");
        }
    }

    #[test]
    fn k_larger_than_population_returns_everything() {
        let mut index = FlatIpIndex::new(2);
        index.add(vec![1.0, 0.0]).unwrap();
        index.add(vec![0.5, 0.5]).unwrap();
        let hits = index.search(&[0.7, 0.7], 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn empty_index_returns_empty() {
        let index = FlatIpIndex::new(4);
        assert!(index.search(&[0.0; 4], 5).unwrap().is_empty());
    }

    #[test]
    fn normalization_makes_scale_irrelevant() {
        let mut index = FlatIpIndex::new(2);
        index.add(vec![10.0, 0.0]).unwrap();
        let hits = index.search(&[0.001, 0.0], 1).unwrap();
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_left_untouched() {
        let mut zero = vec![0.0f32; 3];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0, 0.0]);
    }
}
