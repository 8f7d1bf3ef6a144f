use crate::cosine::inner_product;
use crate::error::VecError;

/// Hit is a single result from a [`FlatIndex`] search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Slot of the matched vector (insertion order).
    pub slot: usize,

    /// Inner product between the query and the stored vector.
    /// Higher values indicate higher similarity.
    pub score: f32,
}

/// FlatIndex is an exact inner-product index.
///
/// Vectors are stored contiguously in insertion order and every search scans
/// all of them. The index does not normalize: callers that want cosine
/// similarity must add and query unit vectors.
///
/// There is no remove or replace primitive. A caller that needs either
/// rebuilds the index with [`FlatIndex::rebuild`], which is O(n·d).
///
/// FlatIndex is not internally synchronized; the owner serializes access.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index. Panics if `dim` is 0.
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "vecstore: FlatIndex dim must be positive");
        Self {
            dim,
            data: Vec::new(),
        }
    }

    /// Build an index from a set of vectors.
    pub fn from_vectors(dim: usize, vectors: &[Vec<f32>]) -> Result<Self, VecError> {
        let mut idx = Self::new(dim);
        idx.add(vectors)?;
        Ok(idx)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Return the number of vectors in the index.
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append vectors. Every vector is checked before any is stored, so a
    /// dimension mismatch leaves the index untouched.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), VecError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(VecError::DimensionMismatch {
                got: bad.len(),
                want: self.dim,
            });
        }
        self.data.reserve(vectors.len() * self.dim);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    /// Return the top-k stored vectors by descending inner product.
    /// Equal scores are ordered by ascending slot.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, VecError> {
        if query.len() != self.dim {
            return Err(VecError::DimensionMismatch {
                got: query.len(),
                want: self.dim,
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Hit> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(slot, v)| Hit {
                slot,
                score: inner_product(query, v),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.slot.cmp(&b.slot)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Return a copy of the vector stored at `slot`.
    pub fn reconstruct(&self, slot: usize) -> Result<Vec<f32>, VecError> {
        let len = self.len();
        if slot >= len {
            return Err(VecError::SlotOutOfRange { slot, len });
        }
        let start = slot * self.dim;
        Ok(self.data[start..start + self.dim].to_vec())
    }

    /// Return copies of all stored vectors in slot order.
    pub fn reconstruct_all(&self) -> Vec<Vec<f32>> {
        self.data.chunks_exact(self.dim).map(|v| v.to_vec()).collect()
    }

    /// Iterate over stored vectors in slot order without copying.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim)
    }

    /// Replace the whole contents with `vectors`. On error the index is
    /// left unchanged.
    pub fn rebuild(&mut self, vectors: &[Vec<f32>]) -> Result<(), VecError> {
        let fresh = Self::from_vectors(self.dim, vectors)?;
        *self = fresh;
        Ok(())
    }

    /// Remove every vector.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    pub(crate) fn raw(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn from_raw(dim: usize, data: Vec<f32>) -> Self {
        Self { dim, data }
    }
}
