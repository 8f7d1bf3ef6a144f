//! The embedding store: a flat inner-product index plus four parallel
//! metadata sequences (image ids, paths, identity ids, normalized vectors).
//!
//! Slot `i` of every sequence describes the vector at slot `i` of the index.
//! Slots are internal: deletes and edits rebuild the index and reassign them,
//! so nothing outside this module refers to a slot.

use std::collections::HashSet;

use facematch_vecstore::{FlatIndex, l2_norm, normalized};

use crate::error::{FaceIdError, Missing};
use crate::types::{
    EditedField, EmbeddingInfo, IndexStats, ListQuery, Match, Page, Peek, SortBy,
};

const NORM_TOLERANCE: f64 = 1e-3;

/// Owns the similarity index and its shadow metadata.
///
/// Not synchronized. The face index keeps it behind its critical section.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    dim: usize,
    index: FlatIndex,
    image_ids: Vec<i64>,
    paths: Vec<Option<String>>,
    identity_ids: Vec<i64>,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingStore {
    /// Create an empty store. Panics if `dim` is 0.
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "faceid: EmbeddingStore dim must be positive");
        Self {
            dim,
            index: FlatIndex::new(dim),
            image_ids: Vec::new(),
            paths: Vec::new(),
            identity_ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Check the dimension and return a unit-length copy of `vector`.
    pub fn normalize(&self, vector: &[f32]) -> Result<Vec<f32>, FaceIdError> {
        if vector.len() != self.dim {
            return Err(FaceIdError::DimensionMismatch {
                got: vector.len(),
                want: self.dim,
            });
        }
        normalized(vector).ok_or(FaceIdError::ZeroNormVector)
    }

    /// Append records. Every vector is validated and normalized before the
    /// store changes, so an error leaves it untouched.
    ///
    /// The caller guarantees none of `image_ids` is already stored.
    pub fn add_batch(
        &mut self,
        vectors: &[Vec<f32>],
        image_ids: &[i64],
        paths: &[Option<String>],
        identity_ids: &[i64],
    ) -> Result<(), FaceIdError> {
        let n = vectors.len();
        if image_ids.len() != n || paths.len() != n || identity_ids.len() != n {
            return Err(FaceIdError::BatchLengthMismatch {
                vectors: n,
                image_ids: image_ids.len(),
                paths: paths.len(),
                identity_ids: identity_ids.len(),
            });
        }

        let normed = vectors
            .iter()
            .map(|v| self.normalize(v))
            .collect::<Result<Vec<_>, _>>()?;

        self.index.add(&normed)?;
        self.image_ids.extend_from_slice(image_ids);
        self.paths.extend_from_slice(paths);
        self.identity_ids.extend_from_slice(identity_ids);
        self.vectors.extend(normed);
        Ok(())
    }

    /// Return up to `k` matches by descending cosine similarity. Equal
    /// scores keep insertion order. An empty store yields no matches.
    pub fn query_top_k(&self, vector: &[f32], k: usize) -> Result<Vec<Match>, FaceIdError> {
        let q = self.normalize(vector)?;
        let hits = self.index.search(&q, k)?;
        Ok(hits
            .into_iter()
            .map(|h| Match {
                image_id: self.image_ids[h.slot],
                identity_id: self.identity_ids[h.slot],
                score: h.score,
                path: self.paths[h.slot].clone(),
            })
            .collect())
    }

    /// Remove one record and rebuild the index. Returns false when the
    /// image id is not stored.
    pub fn delete_by_image_id(&mut self, image_id: i64) -> Result<bool, FaceIdError> {
        let doomed: Vec<bool> = self.image_ids.iter().map(|&id| id == image_id).collect();
        Ok(self.remove_marked(&doomed)? > 0)
    }

    /// Remove every record of an identity and rebuild the index. Returns the
    /// number of records removed.
    pub fn delete_by_identity_id(&mut self, identity_id: i64) -> Result<usize, FaceIdError> {
        let doomed: Vec<bool> = self
            .identity_ids
            .iter()
            .map(|&id| id == identity_id)
            .collect();
        self.remove_marked(&doomed)
    }

    /// Replace the vector and/or path of a record, keeping its image id.
    /// A new vector triggers a full rebuild. Empty paths are ignored.
    pub fn replace(
        &mut self,
        image_id: i64,
        vector: Option<&[f32]>,
        path: Option<&str>,
    ) -> Result<Vec<EditedField>, FaceIdError> {
        let slot = self
            .slot_of(image_id)
            .ok_or(FaceIdError::NotFound(Missing::Image(image_id)))?;

        let mut updated = Vec::new();
        if let Some(v) = vector {
            let unit = self.normalize(v)?;
            let mut vectors = self.vectors.clone();
            vectors[slot] = unit;
            let index = FlatIndex::from_vectors(self.dim, &vectors)?;
            self.vectors = vectors;
            self.index = index;
            updated.push(EditedField::Embedding);
        }
        if let Some(p) = path.filter(|p| !p.is_empty()) {
            self.paths[slot] = Some(p.to_string());
            updated.push(EditedField::Path);
        }
        Ok(updated)
    }

    /// Remove every record.
    pub fn reset(&mut self) {
        self.index.reset();
        self.image_ids.clear();
        self.paths.clear();
        self.identity_ids.clear();
        self.vectors.clear();
    }

    pub fn contains_image(&self, image_id: i64) -> bool {
        self.slot_of(image_id).is_some()
    }

    /// Identity owning an image, if stored.
    pub fn identity_of(&self, image_id: i64) -> Option<i64> {
        self.slot_of(image_id).map(|s| self.identity_ids[s])
    }

    pub fn count_for_identity(&self, identity_id: i64) -> usize {
        self.identity_ids.iter().filter(|&&id| id == identity_id).count()
    }

    pub fn image_ids_for_identity(&self, identity_id: i64) -> Vec<i64> {
        self.image_ids
            .iter()
            .zip(self.identity_ids.iter())
            .filter(|(_, id)| **id == identity_id)
            .map(|(img, _)| *img)
            .collect()
    }

    /// Metadata of one record.
    pub fn record(&self, image_id: i64) -> Option<EmbeddingInfo> {
        self.slot_of(image_id).map(|s| self.info(s))
    }

    /// Distinct identity ids present in the store.
    pub fn identity_ids(&self) -> HashSet<i64> {
        self.identity_ids.iter().copied().collect()
    }

    /// Paginated, sorted listing of record metadata.
    pub fn list(&self, q: &ListQuery) -> Page<EmbeddingInfo> {
        let mut results: Vec<EmbeddingInfo> = (0..self.len())
            .filter(|&i| q.identity_id.is_none_or(|id| self.identity_ids[i] == id))
            .map(|i| self.info(i))
            .collect();

        match q.sort {
            SortBy::ImageIdAsc => results.sort_by_key(|r| r.image_id),
            SortBy::ImageIdDesc => results.sort_by(|a, b| b.image_id.cmp(&a.image_id)),
            SortBy::IdentityIdAsc => results.sort_by_key(|r| r.identity_id),
            SortBy::IdentityIdDesc => results.sort_by(|a, b| b.identity_id.cmp(&a.identity_id)),
            SortBy::PathAsc => results.sort_by(|a, b| a.path.cmp(&b.path)),
            SortBy::PathDesc => results.sort_by(|a, b| b.path.cmp(&a.path)),
        }

        let page_size = q.page_size.max(1);
        let total = results.len();
        let total_pages = total.div_ceil(page_size).max(1);
        let page = q.page.clamp(1, total_pages);
        let results = results
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();

        Page {
            total,
            total_pages,
            page,
            page_size,
            results,
        }
    }

    /// Metadata of the first and last `n` records in slot order.
    pub fn peek(&self, n: usize) -> Peek {
        let total = self.len();
        Peek {
            first: (0..n.min(total)).map(|i| self.info(i)).collect(),
            last: (total.saturating_sub(n)..total).map(|i| self.info(i)).collect(),
            total,
        }
    }

    /// Integrity diagnostics. Scans the index itself, not the vector cache.
    pub fn stats(&self) -> IndexStats {
        let unique_image_ids = self.image_ids.iter().collect::<HashSet<_>>().len();

        let mut nan_vectors = 0;
        let mut non_unit_vectors = 0;
        let mut min_value: Option<f32> = None;
        let mut max_value: Option<f32> = None;
        for v in self.index.iter() {
            if v.iter().any(|x| x.is_nan()) {
                nan_vectors += 1;
                continue;
            }
            if (l2_norm(v) - 1.0).abs() > NORM_TOLERANCE {
                non_unit_vectors += 1;
            }
            for &x in v {
                min_value = Some(min_value.map_or(x, |m| m.min(x)));
                max_value = Some(max_value.map_or(x, |m| m.max(x)));
            }
        }

        IndexStats {
            num_vectors: self.index.len(),
            num_image_ids: self.image_ids.len(),
            num_paths: self.paths.len(),
            num_identity_ids: self.identity_ids.len(),
            num_embeddings: self.vectors.len(),
            unique_image_ids,
            unique_paths: self.paths.iter().collect::<HashSet<_>>().len(),
            unique_identity_ids: self.identity_ids.iter().collect::<HashSet<_>>().len(),
            duplicate_image_ids: self.image_ids.len() - unique_image_ids,
            nan_vectors,
            non_unit_vectors,
            min_value,
            max_value,
            consistent: self.check_invariants(),
        }
    }

    /// All four sequences have the same length as the index.
    pub fn check_invariants(&self) -> bool {
        let n = self.index.len();
        self.image_ids.len() == n
            && self.paths.len() == n
            && self.identity_ids.len() == n
            && self.vectors.len() == n
    }

    pub(crate) fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub(crate) fn columns(&self) -> (&[i64], &[Option<String>], &[i64], &[Vec<f32>]) {
        (&self.image_ids, &self.paths, &self.identity_ids, &self.vectors)
    }

    /// Install state read from a snapshot. The caller has checked that all
    /// sequences match the index length.
    pub(crate) fn install(
        &mut self,
        index: FlatIndex,
        image_ids: Vec<i64>,
        paths: Vec<Option<String>>,
        identity_ids: Vec<i64>,
        vectors: Vec<Vec<f32>>,
    ) {
        self.index = index;
        self.image_ids = image_ids;
        self.paths = paths;
        self.identity_ids = identity_ids;
        self.vectors = vectors;
    }

    fn slot_of(&self, image_id: i64) -> Option<usize> {
        self.image_ids.iter().position(|&id| id == image_id)
    }

    fn info(&self, slot: usize) -> EmbeddingInfo {
        EmbeddingInfo {
            image_id: self.image_ids[slot],
            identity_id: self.identity_ids[slot],
            path: self.paths[slot].clone(),
        }
    }

    /// Drop every slot marked true and rebuild the index from the rest.
    /// The new index is built before any sequence changes.
    fn remove_marked(&mut self, doomed: &[bool]) -> Result<usize, FaceIdError> {
        let keep: Vec<usize> = (0..doomed.len()).filter(|&i| !doomed[i]).collect();
        let removed = doomed.len() - keep.len();
        if removed == 0 {
            return Ok(0);
        }

        let vectors: Vec<Vec<f32>> = keep.iter().map(|&i| self.vectors[i].clone()).collect();
        let index = FlatIndex::from_vectors(self.dim, &vectors)?;

        self.image_ids = keep.iter().map(|&i| self.image_ids[i]).collect();
        self.paths = keep.iter().map(|&i| self.paths[i].clone()).collect();
        self.identity_ids = keep.iter().map(|&i| self.identity_ids[i]).collect();
        self.vectors = vectors;
        self.index = index;
        Ok(removed)
    }
}
