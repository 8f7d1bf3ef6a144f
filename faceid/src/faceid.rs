use std::collections::BTreeMap;
use std::sync::Arc;

use facematch_catalog::{BlobStore, IdentityStore};
use tracing::info;

use crate::config::Config;
use crate::coordinator::{Collaborators, Coordinator, IndexState};
use crate::error::FaceIdError;
use crate::guard::Guard;
use crate::idgen::{IdSource, RandomIds};
use crate::snapshot::{LoadOutcome, Snapshotter};
use crate::store::EmbeddingStore;
use crate::timing::{OperationStats, Timings};
use crate::types::{
    Added, Edited, EmbeddingInfo, EnrollHints, FacesRemoved, IndexStats, ListQuery, Match,
    MatchPath, Page, Peek, Resolution,
};

/// A face embedding index kept consistent with an identity store and an
/// image store.
///
/// Thread-safe: every method takes one exclusive lock, so operations run in
/// lock-acquisition order. Share it across threads with `Arc`.
pub struct FaceIndex {
    config: Config,
    cx: Collaborators,
    state: Guard<IndexState>,
    timings: Timings,
}

impl std::fmt::Debug for FaceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceIndex")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FaceIndex {
    /// Open the index, loading the snapshot at the configured paths when it
    /// exists.
    pub fn open(
        config: Config,
        identities: Arc<dyn IdentityStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, FaceIdError> {
        Self::with_id_source(config, identities, blobs, Box::new(RandomIds::new()))
    }

    /// Like [`FaceIndex::open`] with a custom source of identity ids.
    pub fn with_id_source(
        config: Config,
        identities: Arc<dyn IdentityStore>,
        blobs: Arc<dyn BlobStore>,
        ids: Box<dyn IdSource>,
    ) -> Result<Self, FaceIdError> {
        let config = config.with_defaults();
        let mut store = EmbeddingStore::new(config.dim);
        let mut snapshot = Snapshotter::new(config.index_path.clone(), config.meta_path.clone());
        let outcome = snapshot.load(&mut store)?;
        info!(dim = config.dim, ?outcome, "faceid: index opened");

        Ok(Self {
            config,
            cx: Collaborators { identities, blobs },
            state: Guard::new(IndexState {
                store,
                snapshot,
                ids,
            }),
            timings: Timings::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn run<R>(&self, op: &'static str, f: impl FnOnce(&mut Coordinator<'_>) -> R) -> R {
        self.timings.time(op, || {
            self.state.with(|state| {
                let mut co = Coordinator {
                    state,
                    cx: &self.cx,
                    config: &self.config,
                };
                f(&mut co)
            })
        })
    }

    /// Enroll an embedding. Missing hints are filled in: a fresh identity id
    /// is generated and the image store assigns the image id.
    pub fn add(&self, vector: &[f32], hints: EnrollHints) -> Result<Added, FaceIdError> {
        self.run("add", |co| co.enroll(vector, hints))
    }

    /// Add a face to an existing identity.
    pub fn add_face(
        &self,
        identity_id: i64,
        vector: &[f32],
        image: Vec<u8>,
        path: Option<String>,
    ) -> Result<Added, FaceIdError> {
        self.run("add_face", |co| co.add_face(identity_id, vector, image, path))
    }

    /// Up to `k` nearest embeddings by cosine similarity.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Match>, FaceIdError> {
        self.run("query", |co| co.state.store.query_top_k(vector, k))
    }

    /// Find-or-enroll. See [`MatchPath`] for the thresholds.
    pub fn resolve(
        &self,
        vector: &[f32],
        hints: EnrollHints,
        path: MatchPath,
    ) -> Result<Resolution, FaceIdError> {
        self.run("resolve", |co| co.resolve(vector, hints, path))
    }

    /// Delete one embedding. Fails with `NotFound` for an unknown image id.
    pub fn delete_image(&self, image_id: i64) -> Result<bool, FaceIdError> {
        self.run("delete_image", |co| co.delete_image(image_id))
    }

    /// Delete an identity with all its embeddings and images.
    pub fn delete_identity(&self, identity_id: i64) -> Result<bool, FaceIdError> {
        self.run("delete_identity", |co| co.delete_identity(identity_id))
    }

    /// Remove all faces of an identity, keeping the identity.
    pub fn remove_faces(&self, identity_id: i64) -> Result<FacesRemoved, FaceIdError> {
        self.run("remove_faces", |co| co.remove_faces(identity_id))
    }

    pub fn edit(
        &self,
        image_id: i64,
        vector: Option<&[f32]>,
        path: Option<&str>,
    ) -> Result<Edited, FaceIdError> {
        self.run("edit", |co| co.edit(image_id, vector, path))
    }

    /// Erase everything: embeddings, snapshot, identities and images.
    pub fn reset(&self) -> Result<bool, FaceIdError> {
        self.run("reset", |co| co.reset())
    }

    pub fn stats(&self) -> IndexStats {
        self.run("stats", |co| co.state.store.stats())
    }

    pub fn list(&self, query: &ListQuery) -> Page<EmbeddingInfo> {
        self.run("list", |co| co.state.store.list(query))
    }

    pub fn image_ids_for_identity(&self, identity_id: i64) -> Vec<i64> {
        self.run("image_ids_for_identity", |co| {
            co.state.store.image_ids_for_identity(identity_id)
        })
    }

    pub fn record(&self, image_id: i64) -> Option<EmbeddingInfo> {
        self.run("record", |co| co.state.store.record(image_id))
    }

    pub fn peek(&self, n: usize) -> Peek {
        self.run("peek", |co| co.state.store.peek(n))
    }

    /// Reload the snapshot if its files changed since the last load or save.
    pub fn reload(&self) -> Result<LoadOutcome, FaceIdError> {
        self.run("reload", |co| {
            let IndexState {
                store, snapshot, ..
            } = &mut *co.state;
            snapshot.load(store)
        })
    }

    pub fn save(&self) -> Result<(), FaceIdError> {
        self.run("save", |co| co.save())
    }

    /// Delete identity rows that own no faces. Returns the deleted ids.
    pub fn reconcile(&self) -> Result<Vec<i64>, FaceIdError> {
        self.run("reconcile", |co| co.reconcile())
    }

    /// Latency statistics of every operation called so far.
    pub fn timings(&self) -> BTreeMap<&'static str, OperationStats> {
        self.timings.snapshot()
    }

    pub fn len(&self) -> usize {
        self.state.with(|s| s.store.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
