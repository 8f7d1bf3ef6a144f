//! Multi-store mutations of the face index.
//!
//! The embedding store, the identity store and the image store commit
//! independently. Enrollment runs as a [`Saga`] so a failure after the image
//! is written removes it again. Deletes go index first: the index is the
//! source of truth for which faces exist, and a leftover identity with no
//! faces is removed by a later cascade or by [`Coordinator::reconcile`].

use std::fmt;
use std::sync::Arc;

use facematch_catalog::{BlobStore, Identity, IdentityStore, IdentityUpdate, NewImage};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{FaceIdError, Missing};
use crate::idgen::{IdSource, generate_identity_id};
use crate::saga::Saga;
use crate::snapshot::Snapshotter;
use crate::store::EmbeddingStore;
use crate::types::{Added, Edited, EnrollHints, FacesRemoved};

/// Everything guarded by the face index lock.
pub struct IndexState {
    pub store: EmbeddingStore,
    pub snapshot: Snapshotter,
    pub ids: Box<dyn IdSource>,
}

impl fmt::Debug for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexState")
            .field("store", &self.store)
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

/// The external stores the face index keeps in step with its embeddings.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub identities: Arc<dyn IdentityStore>,
    pub blobs: Arc<dyn BlobStore>,
}

#[derive(Default)]
struct Enrollment {
    image_id: i64,
}

/// Runs mutations against the locked state. Built fresh for every call
/// inside the critical section.
pub(crate) struct Coordinator<'a> {
    pub state: &'a mut IndexState,
    pub cx: &'a Collaborators,
    pub config: &'a Config,
}

impl Coordinator<'_> {
    /// Enroll an embedding, creating the identity when it does not exist.
    /// Without an identity hint a fresh identity id is generated.
    pub fn enroll(&mut self, vector: &[f32], hints: EnrollHints) -> Result<Added, FaceIdError> {
        self.validate(vector, hints.image_id)?;
        let (identity_id, exists) = match hints.identity_id {
            Some(id) => (id, self.cx.identities.get(id)?.is_some()),
            None => (self.allocate_identity_id()?, false),
        };
        self.enroll_as(vector, hints, identity_id, exists)
    }

    /// Add one more face to an identity that already exists.
    pub fn add_face(
        &mut self,
        identity_id: i64,
        vector: &[f32],
        image: Vec<u8>,
        path: Option<String>,
    ) -> Result<Added, FaceIdError> {
        self.validate(vector, None)?;
        if self.cx.identities.get(identity_id)?.is_none() {
            return Err(FaceIdError::NotFound(Missing::Identity(identity_id)));
        }
        let hints = EnrollHints {
            identity_id: Some(identity_id),
            path,
            image,
            ..Default::default()
        };
        self.enroll_as(vector, hints, identity_id, true)
    }

    /// Delete one embedding and its image. Deletes the identity too when
    /// this was its last embedding.
    pub fn delete_image(&mut self, image_id: i64) -> Result<bool, FaceIdError> {
        let identity_id = self
            .state
            .store
            .identity_of(image_id)
            .ok_or(FaceIdError::NotFound(Missing::Image(image_id)))?;

        self.state.store.delete_by_image_id(image_id)?;
        if let Err(e) = self.cx.blobs.delete_image(image_id) {
            warn!(image_id, error = %e, "faceid: delete image blob failed");
        }
        if self.state.store.count_for_identity(identity_id) == 0 {
            match self.cx.identities.delete(identity_id) {
                Ok(_) => info!(identity_id, "faceid: last face removed, identity deleted"),
                Err(e) => warn!(identity_id, error = %e, "faceid: cascade identity delete failed"),
            }
        }

        // The cascade depends only on the index delete; save errors surface last.
        self.save()?;
        info!(image_id, identity_id, "faceid: image deleted");
        Ok(true)
    }

    /// Delete every embedding, image and the identity row itself.
    ///
    /// An identity row left with no embeddings is still deleted.
    pub fn delete_identity(&mut self, identity_id: i64) -> Result<bool, FaceIdError> {
        let removed = self.state.store.delete_by_identity_id(identity_id)?;
        if removed == 0 {
            if self.cx.identities.get(identity_id)?.is_none() {
                return Err(FaceIdError::NotFound(Missing::Identity(identity_id)));
            }
            debug!(identity_id, "faceid: deleting identity with no faces");
        }

        let row = self.cx.identities.delete(identity_id);
        if let Err(e) = &row {
            warn!(identity_id, error = %e, "faceid: delete identity row failed");
        }
        if let Err(e) = self.cx.blobs.delete_images_of(identity_id) {
            warn!(identity_id, error = %e, "faceid: delete identity images failed");
        }
        let saved = if removed > 0 { self.save() } else { Ok(()) };

        // The index change stands either way; report the row failure first.
        row?;
        saved?;
        info!(identity_id, removed, "faceid: identity deleted");
        Ok(true)
    }

    /// Remove every face of an identity and keep the identity row.
    pub fn remove_faces(&mut self, identity_id: i64) -> Result<FacesRemoved, FaceIdError> {
        if self.cx.identities.get(identity_id)?.is_none() {
            return Err(FaceIdError::NotFound(Missing::Identity(identity_id)));
        }
        let embeddings_removed = self.state.store.delete_by_identity_id(identity_id)?;
        if embeddings_removed > 0 {
            self.save()?;
        }
        let images_removed = self.cx.blobs.delete_images_of(identity_id)?;
        info!(
            identity_id,
            embeddings_removed, images_removed, "faceid: faces removed"
        );
        Ok(FacesRemoved {
            identity_id,
            embeddings_removed,
            images_removed,
        })
    }

    /// Replace the vector and/or path of an embedding.
    pub fn edit(
        &mut self,
        image_id: i64,
        vector: Option<&[f32]>,
        path: Option<&str>,
    ) -> Result<Edited, FaceIdError> {
        let updated_fields = self.state.store.replace(image_id, vector, path)?;
        if !updated_fields.is_empty() {
            self.save()?;
        }
        debug!(image_id, ?updated_fields, "faceid: embedding edited");
        Ok(Edited {
            image_id,
            updated_fields,
        })
    }

    /// Wipe the index, both snapshot files and both collaborator stores,
    /// then write an empty snapshot.
    pub fn reset(&mut self) -> Result<bool, FaceIdError> {
        self.state.store.reset();
        self.state.snapshot.wipe()?;
        self.cx.identities.reset_schema()?;
        self.cx.blobs.clear()?;
        self.save()?;
        info!("faceid: reset complete");
        Ok(true)
    }

    /// Delete identity rows that have no embedding in the index and no
    /// recorded images. Returns the deleted ids.
    pub fn reconcile(&mut self) -> Result<Vec<i64>, FaceIdError> {
        let present = self.state.store.identity_ids();
        let mut deleted = Vec::new();
        for id in self.cx.identities.list_ids()? {
            if present.contains(&id) || self.cx.identities.count_embeddings(id)? > 0 {
                continue;
            }
            if self.cx.identities.delete(id)? {
                deleted.push(id);
            }
        }
        if !deleted.is_empty() {
            info!(count = deleted.len(), "faceid: reconciled orphan identities");
        }
        Ok(deleted)
    }

    pub fn save(&mut self) -> Result<(), FaceIdError> {
        self.state.snapshot.save(&self.state.store)
    }

    fn validate(&self, vector: &[f32], image_id: Option<i64>) -> Result<(), FaceIdError> {
        self.state.store.normalize(vector)?;
        if let Some(id) = image_id {
            if self.state.store.contains_image(id) {
                return Err(FaceIdError::DuplicateImageId(id));
            }
        }
        Ok(())
    }

    fn allocate_identity_id(&mut self) -> Result<i64, FaceIdError> {
        let in_index = self.state.store.identity_ids();
        let identities = &self.cx.identities;
        let config = self.config;
        generate_identity_id(
            self.state.ids.as_mut(),
            config.identity_id_min,
            config.identity_id_max,
            config.max_id_attempts,
            |id| {
                in_index.contains(&id)
                    || match identities.get(id) {
                        Ok(found) => found.is_some(),
                        Err(e) => {
                            warn!(id, error = %e, "faceid: identity lookup failed, treating id as taken");
                            true
                        }
                    }
            },
        )
    }

    fn enroll_as(
        &mut self,
        vector: &[f32],
        hints: EnrollHints,
        identity_id: i64,
        exists: bool,
    ) -> Result<Added, FaceIdError> {
        let EnrollHints {
            image_id,
            path,
            image,
            profile,
            ..
        } = hints;
        let identities = &self.cx.identities;
        let blobs = &self.cx.blobs;
        let IndexState {
            store, snapshot, ..
        } = &mut *self.state;
        let avatar = (!image.is_empty()).then(|| image.clone());

        let mut saga: Saga<'_, Enrollment> = Saga::new("enroll");
        if exists {
            if let Some(bytes) = avatar {
                saga = saga.step("refresh avatar", move |_| {
                    if let Err(e) = identities.update(identity_id, IdentityUpdate::avatar(bytes)) {
                        warn!(identity_id, error = %e, "faceid: avatar refresh failed");
                    }
                    Ok(())
                });
            }
        } else {
            let identity = Identity::new(identity_id, profile, avatar);
            saga = saga.step("create identity", move |_| {
                identities.create(&identity)?;
                Ok(())
            });
        }

        let mut enrollment = Enrollment::default();
        saga.compensated(
            "put image",
            move |e: &mut Enrollment| {
                e.image_id = blobs.put_image(NewImage {
                    image_id,
                    identity_id,
                    bytes: image,
                })?;
                Ok(())
            },
            move |e| {
                blobs.delete_image(e.image_id)?;
                Ok(())
            },
        )
        .step("index add", |e| {
            if store.contains_image(e.image_id) {
                return Err(FaceIdError::DuplicateImageId(e.image_id));
            }
            store.add_batch(
                &[vector.to_vec()],
                &[e.image_id],
                std::slice::from_ref(&path),
                &[identity_id],
            )
        })
        .run(&mut enrollment)?;

        let image_id = enrollment.image_id;
        info!(
            image_id,
            identity_id,
            created_identity = !exists,
            "faceid: face enrolled"
        );
        snapshot.save(store)?;

        Ok(Added {
            image_id,
            identity_id,
            created_identity: !exists,
        })
    }
}
