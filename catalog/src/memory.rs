//! In-memory identity and image store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::error::{CatalogError, CatalogResult};
use crate::store::{BlobStore, IdentityStore};
use crate::types::{FaceImage, Identity, IdentityUpdate, NewImage};

#[derive(Default)]
struct Tables {
    identities: BTreeMap<i64, Identity>,
    images: BTreeMap<i64, FaceImage>,
    next_image_id: i64,
}

/// An in-memory catalog implementing both [`IdentityStore`] and
/// [`BlobStore`]. Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CatalogResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| CatalogError::Storage(e.to_string()))
    }

    /// Number of stored identities.
    pub fn identity_count(&self) -> usize {
        self.lock().map(|t| t.identities.len()).unwrap_or(0)
    }

    /// Number of stored images.
    pub fn image_count(&self) -> usize {
        self.lock().map(|t| t.images.len()).unwrap_or(0)
    }
}

impl IdentityStore for MemoryCatalog {
    fn get(&self, id: i64) -> CatalogResult<Option<Identity>> {
        Ok(self.lock()?.identities.get(&id).cloned())
    }

    fn create(&self, identity: &Identity) -> CatalogResult<()> {
        let mut t = self.lock()?;
        if t.identities.contains_key(&identity.id) {
            return Err(CatalogError::IdentityExists(identity.id));
        }
        t.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    fn update(&self, id: i64, update: IdentityUpdate) -> CatalogResult<Identity> {
        let mut t = self.lock()?;
        let identity = t
            .identities
            .get_mut(&id)
            .ok_or(CatalogError::IdentityNotFound(id))?;
        update.apply(identity);
        Ok(identity.clone())
    }

    fn delete(&self, id: i64) -> CatalogResult<bool> {
        Ok(self.lock()?.identities.remove(&id).is_some())
    }

    fn count_embeddings(&self, id: i64) -> CatalogResult<usize> {
        let t = self.lock()?;
        Ok(t.images.values().filter(|i| i.identity_id == id).count())
    }

    fn list_ids(&self) -> CatalogResult<Vec<i64>> {
        Ok(self.lock()?.identities.keys().copied().collect())
    }

    fn reset_schema(&self) -> CatalogResult<()> {
        *self.lock()? = Tables::default();
        Ok(())
    }
}

impl BlobStore for MemoryCatalog {
    fn put_image(&self, image: NewImage) -> CatalogResult<i64> {
        let mut t = self.lock()?;
        let image_id = match image.image_id {
            Some(id) if t.images.contains_key(&id) => {
                return Err(CatalogError::ImageExists(id));
            }
            Some(id) => id,
            None => {
                let mut id = t.next_image_id.max(1);
                while t.images.contains_key(&id) {
                    id += 1;
                }
                id
            }
        };
        t.next_image_id = t.next_image_id.max(image_id + 1);
        t.images.insert(
            image_id,
            FaceImage {
                image_id,
                identity_id: image.identity_id,
                bytes: image.bytes,
                created_at: Utc::now(),
            },
        );
        Ok(image_id)
    }

    fn get_image(&self, image_id: i64) -> CatalogResult<Option<FaceImage>> {
        Ok(self.lock()?.images.get(&image_id).cloned())
    }

    fn delete_image(&self, image_id: i64) -> CatalogResult<bool> {
        Ok(self.lock()?.images.remove(&image_id).is_some())
    }

    fn delete_images_of(&self, identity_id: i64) -> CatalogResult<usize> {
        let mut t = self.lock()?;
        let before = t.images.len();
        t.images.retain(|_, img| img.identity_id != identity_id);
        Ok(before - t.images.len())
    }

    fn clear(&self) -> CatalogResult<()> {
        let mut t = self.lock()?;
        t.images.clear();
        t.next_image_id = 0;
        Ok(())
    }
}
