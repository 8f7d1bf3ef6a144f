use std::fmt;

use crate::error::CatalogResult;
use crate::types::{FaceImage, Identity, IdentityUpdate, NewImage};

/// Person records keyed by identity id.
pub trait IdentityStore: Send + Sync {
    /// Get an identity. `Ok(None)` when absent.
    fn get(&self, id: i64) -> CatalogResult<Option<Identity>>;

    /// Insert a new identity. Fails with `IdentityExists` on a duplicate id.
    fn create(&self, identity: &Identity) -> CatalogResult<()>;

    /// Apply a partial update. Fails with `IdentityNotFound` when absent.
    fn update(&self, id: i64, update: IdentityUpdate) -> CatalogResult<Identity>;

    /// Delete an identity. Returns whether a row was removed.
    fn delete(&self, id: i64) -> CatalogResult<bool>;

    /// Number of face images recorded for an identity.
    fn count_embeddings(&self, id: i64) -> CatalogResult<usize>;

    /// All identity ids, ascending.
    fn list_ids(&self) -> CatalogResult<Vec<i64>>;

    /// Drop and recreate the schema, leaving the store empty.
    fn reset_schema(&self) -> CatalogResult<()>;
}

/// Raw face images keyed by image id.
pub trait BlobStore: Send + Sync {
    /// Store an image and return its id. Fails with `ImageExists` when the
    /// requested id is taken.
    fn put_image(&self, image: NewImage) -> CatalogResult<i64>;

    /// Get an image. `Ok(None)` when absent.
    fn get_image(&self, image_id: i64) -> CatalogResult<Option<FaceImage>>;

    /// Delete an image. Returns whether a row was removed.
    fn delete_image(&self, image_id: i64) -> CatalogResult<bool>;

    /// Delete every image of an identity. Returns the number removed.
    fn delete_images_of(&self, identity_id: i64) -> CatalogResult<usize>;

    /// Remove every image.
    fn clear(&self) -> CatalogResult<()>;
}

impl fmt::Debug for dyn IdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityStore {{ ... }}")
    }
}

impl fmt::Debug for dyn BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobStore {{ ... }}")
    }
}
