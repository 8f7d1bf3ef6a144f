//! Identity and face-image stores.
//!
//! The face index treats these as external collaborators: an
//! [`IdentityStore`] holding person records keyed by identity id, and a
//! [`BlobStore`] holding raw face images keyed by image id. Both are
//! synchronous, `Send + Sync` traits so one instance can be shared by every
//! request thread.
//!
//! Two implementations are provided. [`MemoryCatalog`] keeps everything in
//! process memory and is meant for tests and embedding. [`RedbCatalog`]
//! persists to a redb database file.

pub mod error;
pub mod memory;
pub mod redb;
pub mod store;
pub mod types;

pub use error::{CatalogError, CatalogResult};
pub use memory::MemoryCatalog;
pub use crate::redb::RedbCatalog;
pub use store::{BlobStore, IdentityStore};
pub use types::{FaceImage, Identity, IdentityUpdate, NewImage, Profile};
