//! Face identity matching over precomputed embeddings.
//!
//! [`FaceIndex`] answers "who is this face?" against an exact cosine
//! similarity index and enrolls unseen faces, keeping three stores in step:
//! its own embedding index (snapshotted to disk), an [`IdentityStore`] of
//! person records and a [`BlobStore`] of face images.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use facematch_catalog::MemoryCatalog;
//! use facematch_faceid::{Config, EnrollHints, FaceIndex, MatchPath};
//!
//! let catalog = Arc::new(MemoryCatalog::new());
//! let index = FaceIndex::open(Config::in_dir("data"), catalog.clone(), catalog)?;
//!
//! let embedding = vec![0.1f32; 512];
//! let resolution = index.resolve(&embedding, EnrollHints::default(), MatchPath::Primary)?;
//! println!("identity {}", resolution.identity_id());
//! # Ok::<(), facematch_faceid::FaceIdError>(())
//! ```
//!
//! # Consistency
//!
//! Enrollment writes the identity, then the image, then the index. If the
//! index step fails the image is deleted again; a newly created identity is
//! left behind and removed later by a cascade or by
//! [`FaceIndex::reconcile`]. Deletes remove from the index first, so the
//! index decides which faces exist.
//!
//! Deletes and edits rebuild the flat index from the remaining vectors,
//! which is O(n·d).
//!
//! [`IdentityStore`]: facematch_catalog::IdentityStore
//! [`BlobStore`]: facematch_catalog::BlobStore

mod config;
mod coordinator;
mod error;
mod faceid;
mod guard;
mod idgen;
mod resolver;
mod saga;
mod snapshot;
mod store;
mod timing;
mod types;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use error::{FaceIdError, Missing};
pub use faceid::FaceIndex;
pub use guard::Guard;
pub use idgen::{IdSource, RandomIds, generate_identity_id};
pub use saga::Saga;
pub use snapshot::{LoadOutcome, Snapshotter};
pub use store::EmbeddingStore;
pub use timing::{OperationStats, Timings};
pub use types::{
    Added, Edited, EditedField, EmbeddingInfo, EnrollHints, FacesRemoved, IndexStats, ListQuery,
    Match, MatchPath, Page, Peek, Resolution, SortBy,
};
