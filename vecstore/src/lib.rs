//! Exact inner-product similarity index over dense float32 vectors.
//!
//! [`FlatIndex`] stores vectors contiguously and answers queries by brute
//! force, which makes results exact and deterministic. It has no native
//! remove: callers rebuild it from the surviving vectors. [`flat_io`]
//! persists it in a compact little-endian binary format.

pub mod cosine;
pub mod error;
pub mod flat;
pub mod flat_io;

pub use cosine::{inner_product, l2_norm, normalized};
pub use error::VecError;
pub use flat::{FlatIndex, Hit};
pub use flat_io::{load as load_flat, save as save_flat};
