use thiserror::Error;

/// Errors returned by identity and image stores.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog: identity {0} not found")]
    IdentityNotFound(i64),

    #[error("catalog: image {0} not found")]
    ImageNotFound(i64),

    #[error("catalog: identity {0} already exists")]
    IdentityExists(i64),

    #[error("catalog: image {0} already exists")]
    ImageExists(i64),

    #[error("catalog: storage error: {0}")]
    Storage(String),

    #[error("catalog: serialization error: {0}")]
    Serialization(String),

    #[error("catalog: unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    /// Returns true when the error reports a missing row rather than a
    /// failed store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::IdentityNotFound(_) | Self::ImageNotFound(_))
    }
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
