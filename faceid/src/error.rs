use std::fmt;

use facematch_catalog::CatalogError;
use facematch_vecstore::VecError;
use thiserror::Error;

/// The kind of record a [`FaceIdError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Image(i64),
    Identity(i64),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(id) => write!(f, "image {id}"),
            Self::Identity(id) => write!(f, "identity {id}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FaceIdError {
    #[error("faceid: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("faceid: vector has zero norm")]
    ZeroNormVector,

    #[error(
        "faceid: batch length mismatch: {vectors} vectors, {image_ids} image ids, {paths} paths, {identity_ids} identity ids"
    )]
    BatchLengthMismatch {
        vectors: usize,
        image_ids: usize,
        paths: usize,
        identity_ids: usize,
    },

    #[error("faceid: image id {0} already exists")]
    DuplicateImageId(i64),

    #[error("faceid: {0} not found")]
    NotFound(Missing),

    #[error("faceid: no free identity id after {attempts} attempts")]
    IdentifierExhausted { attempts: usize },

    #[error("faceid: persistence: {0}")]
    Persistence(String),

    #[error("faceid: collaborator: {0}")]
    Collaborator(#[from] CatalogError),
}

impl FaceIdError {
    /// The request referred to a record that does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Collaborator(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// The request itself was malformed; retrying it cannot succeed.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. }
                | Self::ZeroNormVector
                | Self::BatchLengthMismatch { .. }
                | Self::DuplicateImageId(_)
        )
    }

    /// A store failed; the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Persistence(_) | Self::IdentifierExhausted { .. } => true,
            Self::Collaborator(e) => !e.is_not_found(),
            _ => false,
        }
    }
}

impl From<VecError> for FaceIdError {
    fn from(e: VecError) -> Self {
        match e {
            VecError::DimensionMismatch { got, want } => Self::DimensionMismatch { got, want },
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl From<std::io::Error> for FaceIdError {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
