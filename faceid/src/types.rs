use facematch_catalog::{Identity, Profile};
use serde::{Deserialize, Serialize};

/// Which similarity cutoff a resolution uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPath {
    /// Face lookup (check-in, query). Uses `Config::match_threshold`.
    #[default]
    Primary,
    /// Bulk ingestion of new photos. Uses `Config::ingest_threshold`.
    Ingest,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub image_id: i64,
    pub identity_id: i64,

    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,

    pub path: Option<String>,
}

/// Optional inputs for enrollment. Every field may be left empty: ids are
/// then generated and the identity gets a placeholder name.
#[derive(Debug, Clone, Default)]
pub struct EnrollHints {
    /// Enroll under this identity instead of generating one.
    pub identity_id: Option<i64>,

    /// Use this image id instead of letting the image store assign one.
    pub image_id: Option<i64>,

    pub path: Option<String>,

    /// Raw image bytes kept by the image store and used as avatar.
    pub image: Vec<u8>,

    /// Fields for a newly created identity.
    pub profile: Profile,
}

/// Result of a successful enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Added {
    pub image_id: i64,
    pub identity_id: i64,

    /// Whether a new identity row was created.
    pub created_identity: bool,
}

/// Outcome of a find-or-enroll resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    /// An existing embedding scored above the threshold.
    Matched {
        matched: Match,
        /// `None` when the identity store has no row or could not be read.
        identity: Option<Identity>,
    },
    /// No match; the embedding was enrolled.
    Enrolled(Added),
}

impl Resolution {
    pub fn identity_id(&self) -> i64 {
        match self {
            Self::Matched { matched, .. } => matched.identity_id,
            Self::Enrolled(added) => added.identity_id,
        }
    }

    pub fn is_enrolled(&self) -> bool {
        matches!(self, Self::Enrolled(_))
    }
}

/// A field changed by an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditedField {
    Embedding,
    Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edited {
    pub image_id: i64,
    pub updated_fields: Vec<EditedField>,
}

/// Result of removing every face of an identity while keeping the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacesRemoved {
    pub identity_id: i64,
    pub embeddings_removed: usize,
    pub images_removed: usize,
}

/// Metadata of one stored embedding. Vectors are never exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingInfo {
    pub image_id: i64,
    pub identity_id: i64,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    ImageIdAsc,
    ImageIdDesc,
    IdentityIdAsc,
    IdentityIdDesc,
    PathAsc,
    PathDesc,
}

/// A paginated listing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// Only list embeddings of this identity.
    pub identity_id: Option<i64>,

    /// 1-based page number. Clamped into range.
    pub page: usize,

    pub page_size: usize,

    pub sort: SortBy,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            identity_id: None,
            page: 1,
            page_size: 15,
            sort: SortBy::ImageIdAsc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: usize,
    pub total_pages: usize,
    pub page: usize,
    pub page_size: usize,
    pub results: Vec<T>,
}

/// The first and last records of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peek {
    pub first: Vec<EmbeddingInfo>,
    pub last: Vec<EmbeddingInfo>,
    pub total: usize,
}

/// Integrity diagnostics of the embedding store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub num_vectors: usize,
    pub num_image_ids: usize,
    pub num_paths: usize,
    pub num_identity_ids: usize,
    pub num_embeddings: usize,

    pub unique_image_ids: usize,
    pub unique_paths: usize,
    pub unique_identity_ids: usize,
    pub duplicate_image_ids: usize,

    /// Vectors containing at least one NaN component.
    pub nan_vectors: usize,
    /// Vectors whose norm is not within 1e-3 of 1.
    pub non_unit_vectors: usize,
    pub min_value: Option<f32>,
    pub max_value: Option<f32>,

    /// All parallel sequences have the same length as the index.
    pub consistent: bool,
}
