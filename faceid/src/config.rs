use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::MatchPath;

pub const DEFAULT_DIM: usize = 512;
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.42;
pub const DEFAULT_INGEST_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IDENTITY_ID_MIN: i64 = 100_000;
pub const DEFAULT_IDENTITY_ID_MAX: i64 = 999_999;
pub const DEFAULT_MAX_ID_ATTEMPTS: usize = 1000;

/// Controls the face index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding dimension. Default: 512.
    pub dim: usize,

    /// Where the flat index blob is written.
    pub index_path: PathBuf,

    /// Where the metadata arrays blob is written.
    pub meta_path: PathBuf,

    /// Cosine similarity a match must exceed on the primary matching path.
    /// Default: 0.42.
    pub match_threshold: f32,

    /// Cosine similarity a match must exceed on the ingestion path.
    /// Default: 0.5.
    pub ingest_threshold: f32,

    /// Inclusive range sampled for generated identity ids.
    /// Default: 100000..=999999.
    pub identity_id_min: i64,
    pub identity_id_max: i64,

    /// Samples drawn before identity generation gives up. Default: 1000.
    pub max_id_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            index_path: PathBuf::from("index/faces.flat"),
            meta_path: PathBuf::from("index/faces_meta.msgpack"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            ingest_threshold: DEFAULT_INGEST_THRESHOLD,
            identity_id_min: DEFAULT_IDENTITY_ID_MIN,
            identity_id_max: DEFAULT_IDENTITY_ID_MAX,
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
        }
    }
}

impl Config {
    /// Config with default values, storing artifacts under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            index_path: dir.join("faces.flat"),
            meta_path: dir.join("faces_meta.msgpack"),
            ..Self::default()
        }
    }

    /// Replace zero or empty fields with their defaults. Thresholds are kept
    /// as given: 0.0 is a valid cutoff. Omitted thresholds get their defaults
    /// at deserialization.
    pub fn with_defaults(mut self) -> Self {
        let d = Self::default();
        if self.dim == 0 {
            self.dim = d.dim;
        }
        if self.index_path.as_os_str().is_empty() {
            self.index_path = d.index_path;
        }
        if self.meta_path.as_os_str().is_empty() {
            self.meta_path = d.meta_path;
        }
        if self.identity_id_max <= self.identity_id_min {
            self.identity_id_min = d.identity_id_min;
            self.identity_id_max = d.identity_id_max;
        }
        if self.max_id_attempts == 0 {
            self.max_id_attempts = d.max_id_attempts;
        }
        self
    }

    /// Similarity cutoff for the given matching path.
    pub fn threshold(&self, path: MatchPath) -> f32 {
        match path {
            MatchPath::Primary => self.match_threshold,
            MatchPath::Ingest => self.ingest_threshold,
        }
    }
}
