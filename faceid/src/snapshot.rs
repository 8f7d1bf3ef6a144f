//! Durable snapshots of the embedding store.
//!
//! A snapshot is two files: the flat index blob (see
//! `facematch_vecstore::save_flat`) and a MessagePack metadata blob holding
//! the parallel arrays. Both are written through a temporary sibling file
//! and renamed into place.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use facematch_vecstore::{load_flat, save_flat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::FaceIdError;
use crate::store::EmbeddingStore;

#[derive(Serialize)]
struct MetaBlobRef<'a> {
    image_ids: &'a [i64],
    paths: &'a [Option<String>],
    identity_ids: &'a [i64],
    vectors: &'a [Vec<f32>],
}

#[derive(Deserialize)]
struct MetaBlob {
    image_ids: Vec<i64>,
    paths: Vec<Option<String>>,
    identity_ids: Vec<i64>,
    #[serde(default)]
    vectors: Option<Vec<Vec<f32>>>,
}

/// What [`Snapshotter::load`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Neither artifact changed since the last load or save.
    Unchanged,
    /// Neither artifact exists. The store was emptied.
    Missing,
    /// The store was replaced from disk. `reconstructed` is set when the
    /// vector cache was rebuilt from the index blob.
    Reloaded { count: usize, reconstructed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamps {
    index: SystemTime,
    meta: SystemTime,
}

/// Reads and writes the snapshot artifacts and tracks their modification
/// times so unchanged files are not re-read.
#[derive(Debug)]
pub struct Snapshotter {
    index_path: PathBuf,
    meta_path: PathBuf,
    last: Option<Stamps>,
}

impl Snapshotter {
    pub fn new(index_path: impl Into<PathBuf>, meta_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            meta_path: meta_path.into(),
            last: None,
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    /// Write both artifacts and remember their new modification times.
    pub fn save(&mut self, store: &EmbeddingStore) -> Result<(), FaceIdError> {
        let (image_ids, paths, identity_ids, vectors) = store.columns();
        let meta = rmp_serde::to_vec_named(&MetaBlobRef {
            image_ids,
            paths,
            identity_ids,
            vectors,
        })
        .map_err(|e| FaceIdError::Persistence(format!("encode metadata: {e}")))?;

        let mut index = Vec::new();
        save_flat(store.index(), &mut index)?;

        write_atomic(&self.index_path, &index)?;
        write_atomic(&self.meta_path, &meta)?;

        self.last = Some(self.stamps()?);
        debug!(
            count = store.len(),
            index = %self.index_path.display(),
            "faceid: snapshot saved"
        );
        Ok(())
    }

    /// Replace the store from disk unless the artifacts are unchanged.
    ///
    /// On any error the store is left as it was.
    pub fn load(&mut self, store: &mut EmbeddingStore) -> Result<LoadOutcome, FaceIdError> {
        let index_exists = self.index_path.exists();
        let meta_exists = self.meta_path.exists();
        match (index_exists, meta_exists) {
            (false, false) => {
                store.reset();
                self.last = None;
                info!("faceid: no snapshot found, starting empty");
                return Ok(LoadOutcome::Missing);
            }
            (true, false) | (false, true) => {
                let missing = if index_exists {
                    &self.meta_path
                } else {
                    &self.index_path
                };
                return Err(FaceIdError::Persistence(format!(
                    "snapshot incomplete: {} is missing",
                    missing.display()
                )));
            }
            (true, true) => {}
        }

        let stamps = self.stamps()?;
        if self.last == Some(stamps) {
            return Ok(LoadOutcome::Unchanged);
        }

        let index = load_flat(&mut File::open(&self.index_path)?)?;
        if index.dim() != store.dim() {
            return Err(FaceIdError::Persistence(format!(
                "snapshot dimension {} does not match configured {}",
                index.dim(),
                store.dim()
            )));
        }

        let bytes = fs::read(&self.meta_path)?;
        let meta: MetaBlob = rmp_serde::from_slice(&bytes)
            .map_err(|e| FaceIdError::Persistence(format!("decode metadata: {e}")))?;

        let n = index.len();
        if meta.image_ids.len() != n || meta.paths.len() != n || meta.identity_ids.len() != n {
            return Err(FaceIdError::Persistence(format!(
                "invalid snapshot: index holds {n} vectors but metadata has {} image ids, {} paths, {} identity ids",
                meta.image_ids.len(),
                meta.paths.len(),
                meta.identity_ids.len()
            )));
        }

        let dim = index.dim();
        let (vectors, reconstructed) = match meta.vectors {
            Some(v) if v.len() == n && v.iter().all(|x| x.len() == dim) => (v, false),
            _ => {
                warn!(count = n, "faceid: vector cache missing or stale, reconstructing from index");
                (index.reconstruct_all(), true)
            }
        };

        store.install(index, meta.image_ids, meta.paths, meta.identity_ids, vectors);
        self.last = Some(stamps);
        info!(count = n, reconstructed, "faceid: snapshot loaded");
        Ok(LoadOutcome::Reloaded {
            count: n,
            reconstructed,
        })
    }

    /// Delete both artifacts. Missing files are fine.
    pub fn wipe(&mut self) -> Result<(), FaceIdError> {
        for path in [&self.index_path, &self.meta_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.last = None;
        Ok(())
    }

    fn stamps(&self) -> Result<Stamps, FaceIdError> {
        Ok(Stamps {
            index: fs::metadata(&self.index_path)?.modified()?,
            meta: fs::metadata(&self.meta_path)?.modified()?,
        })
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), FaceIdError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut f = File::create(&tmp)?;
    f.write_all(data)?;
    f.sync_all()?;
    drop(f);
    fs::rename(&tmp, path)?;
    Ok(())
}
