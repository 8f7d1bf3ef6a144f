//! Redb-backed persistent identity and image store.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CatalogError, CatalogResult};
use crate::store::{BlobStore, IdentityStore};
use crate::types::{FaceImage, Identity, IdentityUpdate, NewImage};

const IDENTITIES: TableDefinition<i64, &[u8]> = TableDefinition::new("identities");
const FACES: TableDefinition<i64, &[u8]> = TableDefinition::new("faces");
const COUNTERS: TableDefinition<&str, i64> = TableDefinition::new("counters");

const NEXT_IMAGE_ID: &str = "next_image_id";

fn storage<E: std::fmt::Display>(e: E) -> CatalogError {
    CatalogError::Storage(e.to_string())
}

fn encode<T: Serialize>(v: &T) -> CatalogResult<Vec<u8>> {
    rmp_serde::to_vec_named(v).map_err(|e| CatalogError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(b: &[u8]) -> CatalogResult<T> {
    rmp_serde::from_slice(b).map_err(|e| CatalogError::Serialization(e.to_string()))
}

/// A persistent catalog backed by redb, implementing both [`IdentityStore`]
/// and [`BlobStore`].
///
/// Identities and face rows live in separate tables of one database file.
/// Image ids are allocated from a monotonic counter and never reused, even
/// after the row is deleted.
pub struct RedbCatalog {
    db: Database,
}

impl RedbCatalog {
    /// Open or create a catalog at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> CatalogResult<Self> {
        let db = Database::create(path).map_err(storage)?;
        let catalog = Self { db };
        catalog.write(|tx| create_tables(tx))?;
        Ok(catalog)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let tx = self.db.begin_write().map_err(storage)?;
        let out = f(&tx)?;
        tx.commit().map_err(storage)?;
        Ok(out)
    }

    fn scan_faces(&self) -> CatalogResult<Vec<FaceImage>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(FACES).map_err(storage)?;
        let mut out = Vec::new();
        for item in table.iter().map_err(storage)? {
            let (_, value) = item.map_err(storage)?;
            out.push(decode::<FaceImage>(value.value())?);
        }
        Ok(out)
    }
}

fn create_tables(tx: &WriteTransaction) -> CatalogResult<()> {
    tx.open_table(IDENTITIES).map_err(storage)?;
    tx.open_table(FACES).map_err(storage)?;
    tx.open_table(COUNTERS).map_err(storage)?;
    Ok(())
}

impl IdentityStore for RedbCatalog {
    fn get(&self, id: i64) -> CatalogResult<Option<Identity>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(IDENTITIES).map_err(storage)?;
        match table.get(id).map_err(storage)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn create(&self, identity: &Identity) -> CatalogResult<()> {
        let bytes = encode(identity)?;
        self.write(|tx| {
            let mut table = tx.open_table(IDENTITIES).map_err(storage)?;
            if table.get(identity.id).map_err(storage)?.is_some() {
                return Err(CatalogError::IdentityExists(identity.id));
            }
            table.insert(identity.id, bytes.as_slice()).map_err(storage)?;
            Ok(())
        })
    }

    fn update(&self, id: i64, update: IdentityUpdate) -> CatalogResult<Identity> {
        self.write(|tx| {
            let mut table = tx.open_table(IDENTITIES).map_err(storage)?;
            let mut identity: Identity = match table.get(id).map_err(storage)? {
                Some(value) => decode(value.value())?,
                None => return Err(CatalogError::IdentityNotFound(id)),
            };
            update.apply(&mut identity);
            let bytes = encode(&identity)?;
            table.insert(id, bytes.as_slice()).map_err(storage)?;
            Ok(identity)
        })
    }

    fn delete(&self, id: i64) -> CatalogResult<bool> {
        self.write(|tx| {
            let mut table = tx.open_table(IDENTITIES).map_err(storage)?;
            let removed = table.remove(id).map_err(storage)?.is_some();
            Ok(removed)
        })
    }

    fn count_embeddings(&self, id: i64) -> CatalogResult<usize> {
        Ok(self
            .scan_faces()?
            .iter()
            .filter(|f| f.identity_id == id)
            .count())
    }

    fn list_ids(&self) -> CatalogResult<Vec<i64>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(IDENTITIES).map_err(storage)?;
        let mut ids = Vec::new();
        for item in table.iter().map_err(storage)? {
            let (key, _) = item.map_err(storage)?;
            ids.push(key.value());
        }
        Ok(ids)
    }

    fn reset_schema(&self) -> CatalogResult<()> {
        self.write(|tx| {
            tx.delete_table(IDENTITIES).map_err(storage)?;
            tx.delete_table(FACES).map_err(storage)?;
            tx.delete_table(COUNTERS).map_err(storage)?;
            create_tables(tx)
        })
    }
}

impl BlobStore for RedbCatalog {
    fn put_image(&self, image: NewImage) -> CatalogResult<i64> {
        self.write(|tx| {
            let mut counters = tx.open_table(COUNTERS).map_err(storage)?;
            let mut faces = tx.open_table(FACES).map_err(storage)?;

            let next = counters
                .get(NEXT_IMAGE_ID)
                .map_err(storage)?
                .map(|v| v.value())
                .unwrap_or(1);

            let image_id = match image.image_id {
                Some(id) => {
                    if faces.get(id).map_err(storage)?.is_some() {
                        return Err(CatalogError::ImageExists(id));
                    }
                    id
                }
                None => {
                    let mut id = next.max(1);
                    while faces.get(id).map_err(storage)?.is_some() {
                        id += 1;
                    }
                    id
                }
            };

            let row = FaceImage {
                image_id,
                identity_id: image.identity_id,
                bytes: image.bytes,
                created_at: Utc::now(),
            };
            let bytes = encode(&row)?;
            faces.insert(image_id, bytes.as_slice()).map_err(storage)?;
            counters
                .insert(NEXT_IMAGE_ID, next.max(image_id + 1))
                .map_err(storage)?;
            Ok(image_id)
        })
    }

    fn get_image(&self, image_id: i64) -> CatalogResult<Option<FaceImage>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(FACES).map_err(storage)?;
        match table.get(image_id).map_err(storage)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn delete_image(&self, image_id: i64) -> CatalogResult<bool> {
        self.write(|tx| {
            let mut table = tx.open_table(FACES).map_err(storage)?;
            let removed = table.remove(image_id).map_err(storage)?.is_some();
            Ok(removed)
        })
    }

    fn delete_images_of(&self, identity_id: i64) -> CatalogResult<usize> {
        let doomed: Vec<i64> = self
            .scan_faces()?
            .into_iter()
            .filter(|f| f.identity_id == identity_id)
            .map(|f| f.image_id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        self.write(|tx| {
            let mut table = tx.open_table(FACES).map_err(storage)?;
            let mut removed = 0;
            for id in &doomed {
                if table.remove(*id).map_err(storage)?.is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    fn clear(&self) -> CatalogResult<()> {
        self.write(|tx| {
            tx.delete_table(FACES).map_err(storage)?;
            tx.open_table(FACES).map_err(storage)?;
            Ok(())
        })
    }
}
