use std::path::Path;
use std::sync::Arc;
use std::thread;

use facematch_catalog::{
    BlobStore, CatalogError, CatalogResult, FaceImage, Identity, IdentityStore, IdentityUpdate,
    MemoryCatalog, NewImage, Profile,
};
use parking_lot::Mutex;
use tempfile::tempdir;

use crate::*;

const DIM: usize = 8;

fn config(dir: &Path) -> Config {
    Config {
        dim: DIM,
        ..Config::in_dir(dir)
    }
}

fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

/// A unit vector with cosine `c` to `axis(0)`.
fn at_cosine(c: f32) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[0] = c;
    v[1] = (1.0 - c * c).sqrt();
    v
}

fn hints_for(identity_id: i64) -> EnrollHints {
    EnrollHints {
        identity_id: Some(identity_id),
        image: vec![0xff, 0xd8, 0xff],
        ..Default::default()
    }
}

/// Hands out 100001, 100002, ...
struct Counter(i64);

impl IdSource for Counter {
    fn sample(&mut self, _min: i64, _max: i64) -> i64 {
        self.0 += 1;
        self.0
    }
}

/// A memory catalog that records deletes and can be told to misbehave.
#[derive(Default)]
struct Recorder {
    inner: MemoryCatalog,
    calls: Mutex<Vec<String>>,
    forced_image_id: Mutex<Option<i64>>,
    fail_get: Mutex<bool>,
    fail_delete: Mutex<bool>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl IdentityStore for Recorder {
    fn get(&self, id: i64) -> CatalogResult<Option<Identity>> {
        if *self.fail_get.lock() {
            return Err(CatalogError::Unavailable("identity store down".into()));
        }
        self.inner.get(id)
    }

    fn create(&self, identity: &Identity) -> CatalogResult<()> {
        self.log(format!("identity.create({})", identity.id));
        self.inner.create(identity)
    }

    fn update(&self, id: i64, update: IdentityUpdate) -> CatalogResult<Identity> {
        self.inner.update(id, update)
    }

    fn delete(&self, id: i64) -> CatalogResult<bool> {
        self.log(format!("identity.delete({id})"));
        if *self.fail_delete.lock() {
            return Err(CatalogError::Unavailable("identity store down".into()));
        }
        self.inner.delete(id)
    }

    fn count_embeddings(&self, id: i64) -> CatalogResult<usize> {
        self.inner.count_embeddings(id)
    }

    fn list_ids(&self) -> CatalogResult<Vec<i64>> {
        self.inner.list_ids()
    }

    fn reset_schema(&self) -> CatalogResult<()> {
        self.inner.reset_schema()
    }
}

impl BlobStore for Recorder {
    fn put_image(&self, image: NewImage) -> CatalogResult<i64> {
        if let Some(id) = *self.forced_image_id.lock() {
            self.log(format!("blob.put({id})"));
            return Ok(id);
        }
        let id = self.inner.put_image(image)?;
        self.log(format!("blob.put({id})"));
        Ok(id)
    }

    fn get_image(&self, image_id: i64) -> CatalogResult<Option<FaceImage>> {
        self.inner.get_image(image_id)
    }

    fn delete_image(&self, image_id: i64) -> CatalogResult<bool> {
        self.log(format!("blob.delete({image_id})"));
        self.inner.delete_image(image_id)
    }

    fn delete_images_of(&self, identity_id: i64) -> CatalogResult<usize> {
        self.inner.delete_images_of(identity_id)
    }

    fn clear(&self) -> CatalogResult<()> {
        self.inner.clear()
    }
}

fn open_recorded(dir: &Path) -> (FaceIndex, Arc<Recorder>) {
    let rec = Arc::new(Recorder::default());
    let index = FaceIndex::with_id_source(
        config(dir),
        rec.clone(),
        rec.clone(),
        Box::new(Counter(100_000)),
    )
    .unwrap();
    (index, rec)
}

fn open_memory(dir: &Path) -> (FaceIndex, MemoryCatalog) {
    let cat = MemoryCatalog::new();
    let index = FaceIndex::with_id_source(
        config(dir),
        Arc::new(cat.clone()),
        Arc::new(cat.clone()),
        Box::new(Counter(100_000)),
    )
    .unwrap();
    (index, cat)
}

#[test]
fn delete_identity_removes_all_its_embeddings() {
    let dir = tempdir().unwrap();
    let (index, cat) = open_memory(dir.path());
    index.add(&axis(0), hints_for(1)).unwrap();
    index.add(&axis(1), hints_for(1)).unwrap();
    index.add(&axis(2), hints_for(2)).unwrap();

    assert!(index.delete_identity(1).unwrap());

    assert_eq!(index.len(), 1);
    let stats = index.stats();
    assert!(stats.consistent);
    assert_eq!(stats.unique_identity_ids, 1);
    assert!(index.image_ids_for_identity(1).is_empty());
    assert!(cat.get(1).unwrap().is_none());
    assert!(cat.get(2).unwrap().is_some());
    assert_eq!(cat.count_embeddings(1).unwrap(), 0);
    let hits = index.query(&axis(0), 3).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits.iter().all(|m| m.identity_id != 1));

    let err = index.delete_identity(1).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn self_match_scores_one() {
    let dir = tempdir().unwrap();
    let (index, _) = open_memory(dir.path());
    let v = vec![0.3, -1.2, 0.5, 2.0, 0.0, 0.1, -0.7, 0.9];
    let added = index.add(&v, EnrollHints::default()).unwrap();

    let m = index.query(&v, 1).unwrap();
    assert_eq!(m.len(), 1);
    assert_eq!(m[0].image_id, added.image_id);
    assert_eq!(m[0].identity_id, added.identity_id);
    assert!((m[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn deleting_last_image_cascades_to_identity() {
    let dir = tempdir().unwrap();
    let (index, rec) = open_recorded(dir.path());
    let a = index.add(&axis(0), hints_for(5)).unwrap();
    let b = index.add(&axis(1), hints_for(5)).unwrap();
    assert!(a.created_identity);
    assert!(!b.created_identity);

    index.delete_image(a.image_id).unwrap();
    assert!(!rec.calls().contains(&"identity.delete(5)".to_string()));

    index.delete_image(b.image_id).unwrap();
    assert!(rec.calls().contains(&"identity.delete(5)".to_string()));
    assert!(rec.inner.get(5).unwrap().is_none());
    assert!(index.is_empty());
}

#[test]
fn invalid_vectors_change_nothing() {
    let dir = tempdir().unwrap();
    let (index, rec) = open_recorded(dir.path());
    index.add(&axis(0), hints_for(1)).unwrap();
    let before = rec.calls();

    let err = index.add(&[1.0, 2.0, 3.0], hints_for(2)).unwrap_err();
    assert!(matches!(err, FaceIdError::DimensionMismatch { got: 3, want: DIM }));
    assert!(err.is_invalid_input());

    let err = index.add(&[0.0; DIM], hints_for(2)).unwrap_err();
    assert!(matches!(err, FaceIdError::ZeroNormVector));

    let stats = index.stats();
    assert_eq!(stats.num_vectors, 1);
    assert!(stats.consistent);
    assert_eq!(rec.calls(), before);
}

#[test]
fn index_failure_after_blob_write_is_compensated() {
    let dir = tempdir().unwrap();
    let (index, rec) = open_recorded(dir.path());
    let first = index.add(&axis(0), hints_for(1)).unwrap();

    *rec.forced_image_id.lock() = Some(first.image_id);
    let err = index.add(&axis(1), EnrollHints::default()).unwrap_err();
    assert!(matches!(err, FaceIdError::DuplicateImageId(id) if id == first.image_id));

    let deletes: Vec<String> = rec
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("blob.delete"))
        .collect();
    assert_eq!(deletes, vec![format!("blob.delete({})", first.image_id)]);
    assert_eq!(index.len(), 1);

    // The identity created before the failure is left for reconcile.
    *rec.forced_image_id.lock() = None;
    assert!(rec.inner.get(100_001).unwrap().is_some());
    assert_eq!(index.reconcile().unwrap(), vec![100_001]);
    assert!(rec.inner.get(100_001).unwrap().is_none());
    assert!(rec.inner.get(1).unwrap().is_some());
}

#[test]
fn blob_failure_aborts_enrollment() {
    struct NoBlobs;

    impl BlobStore for NoBlobs {
        fn put_image(&self, _image: NewImage) -> CatalogResult<i64> {
            Err(CatalogError::Unavailable("timeout".into()))
        }
        fn get_image(&self, _image_id: i64) -> CatalogResult<Option<FaceImage>> {
            Ok(None)
        }
        fn delete_image(&self, _image_id: i64) -> CatalogResult<bool> {
            Ok(false)
        }
        fn delete_images_of(&self, _identity_id: i64) -> CatalogResult<usize> {
            Ok(0)
        }
        fn clear(&self) -> CatalogResult<()> {
            Ok(())
        }
    }

    let dir = tempdir().unwrap();
    let identities = Arc::new(MemoryCatalog::new());
    let index = FaceIndex::open(config(dir.path()), identities, Arc::new(NoBlobs)).unwrap();

    let err = index.add(&axis(0), hints_for(3)).unwrap_err();
    assert!(err.is_transient());
    assert!(index.is_empty());
}

#[test]
fn concurrent_resolve_enrolls_once() {
    let dir = tempdir().unwrap();
    let cat = MemoryCatalog::new();
    let index = Arc::new(
        FaceIndex::open(
            config(dir.path()),
            Arc::new(cat.clone()),
            Arc::new(cat.clone()),
        )
        .unwrap(),
    );
    let face = vec![0.2, 0.9, -0.4, 0.1, 0.0, 0.3, 0.5, -0.2];

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let index = Arc::clone(&index);
            let face = face.clone();
            thread::spawn(move || {
                index
                    .resolve(&face, EnrollHints::default(), MatchPath::Primary)
                    .unwrap()
            })
        })
        .collect();
    let results: Vec<Resolution> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_enrolled()).count(), 1);
    let id = results[0].identity_id();
    assert!(results.iter().all(|r| r.identity_id() == id));
    assert_eq!(cat.identity_count(), 1);
    assert_eq!(index.len(), 1);
}

#[test]
fn thresholds_depend_on_path() {
    let dir = tempdir().unwrap();
    let (index, cat) = open_memory(dir.path());
    index.add(&axis(0), hints_for(7)).unwrap();
    let probe = at_cosine(0.45);

    match index
        .resolve(&probe, EnrollHints::default(), MatchPath::Primary)
        .unwrap()
    {
        Resolution::Matched { matched, identity } => {
            assert_eq!(matched.identity_id, 7);
            assert!((matched.score - 0.45).abs() < 1e-4);
            assert_eq!(identity.map(|i| i.id), Some(7));
        }
        other => panic!("expected match, got {other:?}"),
    }

    let r = index
        .resolve(&probe, EnrollHints::default(), MatchPath::Ingest)
        .unwrap();
    assert!(r.is_enrolled());
    assert_ne!(r.identity_id(), 7);
    assert_eq!(cat.identity_count(), 2);
}

#[test]
fn match_stands_when_identity_fetch_fails() {
    let dir = tempdir().unwrap();
    let (index, rec) = open_recorded(dir.path());
    index.add(&axis(0), hints_for(9)).unwrap();

    *rec.fail_get.lock() = true;
    match index
        .resolve(&axis(0), EnrollHints::default(), MatchPath::Primary)
        .unwrap()
    {
        Resolution::Matched { matched, identity } => {
            assert_eq!(matched.identity_id, 9);
            assert!(identity.is_none());
        }
        other => panic!("expected match, got {other:?}"),
    }
}

#[test]
fn identifier_exhaustion() {
    struct Always(i64);

    impl IdSource for Always {
        fn sample(&mut self, _min: i64, _max: i64) -> i64 {
            self.0
        }
    }

    let dir = tempdir().unwrap();
    let cat = MemoryCatalog::new();
    let index = FaceIndex::with_id_source(
        Config {
            max_id_attempts: 5,
            ..config(dir.path())
        },
        Arc::new(cat.clone()),
        Arc::new(cat.clone()),
        Box::new(Always(123_456)),
    )
    .unwrap();

    index.add(&axis(0), hints_for(123_456)).unwrap();
    let err = index.add(&axis(1), EnrollHints::default()).unwrap_err();
    assert!(matches!(err, FaceIdError::IdentifierExhausted { attempts: 5 }));
    assert_eq!(index.len(), 1);
}

#[test]
fn new_identity_gets_profile_and_avatar() {
    let dir = tempdir().unwrap();
    let (index, cat) = open_memory(dir.path());
    let added = index
        .add(
            &axis(0),
            EnrollHints {
                image: vec![1, 2, 3],
                path: Some("faces/linh.jpg".into()),
                profile: Profile {
                    full_name: Some("Linh".into()),
                    age: Some(31),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();
    assert!(added.created_identity);
    assert_eq!(added.identity_id, 100_001);

    let identity = cat.get(added.identity_id).unwrap().unwrap();
    assert_eq!(identity.full_name, "Linh");
    assert_eq!(identity.age, Some(31));
    assert_eq!(identity.avatar, Some(vec![1, 2, 3]));
    assert_eq!(
        cat.get_image(added.image_id).unwrap().unwrap().identity_id,
        added.identity_id
    );

    index
        .add_face(added.identity_id, &axis(1), vec![4, 5], None)
        .unwrap();
    let identity = cat.get(added.identity_id).unwrap().unwrap();
    assert_eq!(identity.avatar, Some(vec![4, 5]));
    assert_eq!(index.image_ids_for_identity(added.identity_id).len(), 2);
}

#[test]
fn add_face_requires_existing_identity() {
    let dir = tempdir().unwrap();
    let (index, cat) = open_memory(dir.path());
    let err = index.add_face(42, &axis(0), vec![], None).unwrap_err();
    assert!(matches!(err, FaceIdError::NotFound(Missing::Identity(42))));
    assert!(index.is_empty());
    assert_eq!(cat.identity_count(), 0);
}

#[test]
fn duplicate_image_hint_rejected() {
    let dir = tempdir().unwrap();
    let (index, _) = open_memory(dir.path());
    let first = index.add(&axis(0), hints_for(1)).unwrap();
    let err = index
        .add(
            &axis(1),
            EnrollHints {
                image_id: Some(first.image_id),
                ..hints_for(1)
            },
        )
        .unwrap_err();
    assert!(matches!(err, FaceIdError::DuplicateImageId(_)));
    assert_eq!(index.len(), 1);
}

#[test]
fn delete_unknown_image_is_not_found() {
    let dir = tempdir().unwrap();
    let (index, rec) = open_recorded(dir.path());
    let err = index.delete_image(77).unwrap_err();
    assert!(matches!(err, FaceIdError::NotFound(Missing::Image(77))));
    assert!(rec.calls().is_empty());
}

#[test]
fn delete_identity_without_faces_heals_row() {
    let dir = tempdir().unwrap();
    let (index, cat) = open_memory(dir.path());
    cat.create(&Identity::new(11, Profile::default(), None))
        .unwrap();
    assert!(index.delete_identity(11).unwrap());
    assert!(cat.get(11).unwrap().is_none());
}

#[test]
fn identity_row_delete_failure_is_reported() {
    let dir = tempdir().unwrap();
    let (index, rec) = open_recorded(dir.path());
    rec.inner
        .create(&Identity::new(11, Profile::default(), None))
        .unwrap();
    index.add(&axis(0), hints_for(12)).unwrap();
    *rec.fail_delete.lock() = true;

    let err = index.delete_identity(11).unwrap_err();
    assert!(matches!(
        err,
        FaceIdError::Collaborator(CatalogError::Unavailable(_))
    ));
    assert!(err.is_transient());
    assert!(rec.inner.get(11).unwrap().is_some());

    // The index delete is kept when the row delete fails.
    let err = index.delete_identity(12).unwrap_err();
    assert!(matches!(err, FaceIdError::Collaborator(_)));
    assert!(index.is_empty());
    assert!(rec.inner.get(12).unwrap().is_some());

    *rec.fail_delete.lock() = false;
    assert_eq!(index.reconcile().unwrap(), vec![11, 12]);
}

#[test]
fn remove_faces_keeps_identity() {
    let dir = tempdir().unwrap();
    let (index, cat) = open_memory(dir.path());
    index.add(&axis(0), hints_for(4)).unwrap();
    index.add(&axis(1), hints_for(4)).unwrap();
    index.add(&axis(2), hints_for(8)).unwrap();

    let removed = index.remove_faces(4).unwrap();
    assert_eq!(
        removed,
        FacesRemoved {
            identity_id: 4,
            embeddings_removed: 2,
            images_removed: 2,
        }
    );
    assert!(cat.get(4).unwrap().is_some());
    assert_eq!(index.len(), 1);
    assert!(index.remove_faces(99).unwrap_err().is_not_found());
}

#[test]
fn edit_replaces_vector_and_path() {
    let dir = tempdir().unwrap();
    let (index, _) = open_memory(dir.path());
    let a = index.add(&axis(0), hints_for(1)).unwrap();
    index.add(&axis(1), hints_for(2)).unwrap();

    let edited = index
        .edit(a.image_id, Some(&axis(3)), Some("moved.jpg"))
        .unwrap();
    assert_eq!(
        edited.updated_fields,
        vec![EditedField::Embedding, EditedField::Path]
    );

    let m = index.query(&axis(3), 1).unwrap();
    assert_eq!(m[0].image_id, a.image_id);
    assert_eq!(m[0].path.as_deref(), Some("moved.jpg"));
    assert!(index.stats().consistent);

    assert!(index.edit(999, None, Some("x")).unwrap_err().is_not_found());
}

#[test]
fn reset_is_idempotent() {
    let dir = tempdir().unwrap();
    let (index, cat) = open_memory(dir.path());
    index.add(&axis(0), hints_for(1)).unwrap();
    index.add(&axis(1), hints_for(2)).unwrap();

    assert!(index.reset().unwrap());
    assert!(index.reset().unwrap());

    assert!(index.is_empty());
    assert!(index.stats().consistent);
    assert_eq!(cat.identity_count(), 0);
    assert_eq!(cat.image_count(), 0);
    assert!(dir.path().join("faces.flat").exists());
    assert!(dir.path().join("faces_meta.msgpack").exists());
    assert!(index.query(&axis(0), 5).unwrap().is_empty());
}

#[test]
fn snapshot_survives_restart() {
    let dir = tempdir().unwrap();
    let cat = MemoryCatalog::new();
    let probe = vec![0.5, 0.1, 0.9, -0.3, 0.2, 0.0, 0.4, 0.7];

    let before = {
        let (index, _) = open_memory(dir.path());
        index.add(&axis(0), hints_for(1)).unwrap();
        index.add(&axis(1), hints_for(1)).unwrap();
        index.add(&probe, hints_for(2)).unwrap();
        index.query(&probe, 3).unwrap()
    };

    let index = FaceIndex::open(
        config(dir.path()),
        Arc::new(cat.clone()),
        Arc::new(cat.clone()),
    )
    .unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(index.query(&probe, 3).unwrap(), before);
    assert!(index.stats().consistent);
}

#[test]
fn reload_picks_up_other_writer() {
    let dir = tempdir().unwrap();
    let (writer, _) = open_memory(dir.path());
    writer.add(&axis(0), hints_for(1)).unwrap();

    let (reader, _) = open_memory(dir.path());
    assert_eq!(reader.len(), 1);
    assert_eq!(reader.reload().unwrap(), LoadOutcome::Unchanged);

    writer.add(&axis(1), hints_for(1)).unwrap();
    assert_eq!(
        reader.reload().unwrap(),
        LoadOutcome::Reloaded {
            count: 2,
            reconstructed: false
        }
    );
    assert_eq!(reader.len(), 2);
}

#[test]
fn empty_index_query() {
    let dir = tempdir().unwrap();
    let (index, _) = open_memory(dir.path());
    assert!(index.query(&axis(0), 10).unwrap().is_empty());
    assert!(index.is_empty());
}

#[test]
fn persistence_failure_keeps_mutation() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("blocker"), b"not a directory").unwrap();
    let cat = MemoryCatalog::new();
    let index = FaceIndex::open(
        config(&dir.path().join("blocker")),
        Arc::new(cat.clone()),
        Arc::new(cat.clone()),
    )
    .unwrap();

    let err = index.add(&axis(0), hints_for(1)).unwrap_err();
    assert!(matches!(err, FaceIdError::Persistence(_)));
    assert_eq!(index.len(), 1);
    assert!(cat.get(1).unwrap().is_some());
}

#[test]
fn persistence_failure_still_cascades_deletes() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("blocker"), b"not a directory").unwrap();
    let cat = MemoryCatalog::new();
    let index = FaceIndex::open(
        config(&dir.path().join("blocker")),
        Arc::new(cat.clone()),
        Arc::new(cat.clone()),
    )
    .unwrap();
    index.add(&axis(0), hints_for(5)).unwrap_err();
    index.add(&axis(1), hints_for(6)).unwrap_err();
    let image_id = index.image_ids_for_identity(5)[0];

    let err = index.delete_image(image_id).unwrap_err();
    assert!(matches!(err, FaceIdError::Persistence(_)));
    assert!(cat.get(5).unwrap().is_none());
    assert!(cat.get_image(image_id).unwrap().is_none());

    let err = index.delete_identity(6).unwrap_err();
    assert!(matches!(err, FaceIdError::Persistence(_)));
    assert!(cat.get(6).unwrap().is_none());
    assert!(index.is_empty());
}

#[test]
fn listing_and_timings() {
    let dir = tempdir().unwrap();
    let (index, _) = open_memory(dir.path());
    for i in 0..5 {
        index
            .add(
                &axis(i),
                EnrollHints {
                    path: Some(format!("faces/{i}.jpg")),
                    ..hints_for(if i < 3 { 1 } else { 2 })
                },
            )
            .unwrap();
    }

    let page = index.list(&ListQuery {
        identity_id: Some(1),
        page_size: 2,
        sort: SortBy::PathDesc,
        ..Default::default()
    });
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.results[0].path.as_deref(), Some("faces/2.jpg"));

    let peek = index.peek(2);
    assert_eq!(peek.total, 5);
    assert_eq!(peek.first.len(), 2);
    assert_eq!(peek.last[1].path.as_deref(), Some("faces/4.jpg"));

    let timings = index.timings();
    assert_eq!(timings["add"].count, 5);
    assert_eq!(timings["list"].count, 1);
}
