//! Tests for backend selection by name.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use plugdb::backends::MemDb;
use plugdb::registry::global;
use plugdb::{new_db, register_backend, BackendType, Database, Registry, StorageError};

#[test]
fn test_unknown_backend() {
    let err = new_db("state", "bogus-engine", "").err().expect("open should fail");
    assert!(matches!(err, StorageError::UnknownBackend(ref name) if name == "bogus-engine"));
}

#[test]
fn test_every_builtin_opens() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    for backend in BackendType::ALL {
        let db = new_db("state", backend.as_str(), dir.path()).expect("failed to open");
        db.set_sync(b"k", b"v").expect("failed to set");
        assert!(db.stats().contains_key("database.type"));
        db.close().expect("failed to close");

        let file = dir.path().join(format!("state.{backend}"));
        assert_eq!(file.exists(), backend.is_persistent(), "{backend}");
    }
}

#[test]
fn test_persistent_backends_reopen() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let nested = dir.path().join("nested").join("data");

    for backend in ["logdb", "redb"] {
        {
            let db = new_db("chain", backend, &nested).expect("failed to open");
            db.set(b"height", b"42").expect("failed to set");
            db.close().expect("failed to close");
        }

        let db = new_db("chain", backend, &nested).expect("failed to reopen");
        assert_eq!(db.get(b"height").expect("failed to get"), Some(b"42".to_vec()), "{backend}");
        db.close().expect("failed to close");
    }
}

#[test]
fn test_persistent_store_has_one_owner() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    for backend in ["logdb", "redb"] {
        let db = new_db("owned", backend, dir.path()).expect("failed to open");
        let err = new_db("owned", backend, dir.path()).err().expect("second open should fail");
        assert!(matches!(err, StorageError::BackendOpen { .. }), "{backend}: {err}");

        db.close().expect("failed to close");
        let db = new_db("owned", backend, dir.path()).expect("failed to reopen");
        db.close().expect("failed to close");
    }
}

#[test]
fn test_empty_name_is_rejected_by_disk_backends() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    for backend in ["logdb", "redb"] {
        let err = new_db("", backend, dir.path()).err().expect("open should fail");
        match err {
            StorageError::BackendOpen { backend: name, source } => {
                assert_eq!(name, backend);
                assert!(source.to_string().contains("name"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn test_register_backend_globally() {
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);

    register_backend("registry-test-counting", move |_name: &str, _dir: &Path| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemDb::new()) as Box<dyn Database>)
    });
    assert!(global().is_registered("registry-test-counting"));

    let db = new_db("x", "registry-test-counting", "").expect("failed to open");
    db.set(b"k", b"v").expect("failed to set");
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    // Replacing the constructor takes effect for later opens
    register_backend("registry-test-counting", |_: &str, _: &Path| {
        Err(StorageError::Internal("disabled".into()))
    });
    let err = new_db("x", "registry-test-counting", "").err().expect("open should fail");
    assert!(matches!(err, StorageError::BackendOpen { .. }));
    assert_eq!(opened.load(Ordering::SeqCst), 1);
}

#[test]
fn test_independent_registry() {
    let registry = Registry::new();
    assert!(registry.backends().is_empty());
    assert!(matches!(
        registry.open("x", "memdb", "").err(),
        Some(StorageError::UnknownBackend(_))
    ));

    registry.register("memdb", |_: &str, _: &Path| Ok(Box::new(MemDb::new()) as Box<dyn Database>));
    let db = registry.open("x", "memdb", "").expect("failed to open");
    assert!(db.get(b"k").expect("failed to get").is_none());

    // The process-wide registry is unaffected
    assert!(!global().is_registered("registry-test-never-registered"));
}

#[test]
fn test_concurrent_registration_and_lookup() {
    let registry = Registry::with_builtins();

    std::thread::scope(|s| {
        for t in 0..4 {
            let registry = &registry;
            s.spawn(move || {
                for i in 0..25 {
                    registry.register(format!("custom-{t}-{i}"), |_: &str, _: &Path| {
                        Ok(Box::new(MemDb::new()) as Box<dyn Database>)
                    });
                    let db = registry.open("x", "memdb", "").expect("failed to open");
                    db.close().expect("failed to close");
                }
            });
        }
    });

    assert_eq!(registry.backends().len(), 4 + 100);
}
