//! Integration tests for the on-disk attachment archive.

use assert_fs::prelude::*;
use chrono::{TimeZone, Utc};
use predicates::prelude::*;

use imapscrub::error::StorageError;
use imapscrub::store::attachment::fingerprint;
use imapscrub::store::AttachmentStore;

fn stamp() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 11, 5, 8, 0, 0).unwrap()
}

#[test]
fn test_same_content_is_written_once() {
    let temp = assert_fs::TempDir::new().unwrap();
    let store = AttachmentStore::new(temp.path());

    let first = store
        .persist(b"%PDF-1.4", "bob@example.com", "invoice.pdf", stamp())
        .unwrap();
    let expected = format!("bob@example.com/{}-invoice.pdf", fingerprint(b"%PDF-1.4"));
    temp.child(&expected).assert("%PDF-1.4");

    // A second persist must leave the existing file untouched
    std::fs::write(&first, "tampered").unwrap();
    let second = store
        .persist(b"%PDF-1.4", "bob@example.com", "invoice.pdf", stamp())
        .unwrap();
    assert_eq!(first, second);
    temp.child(&expected).assert("tampered");

    temp.close().unwrap();
}

#[test]
fn test_different_content_gets_different_paths() {
    let temp = assert_fs::TempDir::new().unwrap();
    let store = AttachmentStore::new(temp.path());

    let a = store
        .persist(b"version one", "bob@example.com", "notes.txt", stamp())
        .unwrap();
    let b = store
        .persist(b"version two", "bob@example.com", "notes.txt", stamp())
        .unwrap();

    assert_ne!(a, b);
    assert!(predicate::path::is_file().eval(&a));
    assert!(predicate::path::is_file().eval(&b));
    assert!(predicate::str::ends_with("-notes.txt").eval(&a.to_string_lossy()));
}

#[test]
fn test_traversal_stays_inside_root() {
    let temp = assert_fs::TempDir::new().unwrap();
    let store = AttachmentStore::new(temp.path());

    let path = store
        .persist(b"root:x:0:0", "../../evil", "../../etc/passwd", stamp())
        .unwrap();

    assert!(path.starts_with(temp.path()));
    assert_eq!(path.parent().unwrap().parent().unwrap(), temp.path());
    assert!(predicate::str::ends_with("-passwd").eval(&path.to_string_lossy()));
    temp.child("etc").assert(predicate::path::missing());
}

#[test]
fn test_missing_owner_uses_fallback_directory() {
    let temp = assert_fs::TempDir::new().unwrap();
    let store = AttachmentStore::new(temp.path());

    store.persist(b"data", "", "a.bin", stamp()).unwrap();
    temp.child("no-email").assert(predicate::path::is_dir());
}

#[test]
fn test_unusable_filename_is_rejected() {
    let temp = assert_fs::TempDir::new().unwrap();
    let store = AttachmentStore::new(temp.path());

    let err = store
        .persist(b"data", "bob@example.com", "folder/", stamp())
        .unwrap_err();
    assert!(matches!(err, StorageError::EmptyFilename(_)));
}
