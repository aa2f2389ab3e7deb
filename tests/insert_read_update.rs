//! Scenarios 1-2 (spec.md §8): insert and read a document back unchanged,
//! then update it under both conflict policies — ERROR rejects a stale
//! expected revision, LAST-WRITE overwrites regardless.

use serde_json::json;
use tempfile::tempdir;
use vocore::collection::{Collection, CollectionKind, CollectionParameters, ConflictPolicy};
use vocore::error::StorageError;
use vocore::tick::TickGenerator;

fn new_collection(dir: &std::path::Path, name: &str) -> Collection {
    Collection::create(
        dir,
        CollectionParameters {
            cid: 1,
            name: name.to_string(),
            kind: CollectionKind::Document,
            wait_for_sync: true,
            maximal_size: 1 << 20,
        },
    )
    .unwrap()
}

#[test]
fn inserted_document_reads_back_with_key_and_revision() {
    let dir = tempdir().unwrap();
    let col = new_collection(dir.path(), "docs");
    let ticks = TickGenerator::new();

    let mptr = col.insert(&ticks, Some("alice".to_string()), &json!({"name": "Alice", "age": 30}), true, None).unwrap();
    assert_eq!(mptr.key, "alice");
    assert_eq!(mptr.cid, 1);

    let doc = col.read("alice").unwrap();
    assert_eq!(doc["name"], json!("Alice"));
    assert_eq!(doc["age"], json!(30));
    assert_eq!(doc["_key"], json!("alice"));
    assert_eq!(doc["_rev"], json!(mptr.rev.to_string()));
}

#[test]
fn duplicate_key_insert_is_rejected() {
    let dir = tempdir().unwrap();
    let col = new_collection(dir.path(), "docs");
    let ticks = TickGenerator::new();

    col.insert(&ticks, Some("alice".to_string()), &json!({"name": "Alice"}), true, None).unwrap();
    let err = col.insert(&ticks, Some("alice".to_string()), &json!({"name": "Alice2"}), true, None).unwrap_err();
    assert!(matches!(err, StorageError::DuplicateIdentifier(key) if key == "alice"));
}

#[test]
fn update_with_stale_revision_under_error_policy_is_rejected() {
    let dir = tempdir().unwrap();
    let col = new_collection(dir.path(), "docs");
    let ticks = TickGenerator::new();

    let first = col.insert(&ticks, Some("bob".to_string()), &json!({"age": 1}), true, None).unwrap();
    // Someone else updates first, advancing the revision.
    col.update(&ticks, "bob", &json!({"age": 2}), None, ConflictPolicy::Error, true).unwrap();

    let err = col
        .update(&ticks, "bob", &json!({"age": 3}), Some(first.rev), ConflictPolicy::Error, true)
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict { .. }));
    // The rejected write must not have landed.
    assert_eq!(col.read("bob").unwrap()["age"], json!(2));
}

#[test]
fn update_with_stale_revision_under_last_write_policy_overwrites() {
    let dir = tempdir().unwrap();
    let col = new_collection(dir.path(), "docs");
    let ticks = TickGenerator::new();

    let first = col.insert(&ticks, Some("bob".to_string()), &json!({"age": 1}), true, None).unwrap();
    col.update(&ticks, "bob", &json!({"age": 2}), None, ConflictPolicy::Error, true).unwrap();

    let updated = col
        .update(&ticks, "bob", &json!({"age": 3}), Some(first.rev), ConflictPolicy::LastWrite, true)
        .unwrap();
    assert_eq!(col.read("bob").unwrap()["age"], json!(3));
    assert_ne!(updated.rev, first.rev);
}

#[test]
fn removed_document_is_no_longer_readable() {
    let dir = tempdir().unwrap();
    let col = new_collection(dir.path(), "docs");
    let ticks = TickGenerator::new();

    col.insert(&ticks, Some("carol".to_string()), &json!({"age": 40}), true, None).unwrap();
    col.remove(&ticks, "carol", None, ConflictPolicy::Error, true).unwrap();

    let err = col.read("carol").unwrap_err();
    assert!(matches!(err, StorageError::DocumentNotFound(key) if key == "carol"));
    assert_eq!(col.document_count(), 0);
}
