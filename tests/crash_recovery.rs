//! Crash-mid-write recovery (spec.md scenario 4): a writer allocates a slot,
//! writes marker bytes, but the process dies before the trailing bytes form
//! a valid marker. On restart, recovery must truncate the datafile at the
//! last good marker and continue serving the documents that came before it.
//!
//! Adapted from the teacher's `tests/crash_recovery.rs` integration-test
//! style: build state, simulate the crash by mutating the file directly,
//! then reopen and assert on what survived.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

use serde_json::json;
use tempfile::tempdir;
use vocore::collection::{Collection, CollectionKind, CollectionParameters};
use vocore::tick::TickGenerator;

fn params(name: &str) -> CollectionParameters {
    CollectionParameters {
        cid: 1,
        name: name.to_string(),
        kind: CollectionKind::Document,
        wait_for_sync: true,
        maximal_size: 1 << 20,
    }
}

#[test]
fn corrupted_trailing_marker_is_truncated_and_valid_documents_survive() {
    let dir = tempdir().unwrap();
    {
        let col = Collection::create(dir.path(), params("docs")).unwrap();
        let ticks = TickGenerator::new();
        col.insert(&ticks, Some("k1".to_string()), &json!({"a": 1}), true, None).unwrap();
        col.insert(&ticks, Some("k2".to_string()), &json!({"a": 2}), true, None).unwrap();
        col.insert(&ticks, Some("k3".to_string()), &json!({"a": 3}), true, None).unwrap();
    }

    // Simulate a crash mid-write: find the live write cursor by reopening
    // the journal read-only, then stamp a bogus, non-zero-size marker with
    // an invalid type/CRC directly after it, as if a writer had reserved
    // the slot but never finished writing before the process died.
    let journal_path = dir.path().join("journal-1.db");
    let cursor = {
        let ticks = TickGenerator::new();
        let df = vocore::datafile::Datafile::open(&journal_path, &ticks).unwrap();
        df.current_size()
    };

    let mut file = OpenOptions::new().write(true).open(&journal_path).unwrap();
    file.seek(SeekFrom::Start(cursor as u64)).unwrap();
    let mut garbage = vec![0u8; 64];
    garbage[0..4].copy_from_slice(&64u32.to_ne_bytes()); // size
    garbage[4..8].copy_from_slice(&99u32.to_ne_bytes()); // bogus marker type
    file.write_all(&garbage).unwrap();
    file.sync_all().unwrap();
    drop(file);

    // Reopen: recovery must truncate the bad tail and keep serving k1..k3.
    let ticks = TickGenerator::new();
    let col = Collection::open(dir.path(), &ticks).unwrap();
    assert_eq!(col.document_count(), 3);
    assert_eq!(col.read("k1").unwrap()["a"], json!(1));
    assert_eq!(col.read("k2").unwrap()["a"], json!(2));
    assert_eq!(col.read("k3").unwrap()["a"], json!(3));

    // The collection must still be writable after recovery.
    let mptr = col.insert(&ticks, Some("k4".to_string()), &json!({"a": 4}), true, None).unwrap();
    assert_eq!(mptr.key, "k4");
    assert_eq!(col.document_count(), 4);
}
