//! Scenario 3 (spec.md §8): inserting an edge writes an EDGE marker and the
//! decoded document carries `_from`/`_to` alongside the regular fields.

use serde_json::json;
use tempfile::tempdir;
use vocore::collection::marker_body::EdgeFields;
use vocore::collection::{Collection, CollectionKind, CollectionParameters};
use vocore::tick::TickGenerator;

#[test]
fn edge_document_round_trips_with_from_and_to() {
    let dir = tempdir().unwrap();
    let col = Collection::create(
        dir.path(),
        CollectionParameters {
            cid: 2,
            name: "knows".to_string(),
            kind: CollectionKind::Edge,
            wait_for_sync: true,
            maximal_size: 1 << 20,
        },
    )
    .unwrap();
    let ticks = TickGenerator::new();

    let edge = EdgeFields {
        from_cid: 1,
        from_key: "alice".to_string(),
        to_cid: 1,
        to_key: "bob".to_string(),
    };
    let mptr = col
        .insert(&ticks, Some("e1".to_string()), &json!({"since": 2020}), true, Some(edge))
        .unwrap();
    assert_eq!(mptr.key, "e1");

    let doc = col.read("e1").unwrap();
    assert_eq!(doc["since"], json!(2020));
    assert_eq!(doc["_from"], json!("1/alice"));
    assert_eq!(doc["_to"], json!("1/bob"));
}

#[test]
fn edge_survives_reopen_with_from_and_to_intact() {
    let dir = tempdir().unwrap();
    {
        let col = Collection::create(
            dir.path(),
            CollectionParameters {
                cid: 2,
                name: "knows".to_string(),
                kind: CollectionKind::Edge,
                wait_for_sync: true,
                maximal_size: 1 << 20,
            },
        )
        .unwrap();
        let ticks = TickGenerator::new();
        let edge = EdgeFields {
            from_cid: 1,
            from_key: "alice".to_string(),
            to_cid: 1,
            to_key: "bob".to_string(),
        };
        col.insert(&ticks, Some("e1".to_string()), &json!({"since": 2020}), true, Some(edge)).unwrap();
    }

    let ticks = TickGenerator::new();
    let col = Collection::open(dir.path(), &ticks).unwrap();
    let doc = col.read("e1").unwrap();
    assert_eq!(doc["_from"], json!("1/alice"));
    assert_eq!(doc["_to"], json!("1/bob"));
}
