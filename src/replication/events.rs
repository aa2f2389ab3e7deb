//! Replication event taxonomy (§4.6).
//!
//! Grounded on the teacher's `bin/rfdb_server.rs` wire-protocol `Request`
//! enum for the tagged, `serde`-derived shape (`#[serde(tag = "...")]`,
//! `camelCase` field renaming) and on `original_source`'s
//! `VocBase/replication.c` for the exact event set and payload fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One replicated change, stable-string tagged the way the teacher tags
/// its wire `Request`/`Response` enums.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    TransactionStart {
        tid: u64,
        collections: Vec<TxnCollectionSummary>,
    },
    TransactionCommit {
        tid: u64,
        collections: Vec<TxnCollectionSummary>,
    },
    CollectionCreate {
        cid: u64,
        name: String,
    },
    CollectionDrop {
        cid: u64,
    },
    CollectionRename {
        cid: u64,
        new_name: String,
    },
    CollectionChange {
        cid: u64,
        details: Value,
    },
    IndexCreate {
        cid: u64,
        index: Value,
    },
    IndexDrop {
        cid: u64,
        index_id: u64,
    },
    DocumentInsert {
        cid: u64,
        key: String,
        document: Value,
    },
    DocumentUpdate {
        cid: u64,
        key: String,
        old_rev: Option<u64>,
        document: Value,
    },
    DocumentRemove {
        cid: u64,
        key: String,
        old_rev: Option<u64>,
    },
    ReplicationStop {
        last_id: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnCollectionSummary {
    pub cid: u64,
    pub operation_count: usize,
}

/// One event as stored in the replication log collection: the event
/// itself plus the tick that is both its ordering key and its primary
/// key in the system collection (§4.6: "its primary key is the event's
/// tick").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub tick: u64,
    #[serde(flatten)]
    pub event: Event,
}
