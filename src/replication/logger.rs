//! Replication logger (§4.6): turns committed transactions into a durable,
//! totally-ordered event stream appended to a system collection.
//!
//! Grounded on `collection::Collection` for the append path (the logger is
//! just another writer inserting documents) and on `original_source`'s
//! `VocBase/replication.c` for the "collection-level write lock spanning
//! transaction-start..transaction-commit" requirement, translated into a
//! plain `Mutex` held for the duration of one `log_transaction` call the
//! way the teacher serializes other multi-step operations.

use std::sync::{Arc, Mutex};

use crate::collection::Collection;
use crate::error::Result;
use crate::server_context::ServerContext;
use crate::transaction::{LoggedOperation, OperationKind, ReplicationSink};

use super::events::{Event, LogEntry, TxnCollectionSummary};

/// Name of the system collection the logger appends to, the way ArangoDB
/// reserves `_replication` for its event stream.
pub const REPLICATION_COLLECTION: &str = "_replication";

pub struct ReplicationLogger {
    ctx: Arc<ServerContext>,
    log: Arc<Collection>,
    sequence: Mutex<()>,
}

impl ReplicationLogger {
    /// Open (creating if needed) the replication system collection under
    /// `ctx` and return a logger bound to it.
    pub fn open(ctx: Arc<ServerContext>) -> Result<Self> {
        let log = match ctx.collection_by_name(REPLICATION_COLLECTION) {
            Ok(col) => col,
            Err(_) => ctx.create_collection(REPLICATION_COLLECTION, crate::collection::CollectionKind::Document, true, 32 << 20)?,
        };
        Ok(ReplicationLogger {
            ctx,
            log,
            sequence: Mutex::new(()),
        })
    }

    fn append(&self, event: Event) -> Result<u64> {
        let tick = self.ctx.ticks().next();
        let entry = LogEntry { tick, event };
        let value = serde_json::to_value(&entry)?;
        self.log.insert(self.ctx.ticks(), Some(tick.to_string()), &value, true, None)?;
        Ok(tick)
    }

    /// Append a standalone event outside of any transaction (e.g.
    /// `collection-create`, `index-drop`, `replication-stop`).
    pub fn log_event(&self, event: Event) -> Result<u64> {
        let _guard = self.sequence.lock().unwrap();
        self.append(event)
    }
}

impl ReplicationSink for ReplicationLogger {
    fn log_transaction(&self, tid: u64, single_operation: bool, ops: &[LoggedOperation]) -> Result<()> {
        let _guard = self.sequence.lock().unwrap();

        let mut per_collection: Vec<TxnCollectionSummary> = Vec::new();
        for op in ops {
            if let Some(entry) = per_collection.iter_mut().find(|c| c.cid == op.cid) {
                entry.operation_count += 1;
            } else {
                per_collection.push(TxnCollectionSummary {
                    cid: op.cid,
                    operation_count: 1,
                });
            }
        }

        if !single_operation {
            self.append(Event::TransactionStart {
                tid,
                collections: per_collection.clone(),
            })?;
        }

        for op in ops {
            let document = match op.kind {
                OperationKind::Remove => None,
                OperationKind::Insert | OperationKind::Update => self
                    .ctx
                    .collection(op.cid)
                    .ok()
                    .and_then(|col| col.read(&op.mptr.key).ok()),
            };

            let event = match op.kind {
                OperationKind::Insert => Event::DocumentInsert {
                    cid: op.cid,
                    key: op.mptr.key.clone(),
                    document: document.unwrap_or(serde_json::Value::Null),
                },
                OperationKind::Update => Event::DocumentUpdate {
                    cid: op.cid,
                    key: op.mptr.key.clone(),
                    old_rev: op.old_rev,
                    document: document.unwrap_or(serde_json::Value::Null),
                },
                OperationKind::Remove => Event::DocumentRemove {
                    cid: op.cid,
                    key: op.mptr.key.clone(),
                    old_rev: op.old_rev,
                },
            };
            self.append(event)?;
        }

        if !single_operation {
            self.append(Event::TransactionCommit {
                tid,
                collections: per_collection,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{AccessMode, Transaction, TransactionHints};
    use tempfile::tempdir;

    #[test]
    fn committing_a_transaction_appends_start_ops_and_commit_events() {
        let dir = tempdir().unwrap();
        let ctx = Arc::new(ServerContext::open(dir.path()).unwrap());
        let docs = ctx
            .create_collection("docs", crate::collection::CollectionKind::Document, true, 1 << 20)
            .unwrap();
        let logger = Arc::new(ReplicationLogger::open(ctx.clone()).unwrap());

        let txn = Transaction::begin_with_sink(ctx.clone(), TransactionHints::default(), Some(logger.clone() as Arc<dyn ReplicationSink>));
        txn.add_collection(docs.id, AccessMode::Write).unwrap();
        txn.insert(&docs, Some("k1".to_string()), &serde_json::json!({"a": 1}), true, None).unwrap();
        txn.commit(1).unwrap();

        assert_eq!(logger.log.document_count(), 3);
    }

    #[test]
    fn single_operation_hint_elides_start_and_commit_events() {
        let dir = tempdir().unwrap();
        let ctx = Arc::new(ServerContext::open(dir.path()).unwrap());
        let docs = ctx
            .create_collection("docs", crate::collection::CollectionKind::Document, true, 1 << 20)
            .unwrap();
        let logger = Arc::new(ReplicationLogger::open(ctx.clone()).unwrap());

        let hints = TransactionHints { single_operation: true };
        let txn = Transaction::begin_with_sink(ctx.clone(), hints, Some(logger.clone() as Arc<dyn ReplicationSink>));
        txn.insert(&docs, Some("k1".to_string()), &serde_json::json!({"a": 1}), true, None).unwrap();
        txn.commit(1).unwrap();

        assert_eq!(logger.log.document_count(), 1);
    }
}
