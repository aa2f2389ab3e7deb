//! Multi-collection transaction envelope over [`crate::collection::Collection`]
//! (§4.4, C4).
//!
//! Grounded on the teacher's `graph::engine_v2::GraphEngineV2` for the
//! per-call `Result`-returning mutator style, generalized here to a
//! transaction object that groups several collection operations under one
//! tid for replication logging. Each individual `insert`/`update`/`remove`
//! is still applied eagerly and durably by `Collection` itself (matching
//! the teacher's synchronous, no-staging write path) — a transaction's
//! `collections[]`/`operations[]` bookkeeping exists to preserve `tid`
//! grouping for replication (§4.6) and to enforce the access-mode and
//! single-appearance invariants, not to defer or buffer the writes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::collection::{Collection, ConflictPolicy, MPtr};
use crate::error::{Result, StorageError};
use crate::server_context::ServerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessMode {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Running,
    Committed,
    Aborted,
}

/// Hints controlling transaction behavior (§4.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionHints {
    /// Elides the `transaction-start`/`transaction-commit` replication
    /// events; used for single-operation writes where the surrounding
    /// transaction is synthetic.
    pub single_operation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Remove,
}

/// One logged operation within a transaction, recorded for replication
/// (§4.6 `document-insert`/`-update`/`-remove` events).
#[derive(Debug, Clone)]
pub struct LoggedOperation {
    pub kind: OperationKind,
    pub cid: u64,
    pub mptr: MPtr,
    pub old_rev: Option<u64>,
}

struct TxnCollection {
    cid: u64,
    mode: AccessMode,
    operations: Vec<LoggedOperation>,
}

/// Sink that receives a transaction's operations at commit time. The
/// replication logger (§4.6, not yet active here) implements this to turn
/// a committed transaction into an event stream; a transaction with no
/// sink attached simply finalizes without emitting anything.
pub trait ReplicationSink: Send + Sync {
    fn log_transaction(&self, tid: u64, single_operation: bool, ops: &[LoggedOperation]) -> Result<()>;
}

/// A multi-collection transaction (§4.4). One entry per collection touched,
/// at most once each, with access mode monotonically widening from READ to
/// WRITE (never the reverse).
pub struct Transaction {
    pub tid: u64,
    ctx: Arc<ServerContext>,
    hints: TransactionHints,
    state: Mutex<TransactionState>,
    /// Nesting depth: `begin` starts at 1; a caller sharing this object
    /// across a call stack increments it with [`Transaction::enter`].
    /// Only the commit/abort that brings depth back to 0 is durable.
    depth: AtomicU32,
    collections: Mutex<Vec<TxnCollection>>,
    sink: Option<Arc<dyn ReplicationSink>>,
}

impl Transaction {
    pub fn begin(ctx: Arc<ServerContext>, hints: TransactionHints) -> Arc<Transaction> {
        Self::begin_with_sink(ctx, hints, None)
    }

    pub fn begin_with_sink(ctx: Arc<ServerContext>, hints: TransactionHints, sink: Option<Arc<dyn ReplicationSink>>) -> Arc<Transaction> {
        let tid = ctx.ticks().next();
        Arc::new(Transaction {
            tid,
            ctx,
            hints,
            state: Mutex::new(TransactionState::Running),
            depth: AtomicU32::new(1),
            collections: Mutex::new(Vec::new()),
            sink,
        })
    }

    /// Share this transaction object one level deeper in the call stack.
    /// Returns the new nesting level for the caller to hand back to
    /// `commit`/`abort`.
    pub fn enter(&self) -> u32 {
        self.depth.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock().unwrap()
    }

    /// Register a collection for this transaction, or widen its access
    /// mode if already registered. Enforces the "appears at most once,
    /// mode only widens" invariant (§3 Transaction).
    pub fn add_collection(&self, cid: u64, mode: AccessMode) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        if let Some(existing) = collections.iter_mut().find(|c| c.cid == cid) {
            if mode > existing.mode {
                if !existing.operations.is_empty() {
                    return Err(StorageError::IllegalState(format!(
                        "collection {cid} already has write operations; cannot widen access mode after first write"
                    )));
                }
                existing.mode = mode;
            }
            return Ok(());
        }
        collections.push(TxnCollection {
            cid,
            mode,
            operations: Vec::new(),
        });
        Ok(())
    }

    fn require_running(&self) -> Result<()> {
        if *self.state.lock().unwrap() != TransactionState::Running {
            return Err(StorageError::IllegalState("transaction is not running".to_string()));
        }
        Ok(())
    }

    fn record(&self, cid: u64, op: LoggedOperation) {
        let mut collections = self.collections.lock().unwrap();
        if let Some(entry) = collections.iter_mut().find(|c| c.cid == cid) {
            entry.operations.push(op);
        }
    }

    pub fn insert(
        &self,
        collection: &Collection,
        key: Option<String>,
        document: &Value,
        wait_for_sync: bool,
        edge: Option<crate::collection::marker_body::EdgeFields>,
    ) -> Result<MPtr> {
        self.require_running()?;
        self.add_collection(collection.id, AccessMode::Write)?;
        let mptr = collection.insert(self.ctx.ticks(), key, document, wait_for_sync, edge)?;
        self.record(
            collection.id,
            LoggedOperation {
                kind: OperationKind::Insert,
                cid: collection.id,
                mptr: mptr.clone(),
                old_rev: None,
            },
        );
        Ok(mptr)
    }

    pub fn update(
        &self,
        collection: &Collection,
        key: &str,
        document: &Value,
        expected_rev: Option<u64>,
        policy: ConflictPolicy,
        wait_for_sync: bool,
    ) -> Result<MPtr> {
        self.require_running()?;
        self.add_collection(collection.id, AccessMode::Write)?;
        let mptr = collection.update(self.ctx.ticks(), key, document, expected_rev, policy, wait_for_sync)?;
        self.record(
            collection.id,
            LoggedOperation {
                kind: OperationKind::Update,
                cid: collection.id,
                mptr: mptr.clone(),
                old_rev: expected_rev,
            },
        );
        Ok(mptr)
    }

    pub fn remove(
        &self,
        collection: &Collection,
        key: &str,
        expected_rev: Option<u64>,
        policy: ConflictPolicy,
        wait_for_sync: bool,
    ) -> Result<MPtr> {
        self.require_running()?;
        self.add_collection(collection.id, AccessMode::Write)?;
        let mptr = collection.remove(self.ctx.ticks(), key, expected_rev, policy, wait_for_sync)?;
        self.record(
            collection.id,
            LoggedOperation {
                kind: OperationKind::Remove,
                cid: collection.id,
                mptr: mptr.clone(),
                old_rev: None,
            },
        );
        Ok(mptr)
    }

    pub fn read(&self, collection: &Collection, key: &str) -> Result<Value> {
        self.require_running()?;
        self.add_collection(collection.id, AccessMode::Read)?;
        collection.read(key)
    }

    /// Commit at `nesting_level`. Only the call that brings the depth back
    /// to 0 is durable and visible to replication; nested commits just
    /// release their share of the depth counter.
    pub fn commit(&self, nesting_level: u32) -> Result<()> {
        self.require_running()?;
        if nesting_level > 1 {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Ok(());
        }
        let remaining = self.depth.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining > 0 {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        *state = TransactionState::Committed;
        drop(state);

        if let Some(sink) = &self.sink {
            let collections = self.collections.lock().unwrap();
            let ops: Vec<LoggedOperation> = collections.iter().flat_map(|c| c.operations.clone()).collect();
            drop(collections);
            if !ops.is_empty() {
                sink.log_transaction(self.tid, self.hints.single_operation, &ops)?;
            }
        }
        Ok(())
    }

    /// Abort at `nesting_level`. Operations already applied to collections
    /// are not rolled back: their markers stay on disk and are benign to
    /// recovery since no commit marker follows them (§4.4 Failure
    /// semantics). Aborting only marks the transaction object itself so
    /// replication never logs it.
    pub fn abort(&self, nesting_level: u32) -> Result<()> {
        self.require_running()?;
        if nesting_level > 1 {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Ok(());
        }
        self.depth.fetch_sub(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = TransactionState::Aborted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionKind;
    use tempfile::tempdir;

    fn new_ctx(dir: &tempfile::TempDir) -> Arc<ServerContext> {
        Arc::new(ServerContext::open(dir.path()).unwrap())
    }

    #[test]
    fn insert_then_commit_marks_transaction_committed() {
        let dir = tempdir().unwrap();
        let ctx = new_ctx(&dir);
        let col = ctx.create_collection("docs", CollectionKind::Document, true, 1 << 20).unwrap();
        let txn = Transaction::begin(ctx.clone(), TransactionHints::default());
        txn.insert(&col, Some("k1".to_string()), &serde_json::json!({"a": 1}), true, None).unwrap();
        txn.commit(1).unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(col.document_count(), 1);
    }

    #[test]
    fn access_mode_widens_from_read_to_write_once() {
        let dir = tempdir().unwrap();
        let ctx = new_ctx(&dir);
        let col = ctx.create_collection("docs", CollectionKind::Document, true, 1 << 20).unwrap();
        let txn = Transaction::begin(ctx.clone(), TransactionHints::default());
        txn.add_collection(col.id, AccessMode::Read).unwrap();
        // Widening before any write on this collection is fine.
        txn.add_collection(col.id, AccessMode::Write).unwrap();
        // A collection appears at most once regardless of how many times
        // it's registered.
        assert_eq!(txn.collections.lock().unwrap().len(), 1);
    }

    #[test]
    fn abort_leaves_written_markers_in_place() {
        let dir = tempdir().unwrap();
        let ctx = new_ctx(&dir);
        let col = ctx.create_collection("docs", CollectionKind::Document, true, 1 << 20).unwrap();
        let txn = Transaction::begin(ctx.clone(), TransactionHints::default());
        txn.insert(&col, Some("k1".to_string()), &serde_json::json!({"a": 1}), true, None).unwrap();
        txn.abort(1).unwrap();
        assert_eq!(txn.state(), TransactionState::Aborted);
        // The document write was already durable; abort does not undo it.
        assert_eq!(col.document_count(), 1);
    }

    #[test]
    fn nested_commit_only_finalizes_at_depth_zero() {
        let dir = tempdir().unwrap();
        let ctx = new_ctx(&dir);
        let col = ctx.create_collection("docs", CollectionKind::Document, true, 1 << 20).unwrap();
        let txn = Transaction::begin(ctx.clone(), TransactionHints::default());
        let level = txn.enter();
        txn.insert(&col, Some("k1".to_string()), &serde_json::json!({"a": 1}), true, None).unwrap();
        txn.commit(level).unwrap();
        assert_eq!(txn.state(), TransactionState::Running);
        txn.commit(1).unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
    }
}
