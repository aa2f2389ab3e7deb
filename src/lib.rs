//! vocore: the storage and write-ordering core of a multi-model
//! document/graph database server.
//!
//! Append-only, memory-mapped datafiles (§3 Datafile) hold markers framed
//! with a common prefix and checked by CRC. A per-collection shaper
//! (§4.2) interns attribute names and structural shapes so documents are
//! stored as compact shaped bodies rather than repeated JSON text. A
//! header index (§4.3) gives O(1) key lookup and tracks insertion order
//! for compaction. Collections (§4.4) apply document mutations under a
//! per-collection write lock, routed through transactions (§4.4) that
//! group operations for replication (§4.6). A WAL slot ring (§4.5) exists
//! as the group-commit primitive for components that need it independent
//! of a specific collection's journal.
//!
//! [`ServerContext`] ties every collection, the shared tick source, and
//! server metrics together and is threaded through the Core API instead of
//! being reached for as a global (§9).

pub mod collection;
pub mod config;
pub mod datafile;
pub mod error;
pub mod header_index;
pub mod index;
pub mod marker;
pub mod metrics;
pub mod replication;
pub mod server_context;
pub mod shaper;
pub mod tick;
pub mod transaction;
pub mod wal;

pub use collection::{Collection, CollectionKind, CollectionParameters, ConflictPolicy, MPtr};
pub use error::{Result, StorageError};
pub use server_context::ServerContext;
pub use tick::TickGenerator;
pub use transaction::{Transaction, TransactionHints};
