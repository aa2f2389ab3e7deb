//! Replication logger and applier (§4.6, C6).

pub mod applier;
pub mod events;
pub mod logger;

pub use applier::{ApplierPhase, ReplicationApplier};
pub use events::{Event, LogEntry, TxnCollectionSummary};
pub use logger::{ReplicationLogger, REPLICATION_COLLECTION};
