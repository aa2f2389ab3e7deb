//! Error types for the storage core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Every failure mode the storage core can surface to a caller.
///
/// Kinds follow the taxonomy in the error-handling design: resource,
/// corruption, concurrency, not-found, and policy errors are all
/// represented as distinct variants rather than string matching.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("datafile is full")]
    DatafileFull,

    #[error("filesystem is full")]
    FilesystemFull,

    #[error("datafile corrupted at offset {offset}: {reason}")]
    CorruptedDatafile { offset: u64, reason: String },

    #[error("datafile '{0}' is in WRITE-ERROR state and cannot accept further markers")]
    DatafileWriteError(String),

    #[error("unsupported datafile version {0}")]
    UnsupportedVersion(u32),

    #[error("duplicate identifier '{0}'")]
    DuplicateIdentifier(String),

    #[error("document not found: '{0}'")]
    DocumentNotFound(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(u64),

    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    #[error("revision conflict on '{key}': expected {expected}, found {found}")]
    Conflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("unique constraint violated on index '{index}' for key '{key}'")]
    UniqueConstraintViolated { index: String, key: String },

    #[error("document type invalid: {0}")]
    DocumentTypeInvalid(String),

    #[error("edge handle '{0}' has no collection component")]
    InvalidEdgeHandle(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("operation forbidden: {0}")]
    Forbidden(String),

    #[error("header allocation failed")]
    HeaderAllocationFailed,

    #[error("out of memory")]
    OutOfMemory,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Stable wire-safe tag, independent of the `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::DatafileFull => "DATAFILE_FULL",
            StorageError::FilesystemFull => "FILESYSTEM_FULL",
            StorageError::CorruptedDatafile { .. } => "CORRUPTED_DATAFILE",
            StorageError::DatafileWriteError(_) => "DATAFILE_WRITE_ERROR",
            StorageError::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            StorageError::DuplicateIdentifier(_) => "DUPLICATE_IDENTIFIER",
            StorageError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            StorageError::CollectionNotFound(_) => "COLLECTION_NOT_FOUND",
            StorageError::CollectionExists(_) => "COLLECTION_EXISTS",
            StorageError::Conflict { .. } => "CONFLICT",
            StorageError::UniqueConstraintViolated { .. } => "UNIQUE_CONSTRAINT_VIOLATED",
            StorageError::DocumentTypeInvalid(_) => "DOCUMENT_TYPE_INVALID",
            StorageError::InvalidEdgeHandle(_) => "INVALID_EDGE_HANDLE",
            StorageError::IllegalState(_) => "ILLEGAL_STATE",
            StorageError::Forbidden(_) => "FORBIDDEN",
            StorageError::HeaderAllocationFailed => "HEADER_ALLOCATION_FAILED",
            StorageError::OutOfMemory => "OUT_OF_MEMORY",
            StorageError::Io(_) => "IO_ERROR",
            StorageError::Serialization(_) => "SERIALIZATION_ERROR",
            StorageError::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether a caller may usefully retry the exact same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::DatafileFull | StorageError::Conflict { .. }
        )
    }
}

/// Errors surfaced by the replication applier, split the way the applier's
/// retry loop needs: transient errors back off and retry, fatal errors stop
/// the applier and freeze `last-applied-tick`.
#[derive(Error, Debug)]
pub enum ApplierError {
    #[error("transient error: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("fatal error: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl ApplierError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApplierError::Fatal(_))
    }
}
