//! Storage error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Payloads and wrapped keys never appear in messages,
//! only repository ids, versions and operation names.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open or migrate the storage backend.
    #[error("failed to open storage at '{target}': {reason}")]
    Open { target: String, reason: String },

    /// Failed to read a record.
    #[error("failed to read {what}: {reason}")]
    Read { what: String, reason: String },

    /// Failed to write a record.
    #[error("failed to write {what}: {reason}")]
    Write { what: String, reason: String },

    /// Failed to delete records.
    #[error("failed to delete {what}: {reason}")]
    Delete { what: String, reason: String },

    /// Failed to begin or commit a transaction.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {what}")]
    Conflict { what: String },

    /// A record could not be (de)serialized for a file-based backend.
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },
}
