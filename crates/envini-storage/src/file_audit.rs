//! File-based audit store.
//!
//! Appends JSON-lines audit entries to a file. Each line is one serialized
//! [`AuditLogEntry`]. The file is opened in append-only mode. No update or
//! delete operations are ever performed.
//!
//! # Thread safety
//!
//! A `tokio::sync::Mutex` around the file handle serializes writes. The
//! critical section is one `write_all` plus a flush.

use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::models::{AuditLogEntry, NewAuditEntry};
use crate::{AuditStore, StorageError};

/// Audit store that writes JSON-lines to a file.
pub struct FileAuditStore {
    path: PathBuf,
    writer: Mutex<Option<tokio::fs::File>>,
}

impl FileAuditStore {
    /// Create a store writing to the given path.
    ///
    /// The file is created (or opened for append) lazily on the first write.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    async fn open(
        &self,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<tokio::fs::File>>, StorageError> {
        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| StorageError::Open {
                    target: self.path.display().to_string(),
                    reason: e.to_string(),
                })?;
            *guard = Some(file);
        }
        Ok(guard)
    }
}

#[async_trait::async_trait]
impl AuditStore for FileAuditStore {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, StorageError> {
        let entry = entry.into_entry();
        let mut line = serde_json::to_vec(&entry).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let mut guard = self.open().await?;
        let file = guard.as_mut().ok_or_else(|| StorageError::Write {
            what: "audit file".to_owned(),
            reason: "file handle unexpectedly None after open".to_owned(),
        })?;

        file.write_all(&line)
            .await
            .map_err(|e| StorageError::Write {
                what: "audit file".to_owned(),
                reason: format!("write failed: {e}"),
            })?;

        file.flush().await.map_err(|e| StorageError::Write {
            what: "audit file".to_owned(),
            reason: format!("flush failed: {e}"),
        })?;

        Ok(entry)
    }
}

impl std::fmt::Debug for FileAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
