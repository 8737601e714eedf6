//! Pod record storage for Kestrel.
//!
//! This crate provides the data layer: `PodRecord` (one generation of a tracked
//! workload), `PodRecordStore` (a concurrent snapshot index shared by every pod
//! actor), and the `RecordJournal` durability seam with a file-backed
//! implementation that writes atomically and verifies blake3 checksums on load.

pub mod index;
pub mod journal;
pub mod layout;
pub mod lock;
pub mod record;

pub use index::PodRecordStore;
pub use journal::{FileJournal, RecordJournal};
pub use layout::{JournalLayout, JOURNAL_FORMAT_VERSION};
pub use lock::JournalLock;
pub use record::PodRecord;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename is durable until its parent directory
/// has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for pod '{pod_id}': expected {expected}, got {actual}")]
    IntegrityFailure {
        pod_id: String,
        expected: String,
        actual: String,
    },
    #[error("pod not found: {0}")]
    PodNotFound(String),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("journal format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
