use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current journal format version. Incremented on incompatible layout changes.
pub const JOURNAL_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout of a pod record journal.
///
/// ```text
/// <root>/version
/// <root>/.lock
/// <root>/pods/<pod_id>
/// ```
#[derive(Debug, Clone)]
pub struct JournalLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalVersion {
    format_version: u32,
}

impl JournalLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn pods_dir(&self) -> PathBuf {
        self.root.join("pods")
    }

    #[inline]
    pub fn pod_path(&self, pod_id: &str) -> PathBuf {
        self.pods_dir().join(pod_id)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.pods_dir())?;

        let version_path = self.root.join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = JournalVersion {
                format_version: JOURNAL_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let mut tmp = NamedTempFile::new_in(&self.root)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&self.root)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.root.join(VERSION_FILE);
        let content = fs::read_to_string(&version_path)?;
        let ver: JournalVersion = serde_json::from_str(&content)?;

        if ver.format_version != JOURNAL_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: JOURNAL_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}
