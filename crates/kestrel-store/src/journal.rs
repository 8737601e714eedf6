use crate::layout::JournalLayout;
use crate::lock::JournalLock;
use crate::record::PodRecord;
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Durability collaborator for pod records.
///
/// The store writes through the journal before updating its in-memory
/// index, so a record visible to readers is always already durable.
pub trait RecordJournal: Send + Sync {
    fn put(&self, record: &PodRecord) -> Result<(), StoreError>;

    fn remove(&self, pod_id: &str) -> Result<(), StoreError>;

    fn load_all(&self) -> Result<Vec<PodRecord>, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    record: PodRecord,
    /// blake3 over the pretty-printed record.
    checksum: String,
}

fn record_checksum(record: &PodRecord) -> Result<String, StoreError> {
    let json = serde_json::to_string_pretty(record)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// One JSON file per pod, written atomically (temp file, fsync, rename,
/// directory fsync) and verified against its checksum on load.
pub struct FileJournal {
    layout: JournalLayout,
    _lock: JournalLock,
}

impl FileJournal {
    /// Open (creating if needed) the journal rooted at `root`.
    ///
    /// Fails with [`StoreError::LockFailed`] if another process has it open.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let layout = JournalLayout::new(root);
        layout.initialize()?;
        let lock = JournalLock::try_acquire(&layout.lock_file())?.ok_or_else(|| {
            StoreError::LockFailed(format!(
                "journal at {} is in use by another process",
                layout.root().display()
            ))
        })?;
        Ok(Self {
            layout,
            _lock: lock,
        })
    }

    pub fn layout(&self) -> &JournalLayout {
        &self.layout
    }

    pub fn get(&self, pod_id: &str) -> Result<PodRecord, StoreError> {
        let path = self.layout.pod_path(pod_id);
        if !path.exists() {
            return Err(StoreError::PodNotFound(pod_id.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        let entry: JournalEntry = serde_json::from_str(&content)?;

        let actual = record_checksum(&entry.record)?;
        if actual != entry.checksum {
            return Err(StoreError::IntegrityFailure {
                pod_id: pod_id.to_owned(),
                expected: entry.checksum,
                actual,
            });
        }
        Ok(entry.record)
    }
}

impl RecordJournal for FileJournal {
    fn put(&self, record: &PodRecord) -> Result<(), StoreError> {
        let dir = self.layout.pods_dir();
        let dest = self.layout.pod_path(&record.pod_id);

        let entry = JournalEntry {
            record: record.clone(),
            checksum: record_checksum(record)?,
        };
        let content = serde_json::to_string_pretty(&entry)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        debug!(
            "journaled {} gen {} at {}",
            record.pod_id, record.generation, record.current_status
        );
        Ok(())
    }

    fn remove(&self, pod_id: &str) -> Result<(), StoreError> {
        let path = self.layout.pod_path(pod_id);
        if path.exists() {
            fs::remove_file(path)?;
            fsync_dir(&self.layout.pods_dir())?;
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<PodRecord>, StoreError> {
        let dir = self.layout.pods_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let name = entry.file_name();
                let name_str = name.to_str().unwrap_or("");
                // Temp files from an interrupted write start with '.'.
                if name_str.is_empty() || name_str.starts_with('.') {
                    continue;
                }
                match self.get(name_str) {
                    Ok(record) => results.push(record),
                    Err(e) => {
                        warn!("skipping corrupted journal entry '{name_str}': {e}");
                    }
                }
            }
        }
        results.sort_by(|a, b| a.pod_id.cmp(&b.pod_id));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_schema::{PodId, PodStatus, RequestId, ScenarioName};

    fn sample(pod: &str, status: PodStatus) -> PodRecord {
        PodRecord::new(PodId::new(pod), ScenarioName::new(pod), 1, status)
    }

    #[test]
    fn put_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path()).unwrap();

        let mut record = sample("boot", PodStatus::Init);
        record
            .outstanding_requests
            .insert(RequestId::new("boot-g1-s2-a0"));
        journal.put(&record).unwrap();

        assert_eq!(journal.get("boot").unwrap(), record);
    }

    #[test]
    fn get_missing_is_pod_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path()).unwrap();
        assert!(matches!(
            journal.get("nope"),
            Err(StoreError::PodNotFound(_))
        ));
    }

    #[test]
    fn tampered_entry_fails_integrity_check() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path()).unwrap();
        journal.put(&sample("boot", PodStatus::Running)).unwrap();

        let path = journal.layout().pod_path("boot");
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("RUNNING", "DONE")).unwrap();

        assert!(matches!(
            journal.get("boot"),
            Err(StoreError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn load_all_skips_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path()).unwrap();
        journal.put(&sample("a", PodStatus::Done)).unwrap();
        journal.put(&sample("b", PodStatus::Init)).unwrap();
        fs::write(journal.layout().pod_path("c"), "not json").unwrap();

        let records = journal.load_all().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.pod_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn remove_deletes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path()).unwrap();
        journal.put(&sample("boot", PodStatus::Done)).unwrap();
        journal.remove("boot").unwrap();
        journal.remove("boot").unwrap();
        assert!(journal.load_all().unwrap().is_empty());
    }

    #[test]
    fn second_open_is_rejected_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let _first = FileJournal::open(dir.path()).unwrap();
        assert!(matches!(
            FileJournal::open(dir.path()),
            Err(StoreError::LockFailed(_))
        ));
    }

    #[test]
    fn reopen_after_drop_sees_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let journal = FileJournal::open(dir.path()).unwrap();
            journal.put(&sample("boot", PodStatus::Ready)).unwrap();
        }
        let journal = FileJournal::open(dir.path()).unwrap();
        let records = journal.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].current_status, PodStatus::Ready);
    }
}
