use crate::journal::RecordJournal;
use crate::record::PodRecord;
use crate::StoreError;
use kestrel_schema::PodId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Concurrent lookup index of pod record snapshots.
///
/// Readers always see the last snapshot published for a pod. When a journal
/// is attached, each publish is written through before the index changes.
pub struct PodRecordStore {
    records: RwLock<HashMap<PodId, PodRecord>>,
    journal: Option<Arc<dyn RecordJournal>>,
}

impl Default for PodRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PodRecordStore {
    /// In-memory store; records do not survive a restart.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            journal: None,
        }
    }

    pub fn with_journal(journal: Arc<dyn RecordJournal>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            journal: Some(journal),
        }
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    /// Load every journaled record into the index. Returns the loaded records.
    pub fn restore(&self) -> Result<Vec<PodRecord>, StoreError> {
        let Some(journal) = &self.journal else {
            return Ok(Vec::new());
        };
        let loaded = journal.load_all()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for record in &loaded {
            records.insert(record.pod_id.clone(), record.clone());
        }
        if !loaded.is_empty() {
            info!("restored {} pod records from journal", loaded.len());
        }
        Ok(loaded)
    }

    pub fn publish(&self, record: PodRecord) -> Result<(), StoreError> {
        if let Some(journal) = &self.journal {
            journal.put(&record)?;
        }
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.pod_id.clone(), record);
        Ok(())
    }

    pub fn get(&self, pod_id: &str) -> Option<PodRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(pod_id).cloned()
    }

    pub fn contains(&self, pod_id: &str) -> bool {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.contains_key(pod_id)
    }

    /// All records, sorted by pod id.
    pub fn list(&self) -> Vec<PodRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<PodRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.pod_id.cmp(&b.pod_id));
        all
    }

    pub fn remove(&self, pod_id: &str) -> Result<Option<PodRecord>, StoreError> {
        if let Some(journal) = &self.journal {
            journal.remove(pod_id)?;
        }
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(pod_id))
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::FileJournal;
    use kestrel_schema::{PodStatus, ScenarioName};
    use std::thread;

    fn sample(pod: &str, status: PodStatus) -> PodRecord {
        PodRecord::new(PodId::new(pod), ScenarioName::new(pod), 1, status)
    }

    #[test]
    fn publish_then_get() {
        let store = PodRecordStore::new();
        assert!(store.get("boot").is_none());
        store.publish(sample("boot", PodStatus::Init)).unwrap();
        assert_eq!(store.get("boot").unwrap().current_status, PodStatus::Init);
        assert!(store.contains("boot"));
        assert!(!store.is_durable());
    }

    #[test]
    fn publish_replaces_snapshot() {
        let store = PodRecordStore::new();
        store.publish(sample("boot", PodStatus::Init)).unwrap();
        store.publish(sample("boot", PodStatus::Ready)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("boot").unwrap().current_status, PodStatus::Ready);
    }

    #[test]
    fn list_is_sorted() {
        let store = PodRecordStore::new();
        store.publish(sample("c", PodStatus::Init)).unwrap();
        store.publish(sample("a", PodStatus::Init)).unwrap();
        store.publish(sample("b", PodStatus::Init)).unwrap();
        let ids: Vec<String> = store
            .list()
            .into_iter()
            .map(|r| r.pod_id.into_inner())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_returns_previous() {
        let store = PodRecordStore::new();
        store.publish(sample("boot", PodStatus::Done)).unwrap();
        let removed = store.remove("boot").unwrap();
        assert!(removed.is_some());
        assert!(store.is_empty());
        assert!(store.remove("boot").unwrap().is_none());
    }

    #[test]
    fn concurrent_publishers_on_distinct_pods() {
        let store = Arc::new(PodRecordStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .publish(sample(&format!("pod-{i}"), PodStatus::Running))
                            .unwrap();
                        assert!(store.get(&format!("pod-{i}")).is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 8);
    }

    #[test]
    fn journal_write_through_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        {
            let journal = Arc::new(FileJournal::open(dir.path()).unwrap());
            let store = PodRecordStore::with_journal(journal);
            store.publish(sample("boot", PodStatus::Running)).unwrap();
            store.publish(sample("gone", PodStatus::Done)).unwrap();
            store.remove("gone").unwrap();
        }

        let journal = Arc::new(FileJournal::open(dir.path()).unwrap());
        let store = PodRecordStore::with_journal(journal);
        assert!(store.is_empty());
        let restored = store.restore().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(store.get("boot").unwrap().current_status, PodStatus::Running);
        assert!(store.get("gone").is_none());
    }
}
