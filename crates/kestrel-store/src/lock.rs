use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive advisory lock on a journal directory. Released on drop.
pub struct JournalLock {
    lock_file: File,
}

impl JournalLock {
    /// Take the lock, or `None` if another process holds it.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, StoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for JournalLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}
