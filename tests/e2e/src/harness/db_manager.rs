//! Test Pattern Database Manager
//!
//! Provides isolated SQLite pattern stores for testing:
//! - Temporary databases that are automatically cleaned up
//! - Reopening the same file to simulate a process restart
//! - Snapshots of the stored pattern blob

use std::path::PathBuf;
use std::sync::Arc;

use prescient_core::{PatternStore, SqliteStore, PATTERNS_KEY};
use tempfile::TempDir;

/// Manager for test pattern databases
///
/// Each test gets its own database file so runs never interfere.
///
/// # Example
///
/// ```rust,ignore
/// let mut db = TestPatternDb::new_temp();
///
/// let fetcher = Fetcher::builder(client).store(db.store()).build()?;
///
/// // Simulate a restart: same file, fresh connection
/// db.reopen();
/// ```
pub struct TestPatternDb {
    store: Arc<SqliteStore>,
    /// Temporary directory (kept alive to prevent premature deletion)
    _temp_dir: TempDir,
    db_path: PathBuf,
    snapshot: Option<String>,
}

impl TestPatternDb {
    /// Create a new pattern database in a temporary directory
    ///
    /// The database is deleted when the manager is dropped.
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test_patterns.db");
        let store = SqliteStore::new(Some(db_path.clone())).expect("Failed to create test store");

        Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
            db_path,
            snapshot: None,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// The store, ready to hand to a fetcher builder
    pub fn store(&self) -> Arc<dyn PatternStore> {
        self.store.clone()
    }

    /// The raw persisted pattern blob, if any
    pub fn raw_patterns(&self) -> Option<String> {
        self.store
            .get_item(PATTERNS_KEY)
            .expect("Failed to read patterns")
    }

    pub fn has_patterns(&self) -> bool {
        self.raw_patterns().is_some()
    }

    /// Open a fresh connection to the same file
    pub fn reopen(&mut self) {
        let store =
            SqliteStore::new(Some(self.db_path.clone())).expect("Failed to reopen test store");
        self.store = Arc::new(store);
    }

    // ========================================================================
    // SNAPSHOT/RESTORE
    // ========================================================================

    /// Remember the current pattern blob
    pub fn take_snapshot(&mut self) {
        self.snapshot = self.raw_patterns();
    }

    /// Write the remembered blob back. Returns false without a snapshot.
    pub fn restore_snapshot(&mut self) -> bool {
        match self.snapshot.take() {
            Some(raw) => {
                self.store
                    .set_item(PATTERNS_KEY, &raw)
                    .expect("Failed to restore patterns");
                true
            }
            None => false,
        }
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    // ========================================================================
    // CLEANUP
    // ========================================================================

    /// Forget stored patterns
    pub fn clear(&mut self) {
        let _ = self.store.remove_item(PATTERNS_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_database_creation() {
        let db = TestPatternDb::new_temp();
        assert!(!db.has_patterns());
        assert!(db.path().exists());
    }

    #[test]
    fn test_reopen_sees_written_data() {
        let mut db = TestPatternDb::new_temp();
        db.store().set_item(PATTERNS_KEY, r#"{"transitions":{}}"#).unwrap();

        db.reopen();
        assert_eq!(db.raw_patterns().as_deref(), Some(r#"{"transitions":{}}"#));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut db = TestPatternDb::new_temp();
        db.store().set_item(PATTERNS_KEY, "v1").unwrap();

        db.take_snapshot();
        assert!(db.has_snapshot());

        db.clear();
        assert!(!db.has_patterns());

        assert!(db.restore_snapshot());
        assert_eq!(db.raw_patterns().as_deref(), Some("v1"));
        assert!(!db.restore_snapshot());
    }
}
