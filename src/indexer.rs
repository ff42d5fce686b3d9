use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use rusqlite::types::Value;

use crate::config::Config;
use crate::db::{Database, FieldExpr};
use crate::document::{Field, InputDocument, path_key};
use crate::error::Result;
use crate::scanner::{ScanOptions, Scanner};

/// Statistics from an indexing operation.
#[derive(Debug, Default)]
pub struct IndexStats {
    pub files_indexed: u64,
    /// Paths already present in the store.
    pub files_skipped: u64,
    pub bytes_indexed: u64,
    pub duration: Duration,
}

/// Loads documents from the filesystem into the store.
///
/// Every insert commits on its own, so an aborted run leaves all earlier
/// documents indexed. Paths already stored are skipped, which makes
/// re-running over the same root safe; refreshing their content is the
/// synchronizer's job.
pub struct Indexer<'a> {
    db: &'a Database,
    options: ScanOptions,
}

impl<'a> Indexer<'a> {
    #[must_use]
    pub fn new(db: &'a Database, config: &Config) -> Self {
        Self { db, options: ScanOptions::from_config(config) }
    }

    /// Scan `root` and insert every new document.
    ///
    /// # Errors
    /// Fails fast on the first error, leaving earlier inserts in place:
    /// - `Walk` if the directory walk fails
    /// - `NonUtf8Path` if a canonical path has no exact string form
    /// - `Read` / `InvalidUtf8` if a document cannot be read as text
    /// - `Database` if an insert fails
    pub fn index_all(&self, root: &Path) -> Result<IndexStats> {
        let start = Instant::now();
        let mut stats = IndexStats::default();
        let mut known = self.stored_paths()?;

        for path in Scanner::new(root, self.options.clone()) {
            let path = fs::canonicalize(path?)?;
            let key = path_key(&path)?;

            if known.contains(&key) {
                tracing::debug!(path = %key, "Already indexed");
                stats.files_skipped += 1;
                continue;
            }

            let doc = InputDocument::from_file(&path)?;
            let rowid = self.db.insert(&doc.to_row())?;
            tracing::debug!(path = %key, rowid, "Indexed");

            stats.files_indexed += 1;
            stats.bytes_indexed += u64::try_from(doc.base.size).unwrap_or_default();
            known.insert(key);
        }

        if stats.files_indexed > 0 {
            if let Err(e) = self.db.optimize() {
                tracing::warn!(error = %e, "FTS5 optimize failed");
            }
        }

        stats.duration = start.elapsed();
        Ok(stats)
    }

    fn stored_paths(&self) -> Result<HashSet<String>> {
        let rows = self.db.select_all(&[FieldExpr::Field(Field::Path)])?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| match row.pop() {
                Some(Value::Text(path)) => Some(path),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TABLE_NAME;
    use crate::db::PragmaConfig;
    use crate::error::LibrarianError;
    use tempfile::tempdir;

    fn open_db(dir: &tempfile::TempDir, config: &Config) -> Database {
        let db = Database::open(&dir.path().join("test.db"), TABLE_NAME, &PragmaConfig::default())
            .unwrap();
        db.create_if_missing(&config.schema()).unwrap();
        db
    }

    #[test]
    fn test_index_empty_dir() {
        let dir = tempdir().unwrap();
        let docs = tempdir().unwrap();
        let config = Config::default();
        let db = open_db(&dir, &config);

        let stats = Indexer::new(&db, &config).index_all(docs.path()).unwrap();
        assert_eq!(stats.files_indexed, 0);
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_index_stores_canonical_paths() {
        let dir = tempdir().unwrap();
        let docs = tempdir().unwrap();
        fs::write(docs.path().join("a.md"), "hello world").unwrap();
        let config = Config::default();
        let db = open_db(&dir, &config);

        let stats = Indexer::new(&db, &config).index_all(docs.path()).unwrap();
        assert_eq!(stats.files_indexed, 1);
        assert_eq!(stats.bytes_indexed, 11);

        let canonical = fs::canonicalize(docs.path().join("a.md")).unwrap();
        let ids = db.rowids_for_path(canonical.to_str().unwrap()).unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_reindex_skips_existing_paths() {
        let dir = tempdir().unwrap();
        let docs = tempdir().unwrap();
        fs::write(docs.path().join("a.md"), "hello").unwrap();
        fs::write(docs.path().join("b.md"), "world").unwrap();
        let config = Config::default();
        let db = open_db(&dir, &config);

        Indexer::new(&db, &config).index_all(docs.path()).unwrap();
        fs::write(docs.path().join("c.md"), "again").unwrap();
        let stats = Indexer::new(&db, &config).index_all(docs.path()).unwrap();

        assert_eq!(stats.files_indexed, 1);
        assert_eq!(stats.files_skipped, 2);
        assert_eq!(db.count().unwrap(), 3);
    }

    #[test]
    fn test_invalid_utf8_aborts_batch() {
        let dir = tempdir().unwrap();
        let docs = tempdir().unwrap();
        fs::write(docs.path().join("bad.md"), [0x80, 0x81, 0xff]).unwrap();
        let config = Config::default();
        let db = open_db(&dir, &config);

        let result = Indexer::new(&db, &config).index_all(docs.path());
        assert!(matches!(result, Err(LibrarianError::InvalidUtf8 { .. })));
    }

    #[test]
    fn test_failure_keeps_prior_documents() {
        let dir = tempdir().unwrap();
        let docs = tempdir().unwrap();
        let good = docs.path().join("good.md");
        fs::write(&good, "fine").unwrap();
        let config = Config::default();
        let db = open_db(&dir, &config);

        // Index the good file alone, then hit a bad one in the full pass.
        Indexer::new(&db, &config).index_all(&good).unwrap();
        fs::write(docs.path().join("bad.md"), [0xff, 0xfe]).unwrap();
        assert!(Indexer::new(&db, &config).index_all(docs.path()).is_err());

        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let db = open_db(&dir, &config);

        let result = Indexer::new(&db, &config).index_all(&dir.path().join("nope"));
        assert!(matches!(result, Err(LibrarianError::Walk { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_survives_clean_sync() {
        use crate::sync::{SyncAction, Synchronizer};
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let docs = tempdir().unwrap();
        fs::write(docs.path().join("plain.md"), "hello world").unwrap();
        let odd = docs.path().join(OsStr::from_bytes(b"caf\xe9.md"));
        if fs::write(&odd, "hello world").is_err() {
            return;
        }
        let config = Config::default();
        let db = open_db(&dir, &config);

        let stats = Indexer::new(&db, &config).index_all(docs.path()).unwrap();
        assert_eq!(stats.files_indexed, 1);

        let report = Synchronizer::new(&db).reconcile(true).unwrap();
        assert_eq!(report.count(SyncAction::Deleted), 0);
        assert_eq!(report.count(SyncAction::Dangling), 0);
        assert_eq!(db.count().unwrap(), 1);
        assert!(odd.exists());
    }
}
