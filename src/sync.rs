//! Reconcile the store against the filesystem.
//!
//! Each stored row is checked in turn:
//! 1. path gone (or no longer a regular file): delete it, or report it dangling
//! 2. mtime string unchanged: nothing to do, content is never read
//! 3. mtime changed, hash unchanged: touched
//! 4. hash changed: content, size, mtime and hash are rewritten in place
//!
//! Step 2 trusts the timestamp. A file rewritten with a preserved mtime is
//! not noticed until its mtime moves.

use rusqlite::types::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::db::{Database, FieldExpr};
use crate::document::{
    Field, OutputDocument, checked_size, content_hash, decode_text, modified_timestamp, read_bytes,
};
use crate::error::{LibrarianError, Result};
use crate::snippet::SnippetProperties;

/// What happened to one stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Content changed on disk and was rewritten.
    Updated,
    /// File vanished and the row was removed.
    Deleted,
    /// File vanished but cleaning was not requested.
    Dangling,
    /// Timestamp moved but content hash is the same.
    Touched,
}

impl SyncAction {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Dangling => "dangling",
            Self::Touched => "touched",
        }
    }
}

/// One non-trivial outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    pub rowid: i64,
    pub path: String,
    pub action: SyncAction,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Rows that needed attention, in store order.
    pub entries: Vec<SyncEntry>,
    /// Rows skipped on the timestamp fast path.
    pub unchanged: u64,
    /// Files whose bytes were actually read.
    pub content_reads: u64,
    pub duration: Duration,
}

impl SyncReport {
    /// Number of entries with `action`.
    #[must_use]
    pub fn count(&self, action: SyncAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    fn record(&mut self, doc: &OutputDocument, action: SyncAction) {
        self.entries.push(SyncEntry { rowid: doc.rowid, path: doc.base.path.clone(), action });
    }
}

/// Walks stored rows and brings them in line with the filesystem.
pub struct Synchronizer<'a> {
    db: &'a Database,
    persist_touched_mtime: bool,
}

impl<'a> Synchronizer<'a> {
    #[must_use]
    pub const fn new(db: &'a Database) -> Self {
        Self { db, persist_touched_mtime: false }
    }

    /// Also store the new `modified` of touched files, so later passes take
    /// the fast path for them.
    #[must_use]
    pub const fn persist_touched_mtime(mut self, persist: bool) -> Self {
        self.persist_touched_mtime = persist;
        self
    }

    /// Run one pass over every stored row.
    ///
    /// With `clean`, rows whose file is gone are deleted; otherwise they are
    /// reported as dangling and left alone.
    ///
    /// Each update or delete commits on its own. An error stops the pass and
    /// keeps the changes made so far.
    ///
    /// # Errors
    /// - `Database` if reading or writing the store fails
    /// - `Read` if a path cannot be stat-ed for any reason other than being gone
    /// - `Read` / `InvalidUtf8` if a changed file cannot be read as text
    pub fn reconcile(&self, clean: bool) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        // Materialized up front: rows are updated and deleted below.
        let projection = FieldExpr::output_projection(&SnippetProperties::default());
        let rows = self.db.select_all(&projection)?;
        tracing::debug!(rows = rows.len(), clean, "Reconciling");

        for row in rows {
            let doc = OutputDocument::from_row(&row)?;
            if let Some(action) = self.reconcile_one(&doc, clean, &mut report)? {
                tracing::info!(
                    path = %doc.base.path,
                    rowid = doc.rowid,
                    action = action.name(),
                    "Reconciled"
                );
                report.record(&doc, action);
            }
        }

        report.duration = start.elapsed();
        Ok(report)
    }

    fn reconcile_one(
        &self,
        doc: &OutputDocument,
        clean: bool,
        report: &mut SyncReport,
    ) -> Result<Option<SyncAction>> {
        let path = Path::new(&doc.base.path);

        let metadata = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return self.handle_missing(doc, clean).map(Some),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return self.handle_missing(doc, clean).map(Some);
            }
            // Unreachable is not gone: never delete on EACCES or EIO.
            Err(source) => {
                return Err(LibrarianError::Read { path: doc.base.path.clone(), source });
            }
        };

        let modified = modified_timestamp(&metadata)?;
        if modified == doc.base.modified {
            report.unchanged += 1;
            return Ok(None);
        }

        let bytes = read_bytes(path)?;
        report.content_reads += 1;
        let hash = content_hash(&bytes);

        if hash == doc.base.hash {
            if self.persist_touched_mtime {
                self.db.update(doc.rowid, &[(Field::Modified, Value::Text(modified))])?;
            }
            return Ok(Some(SyncAction::Touched));
        }

        let size = checked_size(bytes.len() as u64)?;
        let content = decode_text(path, bytes)?;
        self.db.update(
            doc.rowid,
            &[
                (Field::Content, Value::Text(content)),
                (Field::Size, Value::Integer(size)),
                (Field::Modified, Value::Text(modified)),
                (Field::Hash, Value::Text(hash)),
            ],
        )?;
        Ok(Some(SyncAction::Updated))
    }

    fn handle_missing(&self, doc: &OutputDocument, clean: bool) -> Result<SyncAction> {
        if clean {
            self.db.delete(doc.rowid)?;
            Ok(SyncAction::Deleted)
        } else {
            tracing::warn!(
                path = %doc.base.path,
                "Indexed file no longer exists; run with --clean to drop it"
            );
            Ok(SyncAction::Dangling)
        }
    }
}
