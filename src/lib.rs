//! librarian - keep a `SQLite` FTS5 store in sync with a tree of text documents
//!
//! The library covers the write path (scan, then index), the repair path
//! (reconcile stored rows against the filesystem) and the read path
//! (ranked queries projected onto caller-chosen fields).
//!
//! # Example
//!
//! ```rust
//! use librarian::{Config, Database, Indexer, Searcher, Synchronizer};
//!
//! let dir = tempfile::tempdir()?;
//! std::fs::write(dir.path().join("a.md"), "hello world")?;
//! std::fs::write(dir.path().join("b.md"), "goodbye world")?;
//!
//! let config = Config { db_path: dir.path().join("fts.db"), ..Config::default() };
//! let db = Database::open(&config.db_path, &config.table, &config.pragma)?;
//! db.create_if_missing(&config.schema())?;
//!
//! let stats = Indexer::new(&db, &config).index_all(dir.path())?;
//! assert_eq!(stats.files_indexed, 2);
//!
//! let rows = Searcher::new(&db).query("world", &["path", "rank"], config.limit, None)?;
//! assert_eq!(rows.len(), 2);
//!
//! let report = Synchronizer::new(&db).reconcile(false)?;
//! assert!(report.entries.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Default store filename.
pub const DB_NAME: &str = "fts.db";

/// Default FTS5 table name.
pub const TABLE_NAME: &str = "documents";

/// Default FTS5 tokenizer.
pub const DEFAULT_TOKENIZER: &str = "porter unicode61";

/// Default extension allow-list.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".md"];

/// Default exclusion substring.
pub const EXCLUDED: &str = "venv";

/// Default maximum number of query results.
pub const RESULTS_LIMIT: u32 = 5;

/// Default snippet token budget.
pub const MAX_TOKENS: u8 = 10;

pub mod cli;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod indexer;
pub mod scanner;
pub mod search;
pub mod snippet;
pub mod sync;

pub use cli::OutputFormat;
pub use config::Config;
pub use db::{Database, FieldExpr, PragmaConfig, Schema};
pub use document::{
    Document, DocumentBase, Field, FieldAttrs, InputDocument, OutputDocument, Shape, field_names,
};
pub use error::{ExitCode, LibrarianError, Result};
pub use indexer::{IndexStats, Indexer};
pub use scanner::{ScanOptions, Scanner, scan};
pub use search::{ProjectedRow, Searcher, format_results};
pub use snippet::{SnippetColumn, SnippetProperties};
pub use sync::{SyncAction, SyncEntry, SyncReport, Synchronizer};
