use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::config::{Config, SnippetFile};
use crate::db::validate_table_name;
use crate::error::{LibrarianError, Result};
use crate::snippet::MAX_SNIPPET_TOKENS;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

/// CLI arguments for librarian.
#[derive(Parser, Debug)]
#[command(
    name = "librarian",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep a SQLite FTS5 store in sync with a tree of text documents",
    long_about = concat!("Keep a SQLite FTS5 store in sync with a tree of text documents

Index a directory of documents once, reconcile the store against the
filesystem whenever files change, and run ranked full-text queries with
a chosen set of output fields.

Version: ", env!("CARGO_PKG_VERSION"), "

SUBCOMMANDS:
  index      Load new documents under a file or directory
  sync       Reconcile stored documents with the filesystem
  match      Run a full-text query

EXIT CODES:
  0   Success
  1   Internal error
  2   Bad input (query syntax, field name, configuration)
  3   I/O error (unreadable or non-UTF-8 document, walk failure)
  4   Missing input")
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store file (default: fts.db)
    #[arg(long, env = "LIBRARIAN_DB", global = true)]
    pub db: Option<PathBuf>,

    /// FTS5 table name (default: documents)
    #[arg(long, global = true, value_parser = validate_table)]
    pub table: Option<String>,

    /// TOML config file; command-line flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// FTS5 tokenizer used when the table is created
    #[arg(long, global = true)]
    pub tokenizer: Option<String>,

    /// Log store statements and per-file decisions
    #[arg(long, global = true)]
    pub debug: bool,

    /// Suppress all log output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

/// Subcommands for librarian.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Index documents under a file or directory.
    Index {
        /// File or directory to scan
        target: PathBuf,
        /// Allowed extensions (`md` or `.md`)
        #[arg(long, num_args = 1..)]
        file_extensions: Vec<String>,
        /// Skip paths containing this substring (empty disables)
        #[arg(long)]
        exclude: Option<String>,
        /// Follow symlinks while scanning
        #[arg(long)]
        follow_symlinks: bool,
        /// Honour .gitignore files and skip hidden entries
        #[arg(long)]
        respect_gitignore: bool,
    },
    /// Reconcile stored documents with the filesystem.
    Sync {
        /// Delete rows whose file no longer exists
        #[arg(long)]
        clean: bool,
        /// Store the new mtime of touched-but-unchanged files
        #[arg(long)]
        persist_touched_mtime: bool,
    },
    /// Run a full-text query.
    Match {
        /// FTS5 match expression
        #[arg(required = true)]
        query: Vec<String>,
        /// Maximum number of results
        #[arg(long, value_parser = validate_limit)]
        limit: Option<u32>,
        /// Comma-separated output fields, in order
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        /// Snippet source column (`auto` or a stored field)
        #[arg(long)]
        snippet_column: Option<String>,
        /// Text inserted before each matched term
        #[arg(long)]
        before: Option<String>,
        /// Text inserted after each matched term
        #[arg(long)]
        after: Option<String>,
        /// Text marking a truncated excerpt
        #[arg(long)]
        ellipsis: Option<String>,
        /// Snippet length in tokens (1-64)
        #[arg(long, value_parser = validate_max_tokens)]
        max_tokens: Option<u8>,
    },
}

/// Validates the table name: must be a plain SQL identifier.
fn validate_table(s: &str) -> std::result::Result<String, String> {
    validate_table_name(s).map(|()| s.to_string()).map_err(|e| e.to_string())
}

/// Validates `limit`: must be positive.
fn validate_limit(s: &str) -> std::result::Result<u32, String> {
    let val: u32 = s.parse().map_err(|_| "invalid integer".to_string())?;

    if val == 0 {
        return Err("must be > 0".to_string());
    }

    Ok(val)
}

/// Validates `max_tokens`: must be between `1` and `64`.
fn validate_max_tokens(s: &str) -> std::result::Result<u8, String> {
    let val: u8 = s.parse().map_err(|_| "invalid integer".to_string())?;

    if !(1..=MAX_SNIPPET_TOKENS).contains(&val) {
        return Err(format!("must be between 1 and {MAX_SNIPPET_TOKENS}"));
    }

    Ok(val)
}

impl Cli {
    /// Build the effective configuration: defaults, then the config file,
    /// then command-line flags.
    ///
    /// # Errors
    /// - `ConfigInvalid` if `~` cannot be expanded or a value fails validation
    /// - `Io` / `ConfigParse` if the config file cannot be read or parsed
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(&expand_tilde(path)?)?,
            None => Config::default(),
        };

        if let Some(db) = &self.db {
            config.db_path = expand_tilde(db)?;
        }
        if let Some(table) = &self.table {
            config.table.clone_from(table);
        }
        if let Some(tokenizer) = &self.tokenizer {
            config.tokenizer.clone_from(tokenizer);
        }

        match &self.command {
            Commands::Index { file_extensions, exclude, follow_symlinks, respect_gitignore, .. } => {
                if !file_extensions.is_empty() {
                    config.set_extensions(file_extensions);
                }
                if let Some(exclude) = exclude {
                    config.set_excluded(exclude);
                }
                config.follow_symlinks |= *follow_symlinks;
                config.respect_gitignore |= *respect_gitignore;
            }
            Commands::Sync { persist_touched_mtime, .. } => {
                config.persist_touched_mtime |= *persist_touched_mtime;
            }
            Commands::Match {
                limit, snippet_column, before, after, ellipsis, max_tokens, ..
            } => {
                if let Some(limit) = limit {
                    config.limit = *limit;
                }
                let overrides = SnippetFile {
                    column: snippet_column.clone(),
                    before: before.clone(),
                    after: after.clone(),
                    ellipsis: ellipsis.clone(),
                    max_tokens: *max_tokens,
                };
                config.snippet = overrides.into_properties(&config.snippet)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Match expression as a single string.
    #[must_use]
    pub fn query_string(&self) -> Option<String> {
        match &self.command {
            Commands::Match { query, .. } => Some(query.join(" ")),
            _ => None,
        }
    }
}

/// Expand a leading `~` to the home directory.
///
/// # Errors
/// Returns `LibrarianError::ConfigInvalid` if the home directory cannot be
/// determined.
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    if let Some(stripped) = path.to_str().and_then(|s| s.strip_prefix('~')) {
        let home = dirs::home_dir().ok_or_else(|| LibrarianError::ConfigInvalid {
            field: "path".to_string(),
            value: path.to_string_lossy().to_string(),
            reason: "Could not determine home directory".to_string(),
        })?;
        if stripped.is_empty() {
            return Ok(home);
        }
        if stripped.starts_with('/') || stripped.starts_with('\\') {
            return Ok(home.join(&stripped[1..]));
        }
    }
    Ok(path.to_path_buf())
}
