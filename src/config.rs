//! Runtime configuration threaded through the core API.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! command-line overrides applied by the binary.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::{PragmaConfig, Schema, validate_table_name};
use crate::error::{LibrarianError, Result};
use crate::snippet::{SnippetColumn, SnippetProperties};
use crate::{
    DB_NAME, DEFAULT_EXTENSIONS, DEFAULT_TOKENIZER, EXCLUDED, RESULTS_LIMIT, TABLE_NAME,
};

/// Everything the scanner, indexer, synchronizer and searcher need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Store file on disk.
    pub db_path: PathBuf,
    /// FTS5 table holding the corpus.
    pub table: String,
    /// FTS5 tokenizer string.
    pub tokenizer: String,
    /// Allowed file suffixes, each with a leading dot.
    pub extensions: Vec<String>,
    /// Paths containing this substring are skipped.
    pub excluded: Option<String>,
    /// Default maximum number of query results.
    pub limit: u32,
    /// Default snippet template.
    pub snippet: SnippetProperties,
    /// Follow symlinks while scanning.
    pub follow_symlinks: bool,
    /// Honour .gitignore/.ignore files and skip hidden entries while scanning.
    pub respect_gitignore: bool,
    /// Store the new mtime of files whose content hash did not change.
    pub persist_touched_mtime: bool,
    pub pragma: PragmaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DB_NAME),
            table: TABLE_NAME.to_string(),
            tokenizer: DEFAULT_TOKENIZER.to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            excluded: Some(EXCLUDED.to_string()),
            limit: RESULTS_LIMIT,
            snippet: SnippetProperties::default(),
            follow_symlinks: false,
            respect_gitignore: false,
            persist_touched_mtime: false,
            pragma: PragmaConfig::default(),
        }
    }
}

/// On-disk form of [`Config`]; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub db: Option<PathBuf>,
    pub table: Option<String>,
    pub tokenizer: Option<String>,
    pub extensions: Option<Vec<String>>,
    pub exclude: Option<String>,
    pub limit: Option<u32>,
    pub follow_symlinks: Option<bool>,
    pub respect_gitignore: Option<bool>,
    pub persist_touched_mtime: Option<bool>,
    pub snippet: Option<SnippetFile>,
    pub pragma: Option<PragmaConfig>,
}

/// `[snippet]` table of the config file.
///
/// Keys are named here for readability; they are turned into the positional
/// [`SnippetProperties`] by [`SnippetFile::into_properties`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnippetFile {
    pub column: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub ellipsis: Option<String>,
    pub max_tokens: Option<u8>,
}

impl SnippetFile {
    /// # Errors
    /// Returns `LibrarianError::ConfigInvalid` for a bad column or budget.
    pub fn into_properties(self, base: &SnippetProperties) -> Result<SnippetProperties> {
        let column = match self.column {
            Some(name) => name.parse::<SnippetColumn>()?,
            None => base.column(),
        };
        SnippetProperties::new(
            column,
            self.before.unwrap_or_else(|| base.before().to_string()),
            self.after.unwrap_or_else(|| base.after().to_string()),
            self.ellipsis.unwrap_or_else(|| base.ellipsis().to_string()),
            self.max_tokens.unwrap_or_else(|| base.max_tokens()),
        )
    }
}

impl Config {
    /// Load a TOML config file on top of the defaults.
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `ConfigParse` if it is not valid,
    /// `ConfigInvalid` if a value fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parse TOML text on top of the defaults.
    ///
    /// # Errors
    /// See [`Config::load`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        let mut config = Self::default();
        config.apply(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values present in `file`.
    ///
    /// # Errors
    /// Returns `LibrarianError::ConfigInvalid` for a bad snippet section.
    pub fn apply(&mut self, file: ConfigFile) -> Result<()> {
        if let Some(db) = file.db {
            self.db_path = db;
        }
        if let Some(table) = file.table {
            self.table = table;
        }
        if let Some(tokenizer) = file.tokenizer {
            self.tokenizer = tokenizer;
        }
        if let Some(extensions) = file.extensions {
            self.set_extensions(&extensions);
        }
        if let Some(exclude) = file.exclude {
            self.set_excluded(&exclude);
        }
        if let Some(limit) = file.limit {
            self.limit = limit;
        }
        if let Some(follow) = file.follow_symlinks {
            self.follow_symlinks = follow;
        }
        if let Some(respect) = file.respect_gitignore {
            self.respect_gitignore = respect;
        }
        if let Some(persist) = file.persist_touched_mtime {
            self.persist_touched_mtime = persist;
        }
        if let Some(snippet) = file.snippet {
            self.snippet = snippet.into_properties(&self.snippet)?;
        }
        if let Some(pragma) = file.pragma {
            self.pragma = pragma;
        }
        Ok(())
    }

    /// Replace the extension allow-list, normalizing to a leading dot.
    pub fn set_extensions<S: AsRef<str>>(&mut self, extensions: &[S]) {
        self.extensions = extensions.iter().map(|e| normalize_extension(e.as_ref())).collect();
    }

    /// Set the exclusion substring; empty disables exclusion.
    pub fn set_excluded(&mut self, excluded: &str) {
        self.excluded = if excluded.is_empty() { None } else { Some(excluded.to_string()) };
    }

    /// Schema of the store this config points at.
    #[must_use]
    pub fn schema(&self) -> Schema {
        Schema::for_documents(&self.table, &self.tokenizer)
    }

    /// Check values that would otherwise fail deep inside a command.
    ///
    /// # Errors
    /// Returns `LibrarianError::ConfigInvalid` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.table)?;

        if self.extensions.is_empty() || self.extensions.iter().any(|e| e.len() < 2) {
            return Err(LibrarianError::ConfigInvalid {
                field: "extensions".to_string(),
                value: self.extensions.join(" "),
                reason: "need at least one non-empty extension".to_string(),
            });
        }

        if self.limit == 0 {
            return Err(LibrarianError::ConfigInvalid {
                field: "limit".to_string(),
                value: self.limit.to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        if self.tokenizer.trim().is_empty() {
            return Err(LibrarianError::ConfigInvalid {
                field: "tokenizer".to_string(),
                value: self.tokenizer.clone(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// `md` and `.md` both mean `.md`.
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim();
    if ext.starts_with('.') || ext.is_empty() { ext.to_string() } else { format!(".{ext}") }
}
