use rusqlite::ToSql;
use rusqlite::types::Value;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::document::{Field, Shape};
use crate::error::{LibrarianError, Result};
use crate::snippet::SnippetProperties;

/// Database configuration for PRAGMA settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PragmaConfig {
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i64,
    pub temp_store: String,
    pub busy_timeout_ms: i64,
}

impl Default for PragmaConfig {
    fn default() -> Self {
        Self {
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: -32000, // -32000 KB = 32MB
            temp_store: "MEMORY".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

/// `application_id` stamped on every store file.
pub const APPLICATION_ID: u32 = 0x4C1B_7A55;

/// Identity fields fixed at insert time.
const IMMUTABLE_FIELDS: [Field; 3] = [Field::Path, Field::Extension, Field::Created];

/// Table layout handed to [`Database::create_if_missing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub table: String,
    /// Column name and whether it is `UNINDEXED`, in insertion order.
    pub columns: Vec<(&'static str, bool)>,
    /// FTS5 tokenizer string, passed through verbatim.
    pub tokenizer: String,
}

impl Schema {
    /// Schema derived from the input document shape.
    #[must_use]
    pub fn for_documents(table: &str, tokenizer: &str) -> Self {
        let columns =
            Shape::Input.fields().iter().map(|f| (f.name(), f.attrs().unindexed)).collect();
        Self { table: table.to_string(), columns, tokenizer: tokenizer.to_string() }
    }

    fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|(name, unindexed)| {
                if *unindexed { format!("{name} UNINDEXED") } else { (*name).to_string() }
            })
            .collect();
        format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5({}, tokenize={})",
            quote_ident(&self.table),
            columns.join(", "),
            quote_literal(&self.tokenizer)
        )
    }
}

/// One projected expression in a SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldExpr {
    /// A stored column, `rowid`, or the engine's `rank`.
    Field(Field),
    /// The engine's templated excerpt.
    Snippet(SnippetProperties),
}

impl FieldExpr {
    /// Full output projection with the given snippet template.
    #[must_use]
    pub fn output_projection(snippet: &SnippetProperties) -> Vec<Self> {
        Shape::Output
            .fields()
            .iter()
            .map(|f| match f {
                Field::Snippet => Self::Snippet(snippet.clone()),
                other => Self::Field(*other),
            })
            .collect()
    }

    /// Render as SQL, pushing bound parameters onto `params`.
    ///
    /// Outside a MATCH the engine cannot compute `rank` or `snippet`, so they
    /// render as NULL.
    fn render(&self, table: &str, in_match: bool, params: &mut Vec<Value>) -> Result<String> {
        match self {
            Self::Field(Field::Content) => {
                Err(LibrarianError::InvalidField { name: Field::Content.name().to_string() })
            }
            Self::Field(Field::Rank | Field::Snippet) if !in_match => Ok("NULL".to_string()),
            Self::Snippet(_) if !in_match => Ok("NULL".to_string()),
            Self::Field(Field::Snippet) => {
                Self::Snippet(SnippetProperties::default()).render(table, in_match, params)
            }
            Self::Field(field) => Ok(field.name().to_string()),
            Self::Snippet(props) => {
                let mut placeholders = Vec::with_capacity(5);
                for value in props.params() {
                    params.push(value);
                    placeholders.push(format!("?{}", params.len()));
                }
                Ok(format!("snippet({}, {})", quote_ident(table), placeholders.join(", ")))
            }
        }
    }
}

/// FTS5 document store.
///
/// A single FTS5 virtual table holds every document; the engine's `rowid`
/// is the stable row identity used for updates and deletes. Each statement
/// runs in autocommit mode, so every insert, update and delete is its own
/// transaction.
pub struct Database {
    conn: rusqlite::Connection,
    table: String,
}

impl Database {
    fn apply_pragma(conn: &rusqlite::Connection, name: &str, value: impl ToSql) -> Result<()> {
        conn.pragma_update(None, name, value).map_err(|e| LibrarianError::Database { source: e })
    }

    /// Open database at path, creating the file if needed.
    ///
    /// # Errors
    /// Returns `LibrarianError::ConfigInvalid` for a bad table name or
    /// negative busy timeout, `LibrarianError::Database` if the file cannot
    /// be opened or a PRAGMA fails.
    pub fn open(db_path: &Path, table: &str, config: &PragmaConfig) -> Result<Self> {
        validate_table_name(table)?;
        if config.busy_timeout_ms < 0 {
            return Err(LibrarianError::ConfigInvalid {
                field: "busy_timeout_ms".to_string(),
                value: config.busy_timeout_ms.to_string(),
                reason: "must be >= 0".to_string(),
            });
        }

        let conn = rusqlite::Connection::open(db_path)?;

        Self::apply_pragma(&conn, "journal_mode", &config.journal_mode)?;
        Self::apply_pragma(&conn, "synchronous", &config.synchronous)?;
        Self::apply_pragma(&conn, "cache_size", config.cache_size)?;
        Self::apply_pragma(&conn, "temp_store", &config.temp_store)?;
        Self::apply_pragma(&conn, "trusted_schema", "OFF")?;
        // Same bit pattern; SQLite stores the id as a signed 32-bit integer.
        Self::apply_pragma(&conn, "application_id", i32::from_ne_bytes(APPLICATION_ID.to_ne_bytes()))?;

        #[allow(clippy::cast_sign_loss)]
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);
        conn.busy_timeout(busy_timeout)?;

        tracing::debug!(path = %db_path.display(), table, "Opened store");
        Ok(Self { conn, table: table.to_string() })
    }

    /// Open an in-memory store (tests and benchmarks).
    ///
    /// # Errors
    /// Returns `LibrarianError::ConfigInvalid` for a bad table name.
    pub fn open_in_memory(table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Self { conn, table: table.to_string() })
    }

    /// Ensure the store exists (idempotent).
    ///
    /// # Errors
    /// Returns `LibrarianError::ConfigInvalid` if the schema names another
    /// table, `LibrarianError::Database` if the engine rejects the schema,
    /// e.g. an unknown tokenizer.
    pub fn create_if_missing(&self, schema: &Schema) -> Result<()> {
        if schema.table != self.table {
            return Err(LibrarianError::ConfigInvalid {
                field: "table".to_string(),
                value: schema.table.clone(),
                reason: format!("store handle is bound to '{}'", self.table),
            });
        }
        let sql = schema.create_sql();
        tracing::debug!(sql = %sql, "Ensuring store exists");
        self.conn.execute(&sql, [])?;
        Ok(())
    }

    /// Insert one row; values must follow [`Shape::Input`] order.
    ///
    /// Returns the new row's `rowid`.
    ///
    /// # Errors
    /// `ShapeMismatch` for a wrong arity, `Database` if the insert fails.
    pub fn insert(&self, values: &[Value]) -> Result<i64> {
        let expected = Shape::Input.fields().len();
        if values.len() != expected {
            return Err(LibrarianError::ShapeMismatch {
                shape: Shape::Input.name(),
                expected,
                actual: values.len(),
            });
        }

        let placeholders: Vec<String> = (1..=expected).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            Shape::Input.fields().iter().map(|f| f.name()).collect::<Vec<_>>().join(", "),
            placeholders.join(", ")
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(rusqlite::params_from_iter(values.iter()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Read every row, projected through `exprs`.
    ///
    /// Rows are fully materialized before returning so callers may mutate
    /// the store while iterating the result.
    ///
    /// # Errors
    /// Returns `LibrarianError::Database` if the SELECT fails.
    pub fn select_all(&self, exprs: &[FieldExpr]) -> Result<Vec<Vec<Value>>> {
        let mut params = Vec::new();
        let columns = self.render_projection(exprs, false, &mut params)?;
        let sql = format!("SELECT {columns} FROM {} ORDER BY rowid", quote_ident(&self.table));
        tracing::debug!(sql = %sql, "select_all");
        self.collect_rows(&sql, &params, exprs.len())
    }

    /// Rows whose `path` column equals `path` exactly.
    ///
    /// # Errors
    /// Returns `LibrarianError::Database` if the SELECT fails.
    pub fn rowids_for_path(&self, path: &str) -> Result<Vec<i64>> {
        let sql = format!("SELECT rowid FROM {} WHERE path = ?1", quote_ident(&self.table));
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let ids = stmt
            .query_map([path], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Set `fields` on one row. Returns whether the row existed.
    ///
    /// # Errors
    /// `InvalidField` for fields that are not stored columns or are fixed
    /// at insert time (`path`, `extension`, `created`), `Database` if the
    /// UPDATE fails.
    pub fn update(&self, rowid: i64, fields: &[(Field, Value)]) -> Result<bool> {
        if fields.is_empty() {
            return Ok(false);
        }

        let mut assignments = Vec::with_capacity(fields.len());
        let mut params: Vec<&Value> = Vec::with_capacity(fields.len() + 1);
        for (i, (field, value)) in fields.iter().enumerate() {
            if !Shape::Input.contains(*field) || IMMUTABLE_FIELDS.contains(field) {
                return Err(LibrarianError::InvalidField { name: field.name().to_string() });
            }
            assignments.push(format!("{} = ?{}", field.name(), i + 1));
            params.push(value);
        }
        let rowid_value = Value::Integer(rowid);
        params.push(&rowid_value);

        let sql = format!(
            "UPDATE {} SET {} WHERE rowid = ?{}",
            quote_ident(&self.table),
            assignments.join(", "),
            params.len()
        );
        tracing::debug!(sql = %sql, rowid, "update");
        let changed = self.conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(changed > 0)
    }

    /// Delete one row. Returns whether the row existed.
    ///
    /// # Errors
    /// Returns `LibrarianError::Database` if the DELETE fails.
    pub fn delete(&self, rowid: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE rowid = ?1", quote_ident(&self.table));
        tracing::debug!(sql = %sql, rowid, "delete");
        let changed = self.conn.execute(&sql, [rowid])?;
        Ok(changed > 0)
    }

    /// Run a full-text query, best rank first.
    ///
    /// `match_expr` is handed to the engine verbatim; syntax errors come back
    /// as the engine reports them.
    ///
    /// # Errors
    /// Returns `LibrarianError::Database` if the engine rejects the query.
    pub fn query(
        &self,
        match_expr: &str,
        exprs: &[FieldExpr],
        limit: u32,
    ) -> Result<Vec<Vec<Value>>> {
        let mut params = vec![Value::Text(match_expr.to_string())];
        let columns = self.render_projection(exprs, true, &mut params)?;
        params.push(Value::Integer(i64::from(limit)));
        let table = quote_ident(&self.table);
        let sql = format!(
            "SELECT {columns} FROM {table} WHERE {table} MATCH ?1 ORDER BY rank LIMIT ?{}",
            params.len()
        );
        tracing::debug!(sql = %sql, match_expr, limit, "query");
        self.collect_rows(&sql, &params, exprs.len())
    }

    /// Total number of stored rows.
    ///
    /// # Errors
    /// Returns `LibrarianError::Database` if the COUNT query fails.
    #[must_use = "returns count that should be used"]
    pub fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(count as usize)
    }

    /// Merge FTS5 segment b-trees after a bulk load.
    ///
    /// # Errors
    /// Returns `LibrarianError::Database` if the FTS5 optimize command fails.
    pub fn optimize(&self) -> Result<()> {
        let table = quote_ident(&self.table);
        self.conn.execute(&format!("INSERT INTO {table}({table}) VALUES('optimize')"), [])?;
        Ok(())
    }

    /// Get `application_id` pragma value.
    #[must_use]
    pub fn application_id(&self) -> Option<u32> {
        self.conn
            .query_row("PRAGMA application_id", [], |row| {
                row.get::<_, i32>(0).map(|v| u32::from_ne_bytes(v.to_ne_bytes()))
            })
            .ok()
    }

    fn render_projection(
        &self,
        exprs: &[FieldExpr],
        in_match: bool,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        let rendered = exprs
            .iter()
            .map(|e| e.render(&self.table, in_match, params))
            .collect::<Result<Vec<_>>>()?;
        Ok(rendered.join(", "))
    }

    fn collect_rows(&self, sql: &str, params: &[Value], width: usize) -> Result<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Value>(i)?);
            }
            out.push(values);
        }
        Ok(out)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
///
/// # Errors
/// Returns `LibrarianError::ConfigInvalid` for anything else.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LibrarianError::ConfigInvalid {
            field: "table".to_string(),
            value: name.to_string(),
            reason: "must match [A-Za-z_][A-Za-z0-9_]*".to_string(),
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
