use rusqlite::types::Value;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::io::Write;

use crate::db::{Database, FieldExpr};
use crate::document::{Field, OutputDocument, Shape};
use crate::error::Result;
use crate::snippet::SnippetProperties;

pub use crate::cli::OutputFormat;

/// One result row reshaped into the caller's fields, in the caller's order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRow {
    entries: Vec<(Field, Value)>,
}

impl ProjectedRow {
    fn project(doc: &OutputDocument, fields: &[Field]) -> Self {
        let entries =
            fields.iter().map(|f| (*f, doc.value(*f).unwrap_or(Value::Null))).collect();
        Self { entries }
    }

    /// Field identifiers, possibly repeated.
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.entries.iter().map(|(f, _)| *f)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// First value for `field`, if it was requested.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<&Value> {
        self.entries.iter().find(|(f, _)| *f == field).map(|(_, v)| v)
    }
}

/// Field name to value, in requested order. Repeated fields are written
/// repeatedly.
impl Serialize for ProjectedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, value) in &self.entries {
            map.serialize_entry(field.name(), &JsonValue(value))?;
        }
        map.end()
    }
}

struct JsonValue<'a>(&'a Value);

impl Serialize for JsonValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
        }
    }
}

/// JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonOutput<'a> {
    pub results: &'a [ProjectedRow],
}

/// Resolve requested field names, falling back to the displayed fields.
///
/// # Errors
/// Returns `LibrarianError::InvalidField` for the first name that is not an
/// output field.
pub fn resolve_fields<S: AsRef<str>>(requested: &[S]) -> Result<Vec<Field>> {
    if requested.is_empty() {
        return Ok(Shape::Output.displayed());
    }
    requested.iter().map(|name| Field::parse_output(name.as_ref())).collect()
}

/// Full-text query executor with field projection.
pub struct Searcher<'a> {
    db: &'a Database,
    snippet: SnippetProperties,
}

impl<'a> Searcher<'a> {
    /// Create a searcher using the default snippet template.
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db, snippet: SnippetProperties::default() }
    }

    /// Replace the snippet template used when a call does not supply one.
    #[must_use]
    pub fn with_snippet(mut self, snippet: SnippetProperties) -> Self {
        self.snippet = snippet;
        self
    }

    /// Run `match_expr` and project each result onto `requested`.
    ///
    /// `snippet` overrides the template for this call only.
    ///
    /// # Errors
    /// - `InvalidField` if a requested name is not an output field; the store
    ///   is not touched in that case
    /// - `Database` with the engine's own message for a bad match expression
    pub fn query<S: AsRef<str>>(
        &self,
        match_expr: &str,
        requested: &[S],
        limit: u32,
        snippet: Option<&SnippetProperties>,
    ) -> Result<Vec<ProjectedRow>> {
        let fields = resolve_fields(requested)?;
        let snippet = snippet.unwrap_or(&self.snippet);

        let rows = self.db.query(match_expr, &FieldExpr::output_projection(snippet), limit)?;
        tracing::debug!(match_expr, results = rows.len(), "Query complete");

        rows.iter()
            .map(|row| OutputDocument::from_row(row).map(|doc| ProjectedRow::project(&doc, &fields)))
            .collect()
    }
}

/// Write `rows` to `output` in `format`.
///
/// # Errors
/// `Io` if writing fails, `Json` if serialization fails.
pub fn format_results<W: Write>(
    rows: &[ProjectedRow],
    format: OutputFormat,
    output: &mut W,
) -> Result<()> {
    match format {
        OutputFormat::Plain => format_plain(rows, output),
        OutputFormat::Json => format_json(rows, output),
    }
}

/// One line per row, values tab-separated.
fn format_plain<W: Write>(rows: &[ProjectedRow], output: &mut W) -> Result<()> {
    for row in rows {
        let line: Vec<String> = row.values().map(plain_value).collect();
        writeln!(output, "{}", line.join("\t"))?;
    }
    Ok(())
}

fn format_json<W: Write>(rows: &[ProjectedRow], output: &mut W) -> Result<()> {
    let json = serde_json::to_string_pretty(&JsonOutput { results: rows })?;
    writeln!(output, "{json}")?;
    Ok(())
}

fn plain_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        // Keep one row per line
        Value::Text(s) => s.replace(['\t', '\n', '\r'], " "),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibrarianError;
    use crate::snippet::SnippetColumn;
    use crate::{DEFAULT_TOKENIZER, TABLE_NAME};
    use crate::db::Schema;

    fn create_test_db() -> Database {
        let db = Database::open_in_memory(TABLE_NAME).unwrap();
        db.create_if_missing(&Schema::for_documents(TABLE_NAME, DEFAULT_TOKENIZER)).unwrap();
        for (path, content) in [("/a.md", "hello world"), ("/b.md", "goodbye world")] {
            db.insert(&[
                Value::Text(path.to_string()),
                Value::Text(content.to_string()),
                Value::Text(".md".to_string()),
                Value::Integer(content.len() as i64),
                Value::Text("2024-01-01T00:00:00.000000Z".to_string()),
                Value::Text("2024-01-01T00:00:00.000000Z".to_string()),
                Value::Text("0000000000000000".to_string()),
            ])
            .unwrap();
        }
        db
    }

    #[test]
    fn test_requested_order_and_duplicates() {
        let db = create_test_db();
        let rows =
            Searcher::new(&db).query("world", &["size", "path", "size", "rowid"], 5, None).unwrap();

        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(
                row.fields().collect::<Vec<_>>(),
                vec![Field::Size, Field::Path, Field::Size, Field::Rowid]
            );
        }
    }

    #[test]
    fn test_empty_request_uses_displayed_fields() {
        let db = create_test_db();
        let rows = Searcher::new(&db).query::<&str>("hello", &[], 5, None).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields().collect::<Vec<_>>(), vec![Field::Path, Field::Rank, Field::Snippet]);
        assert_eq!(rows[0].get(Field::Path), Some(&Value::Text("/a.md".to_string())));
        assert!(matches!(rows[0].get(Field::Rank), Some(Value::Real(_))));
    }

    #[test]
    fn test_invalid_field_rejected_before_store_call() {
        // No table: any store call would fail with a database error.
        let db = Database::open_in_memory(TABLE_NAME).unwrap();
        let result = Searcher::new(&db).query("hello", &["path", "content"], 5, None);
        assert!(matches!(result, Err(LibrarianError::InvalidField { name }) if name == "content"));

        let result = Searcher::new(&db).query("hello", &["nope"], 5, None);
        assert!(matches!(result, Err(LibrarianError::InvalidField { .. })));
    }

    #[test]
    fn test_match_syntax_error_is_store_error() {
        let db = create_test_db();
        let result = Searcher::new(&db).query("AND AND", &["path"], 5, None);
        assert!(matches!(result, Err(LibrarianError::Database { .. })));
    }

    #[test]
    fn test_limit_bounds_results() {
        let db = create_test_db();
        let rows = Searcher::new(&db).query("world", &["path"], 1, None).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_snippet_override_is_per_call() {
        let db = create_test_db();
        let searcher = Searcher::new(&db);
        let props =
            SnippetProperties::new(SnippetColumn::Column(Field::Content), "[", "]", "...", 8)
                .unwrap();

        let rows = searcher.query("hello", &["snippet"], 5, Some(&props)).unwrap();
        assert_eq!(rows[0].get(Field::Snippet), Some(&Value::Text("[hello] world".to_string())));

        let rows = searcher.query("hello", &["snippet"], 5, None).unwrap();
        assert_eq!(rows[0].get(Field::Snippet), Some(&Value::Text("hello world".to_string())));
    }

    #[test]
    fn test_resolve_fields() {
        assert_eq!(resolve_fields(&["hash"]).unwrap(), vec![Field::Hash]);
        assert_eq!(resolve_fields::<String>(&[]).unwrap().len(), 3);
    }

    #[test]
    fn test_plain_output() {
        let db = create_test_db();
        let rows = Searcher::new(&db).query("hello", &["path", "extension", "size"], 5, None).unwrap();

        let mut output = Vec::new();
        format_results(&rows, OutputFormat::Plain, &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "/a.md\t.md\t11\n");
    }

    #[test]
    fn test_json_output_keeps_requested_order() {
        let db = create_test_db();
        let rows = Searcher::new(&db).query("hello", &["size", "path"], 5, None).unwrap();

        let mut output = Vec::new();
        format_results(&rows, OutputFormat::Json, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();

        let size_at = text.find("\"size\"").unwrap();
        let path_at = text.find("\"path\"").unwrap();
        assert!(size_at < path_at);

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["results"][0]["path"], "/a.md");
        assert_eq!(parsed["results"][0]["size"], 11);
    }

    #[test]
    fn test_plain_value_flattens_newlines() {
        assert_eq!(plain_value(&Value::Text("a\tb\nc".to_string())), "a b c");
        assert_eq!(plain_value(&Value::Null), "");
    }
}
