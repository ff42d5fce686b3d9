//! Document model: the write-time (input) and read-time (output) shapes.
//!
//! Both shapes share a [`DocumentBase`] of file metadata. The input shape adds
//! the indexed `content`; the output shape adds the store's `rowid` plus the
//! engine-derived `rank` and `snippet`.
//!
//! Field metadata lives in a static attribute table ([`Field::attrs`]) that
//! drives schema generation (`unindexed`) and the default projection
//! (`displayed`).

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use std::fmt;
use std::fs::{self, Metadata};
use std::path::Path;
use std::str::FromStr;
use std::time::SystemTime;

use crate::error::{LibrarianError, Result};

/// Every field identifier known to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Rowid,
    Path,
    Content,
    Extension,
    Size,
    Created,
    Modified,
    Hash,
    Rank,
    Snippet,
}

/// Capability flags attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAttrs {
    /// Stored but excluded from full-text matching.
    pub unindexed: bool,
    /// Part of the default output projection.
    pub displayed: bool,
}

impl FieldAttrs {
    const fn new(unindexed: bool, displayed: bool) -> Self {
        Self { unindexed, displayed }
    }
}

const INPUT_FIELDS: [Field; 7] = [
    Field::Path,
    Field::Content,
    Field::Extension,
    Field::Size,
    Field::Created,
    Field::Modified,
    Field::Hash,
];

const OUTPUT_FIELDS: [Field; 9] = [
    Field::Rowid,
    Field::Path,
    Field::Extension,
    Field::Size,
    Field::Created,
    Field::Modified,
    Field::Hash,
    Field::Rank,
    Field::Snippet,
];

impl Field {
    /// Identifier used in the store schema and on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rowid => "rowid",
            Self::Path => "path",
            Self::Content => "content",
            Self::Extension => "extension",
            Self::Size => "size",
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Hash => "hash",
            Self::Rank => "rank",
            Self::Snippet => "snippet",
        }
    }

    /// Static attribute table.
    #[must_use]
    pub const fn attrs(self) -> FieldAttrs {
        match self {
            Self::Path => FieldAttrs::new(false, true),
            Self::Content => FieldAttrs::new(false, false),
            Self::Extension | Self::Size | Self::Created | Self::Modified | Self::Hash => {
                FieldAttrs::new(true, false)
            }
            Self::Rowid => FieldAttrs::new(true, false),
            Self::Rank | Self::Snippet => FieldAttrs::new(true, true),
        }
    }

    /// Position of this field among the store's columns (the input shape).
    ///
    /// This is the index the engine expects as the snippet column argument.
    #[must_use]
    pub fn column_index(self) -> Option<usize> {
        INPUT_FIELDS.iter().position(|f| *f == self)
    }

    /// Parse a field that may appear in a query projection.
    ///
    /// # Errors
    /// Returns `LibrarianError::InvalidField` for unknown names and for
    /// fields that only exist in the input shape (`content`).
    pub fn parse_output(name: &str) -> Result<Self> {
        let field: Self = name.parse()?;
        if Shape::Output.contains(field) {
            Ok(field)
        } else {
            Err(LibrarianError::InvalidField { name: name.to_string() })
        }
    }
}

impl FromStr for Field {
    type Err = LibrarianError;

    fn from_str(s: &str) -> Result<Self> {
        OUTPUT_FIELDS
            .iter()
            .chain(INPUT_FIELDS.iter())
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| LibrarianError::InvalidField { name: s.to_string() })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two document shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Input,
    Output,
}

impl Shape {
    /// Fields of this shape in declaration order.
    #[must_use]
    pub const fn fields(self) -> &'static [Field] {
        match self {
            Self::Input => &INPUT_FIELDS,
            Self::Output => &OUTPUT_FIELDS,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }

    #[must_use]
    pub fn contains(self, field: Field) -> bool {
        self.fields().contains(&field)
    }

    /// Fields tagged `displayed`, in declaration order.
    #[must_use]
    pub fn displayed(self) -> Vec<Field> {
        self.fields().iter().copied().filter(|f| f.attrs().displayed).collect()
    }

    fn check_arity(self, row: &[Value]) -> Result<()> {
        let expected = self.fields().len();
        if row.len() == expected {
            Ok(())
        } else {
            Err(LibrarianError::ShapeMismatch { shape: self.name(), expected, actual: row.len() })
        }
    }
}

/// Ordered field identifiers of a shape.
#[must_use]
pub fn field_names(shape: Shape) -> Vec<&'static str> {
    shape.fields().iter().map(|f| f.name()).collect()
}

/// File metadata shared by both shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentBase {
    pub path: String,
    pub extension: String,
    pub size: i64,
    pub created: String,
    pub modified: String,
    pub hash: String,
}

/// Write-time shape: one per file per indexing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDocument {
    pub base: DocumentBase,
    pub content: String,
}

/// Read-time shape of a stored row.
///
/// `rank` and `snippet` are only produced by full-text queries; rows read
/// outside a MATCH carry `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDocument {
    pub rowid: i64,
    pub base: DocumentBase,
    pub rank: Option<f64>,
    pub snippet: Option<String>,
}

/// A document in either shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Input(InputDocument),
    Output(OutputDocument),
}

impl Document {
    #[must_use]
    pub const fn shape(&self) -> Shape {
        match self {
            Self::Input(_) => Shape::Input,
            Self::Output(_) => Shape::Output,
        }
    }

    #[must_use]
    pub const fn base(&self) -> &DocumentBase {
        match self {
            Self::Input(doc) => &doc.base,
            Self::Output(doc) => &doc.base,
        }
    }

    /// Values in the shape's field order.
    #[must_use]
    pub fn to_row(&self) -> Vec<Value> {
        match self {
            Self::Input(doc) => doc.to_row(),
            Self::Output(doc) => doc.to_row(),
        }
    }

    /// Rebuild a document of `shape` from a store row.
    ///
    /// # Errors
    /// `ShapeMismatch` when the row arity differs from the shape's field
    /// count; `Database` when a value has an unexpected type.
    pub fn from_row(shape: Shape, row: &[Value]) -> Result<Self> {
        match shape {
            Shape::Input => InputDocument::from_row(row).map(Self::Input),
            Shape::Output => OutputDocument::from_row(row).map(Self::Output),
        }
    }
}

impl DocumentBase {
    fn value(&self, field: Field) -> Option<Value> {
        let value = match field {
            Field::Path => Value::Text(self.path.clone()),
            Field::Extension => Value::Text(self.extension.clone()),
            Field::Size => Value::Integer(self.size),
            Field::Created => Value::Text(self.created.clone()),
            Field::Modified => Value::Text(self.modified.clone()),
            Field::Hash => Value::Text(self.hash.clone()),
            Field::Rowid | Field::Content | Field::Rank | Field::Snippet => return None,
        };
        Some(value)
    }
}

impl InputDocument {
    /// Build a document from a file on disk: read, stat, hash.
    ///
    /// `path` is stored as given; callers canonicalize it first.
    ///
    /// # Errors
    /// `NonUtf8Path` if the path has no exact string form, `Read` if the file
    /// cannot be read, `InvalidUtf8` if it is not text, `Io` if its metadata
    /// is unavailable.
    pub fn from_file(path: &Path) -> Result<Self> {
        let key = path_key(path)?;
        let bytes = read_bytes(path)?;
        let hash = content_hash(&bytes);
        let content = decode_text(path, bytes)?;
        let metadata = fs::metadata(path)?;

        let extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        Ok(Self {
            base: DocumentBase {
                path: key,
                extension,
                size: checked_size(metadata.len())?,
                created: created_timestamp(&metadata)?,
                modified: modified_timestamp(&metadata)?,
                hash,
            },
            content,
        })
    }

    /// Value of an input-shape field.
    #[must_use]
    pub fn value(&self, field: Field) -> Option<Value> {
        match field {
            Field::Content => Some(Value::Text(self.content.clone())),
            _ => self.base.value(field),
        }
    }

    /// Positional values matching [`Shape::Input`] order, for store insertion.
    #[must_use]
    pub fn to_row(&self) -> Vec<Value> {
        INPUT_FIELDS.iter().filter_map(|f| self.value(*f)).collect()
    }

    /// # Errors
    /// See [`Document::from_row`].
    pub fn from_row(row: &[Value]) -> Result<Self> {
        Shape::Input.check_arity(row)?;
        Ok(Self {
            base: DocumentBase {
                path: text(row, 0)?,
                extension: text(row, 2)?,
                size: integer(row, 3)?,
                created: text(row, 4)?,
                modified: text(row, 5)?,
                hash: text(row, 6)?,
            },
            content: text(row, 1)?,
        })
    }
}

impl OutputDocument {
    /// Value of an output-shape field; engine-only fields may be NULL.
    #[must_use]
    pub fn value(&self, field: Field) -> Option<Value> {
        match field {
            Field::Rowid => Some(Value::Integer(self.rowid)),
            Field::Rank => Some(self.rank.map_or(Value::Null, Value::Real)),
            Field::Snippet => Some(self.snippet.clone().map_or(Value::Null, Value::Text)),
            _ => self.base.value(field),
        }
    }

    #[must_use]
    pub fn to_row(&self) -> Vec<Value> {
        OUTPUT_FIELDS.iter().filter_map(|f| self.value(*f)).collect()
    }

    /// # Errors
    /// See [`Document::from_row`].
    pub fn from_row(row: &[Value]) -> Result<Self> {
        Shape::Output.check_arity(row)?;
        Ok(Self {
            rowid: integer(row, 0)?,
            base: DocumentBase {
                path: text(row, 1)?,
                extension: text(row, 2)?,
                size: integer(row, 3)?,
                created: text(row, 4)?,
                modified: text(row, 5)?,
                hash: text(row, 6)?,
            },
            rank: optional_real(row, 7)?,
            snippet: optional_text(row, 8)?,
        })
    }
}

fn type_error(row: &[Value], idx: usize, expected: Type) -> LibrarianError {
    let actual = row[idx].data_type();
    LibrarianError::Database {
        source: rusqlite::Error::InvalidColumnType(idx, format!("expected {expected}"), actual),
    }
}

fn text(row: &[Value], idx: usize) -> Result<String> {
    match &row[idx] {
        Value::Text(s) => Ok(s.clone()),
        _ => Err(type_error(row, idx, Type::Text)),
    }
}

fn optional_text(row: &[Value], idx: usize) -> Result<Option<String>> {
    match &row[idx] {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s.clone())),
        _ => Err(type_error(row, idx, Type::Text)),
    }
}

fn integer(row: &[Value], idx: usize) -> Result<i64> {
    match &row[idx] {
        Value::Integer(i) => Ok(*i),
        _ => Err(type_error(row, idx, Type::Integer)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn optional_real(row: &[Value], idx: usize) -> Result<Option<f64>> {
    match &row[idx] {
        Value::Null => Ok(None),
        Value::Real(r) => Ok(Some(*r)),
        Value::Integer(i) => Ok(Some(*i as f64)),
        _ => Err(type_error(row, idx, Type::Real)),
    }
}

/// Fast non-cryptographic checksum of raw file bytes (wyhash, 16 hex chars).
///
/// Only a tie-breaker behind the timestamp check, so collisions are tolerated.
#[inline]
#[must_use]
pub fn content_hash(content: &[u8]) -> String {
    let hash = wyhash::wyhash(content, 0);
    format!("{hash:016x}")
}

/// Exact string form of `path`, as stored in the `path` field.
///
/// # Errors
/// Returns `LibrarianError::NonUtf8Path` when a lossy conversion would be
/// needed, since a lossy path no longer names the file.
pub fn path_key(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| LibrarianError::NonUtf8Path { path: path.display().to_string() })
}

/// Normalize a timestamp to ISO-8601 UTC.
///
/// Indexing and reconciliation both go through here: the stored `modified`
/// string is compared verbatim against a fresh one.
#[must_use]
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Normalized modification time of a file.
///
/// # Errors
/// Returns `LibrarianError::Io` if the platform does not report mtime.
pub fn modified_timestamp(metadata: &Metadata) -> Result<String> {
    Ok(format_timestamp(metadata.modified()?))
}

fn created_timestamp(metadata: &Metadata) -> Result<String> {
    match metadata.created() {
        Ok(created) => Ok(format_timestamp(created)),
        // No birth time on this filesystem
        Err(_) => modified_timestamp(metadata),
    }
}

/// Read raw bytes of a document.
///
/// # Errors
/// Returns `LibrarianError::Read` carrying the path.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| LibrarianError::Read {
        path: path.to_string_lossy().to_string(),
        source,
    })
}

/// Decode document bytes as UTF-8 text.
///
/// # Errors
/// Returns `LibrarianError::InvalidUtf8` carrying the path.
pub fn decode_text(path: &Path, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|_| LibrarianError::InvalidUtf8 { path: path.to_string_lossy().to_string() })
}

pub(crate) fn checked_size(len: u64) -> Result<i64> {
    i64::try_from(len).map_err(|_| LibrarianError::Io {
        source: std::io::Error::other(format!("file size out of range: {len}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::tempdir;

    fn sample_base() -> DocumentBase {
        DocumentBase {
            path: "/notes/a.md".to_string(),
            extension: ".md".to_string(),
            size: 11,
            created: "2024-01-01T00:00:00.000000Z".to_string(),
            modified: "2024-01-02T00:00:00.000000Z".to_string(),
            hash: content_hash(b"hello world"),
        }
    }

    #[test]
    fn test_field_names_declaration_order() {
        assert_eq!(
            field_names(Shape::Input),
            vec!["path", "content", "extension", "size", "created", "modified", "hash"]
        );
        assert_eq!(
            field_names(Shape::Output),
            vec![
                "rowid",
                "path",
                "extension",
                "size",
                "created",
                "modified",
                "hash",
                "rank",
                "snippet"
            ]
        );
    }

    #[test]
    fn test_attribute_table() {
        assert!(!Field::Path.attrs().unindexed);
        assert!(!Field::Content.attrs().unindexed);
        for field in [Field::Extension, Field::Size, Field::Created, Field::Modified, Field::Hash] {
            assert!(field.attrs().unindexed, "{field} should be unindexed");
        }
        assert_eq!(Shape::Output.displayed(), vec![Field::Path, Field::Rank, Field::Snippet]);
    }

    #[test]
    fn test_column_index() {
        assert_eq!(Field::Path.column_index(), Some(0));
        assert_eq!(Field::Content.column_index(), Some(1));
        assert_eq!(Field::Rank.column_index(), None);
    }

    #[test]
    fn test_parse_output_rejects_content_and_unknown() {
        assert_eq!(Field::parse_output("snippet").unwrap(), Field::Snippet);
        assert!(matches!(
            Field::parse_output("content"),
            Err(LibrarianError::InvalidField { name }) if name == "content"
        ));
        assert!(matches!(Field::parse_output("Path"), Err(LibrarianError::InvalidField { .. })));
    }

    #[test]
    fn test_input_row_matches_field_order() {
        let doc = InputDocument { base: sample_base(), content: "hello world".to_string() };
        let row = doc.to_row();
        assert_eq!(row.len(), Shape::Input.fields().len());
        assert_eq!(row[0], Value::Text("/notes/a.md".to_string()));
        assert_eq!(row[1], Value::Text("hello world".to_string()));
        assert_eq!(row[3], Value::Integer(11));

        let back = InputDocument::from_row(&row).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_output_row_with_null_rank_and_snippet() {
        let mut row = vec![Value::Integer(4)];
        row.extend(
            [Field::Path, Field::Extension, Field::Size, Field::Created, Field::Modified, Field::Hash]
                .iter()
                .filter_map(|f| sample_base().value(*f)),
        );
        row.push(Value::Null);
        row.push(Value::Null);

        let doc = Document::from_row(Shape::Output, &row).unwrap();
        let Document::Output(out) = doc else { panic!("expected output document") };
        assert_eq!(out.rowid, 4);
        assert!(out.rank.is_none());
        assert!(out.snippet.is_none());
        assert_eq!(out.value(Field::Rank), Some(Value::Null));
    }

    #[test]
    fn test_from_row_shape_mismatch() {
        let row = vec![Value::Text("only".to_string())];
        let result = Document::from_row(Shape::Input, &row);
        assert!(matches!(
            result,
            Err(LibrarianError::ShapeMismatch { shape: "input", expected: 7, actual: 1 })
        ));
    }

    #[test]
    fn test_from_row_wrong_type() {
        let doc = InputDocument { base: sample_base(), content: "x".to_string() };
        let mut row = doc.to_row();
        row[3] = Value::Text("eleven".to_string());
        assert!(matches!(InputDocument::from_row(&row), Err(LibrarianError::Database { .. })));
    }

    #[test]
    fn test_format_timestamp_is_utc_iso8601() {
        let t = UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_456_789);
        assert_eq!(format_timestamp(t), "2023-11-14T22:13:20.123456789Z");
    }

    #[test]
    fn test_format_timestamp_keeps_sub_microsecond_changes() {
        let t = UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_456_000);
        let later = t + Duration::from_nanos(300);
        assert_ne!(format_timestamp(t), format_timestamp(later));
    }

    #[test]
    fn test_content_hash_stable_hex() {
        let hash = content_hash(b"hello");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, content_hash(b"hello"));
        assert_ne!(hash, content_hash(b"hello!"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "hello world").unwrap();

        let doc = InputDocument::from_file(&path).unwrap();
        assert_eq!(doc.content, "hello world");
        assert_eq!(doc.base.extension, ".md");
        assert_eq!(doc.base.size, 11);
        assert_eq!(doc.base.hash, content_hash(b"hello world"));
        assert_eq!(doc.base.modified, modified_timestamp(&fs::metadata(&path).unwrap()).unwrap());
    }

    #[test]
    fn test_from_file_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bin.md");
        fs::write(&path, [0x80, 0x81, 0xff]).unwrap();

        assert!(matches!(
            InputDocument::from_file(&path),
            Err(LibrarianError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempdir().unwrap();
        let result = InputDocument::from_file(&dir.path().join("nope.md"));
        assert!(matches!(result, Err(LibrarianError::Read { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_from_file_rejects_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join(OsStr::from_bytes(b"caf\xe9.md"));
        if fs::write(&path, "hello world").is_err() {
            return;
        }

        assert!(matches!(
            InputDocument::from_file(&path),
            Err(LibrarianError::NonUtf8Path { .. })
        ));
    }
}
