//! Snippet template parameters.
//!
//! The engine's `snippet()` function takes five positional arguments after
//! the table name: column index, before-phrase, after-phrase, ellipsis and
//! token budget. [`SnippetProperties`] only exposes a positional constructor
//! and hands its values out in exactly that order.

use rusqlite::types::Value;
use std::fmt;
use std::str::FromStr;

use crate::MAX_TOKENS;
use crate::document::{Field, Shape};
use crate::error::{LibrarianError, Result};

/// Largest token budget the engine accepts.
pub const MAX_SNIPPET_TOKENS: u8 = 64;

/// Which column to excerpt from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnippetColumn {
    /// Engine picks the best-matching column.
    #[default]
    Auto,
    /// A specific stored column.
    Column(Field),
}

impl SnippetColumn {
    /// Column argument as the engine expects it (`-1` for auto).
    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::Auto => -1,
            Self::Column(field) => field.column_index().map_or(-1, |i| i as i64),
        }
    }
}

impl FromStr for SnippetColumn {
    type Err = LibrarianError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "auto" {
            return Ok(Self::Auto);
        }
        let field: Field = s.parse()?;
        if Shape::Input.contains(field) {
            Ok(Self::Column(field))
        } else {
            Err(LibrarianError::ConfigInvalid {
                field: "snippet column".to_string(),
                value: s.to_string(),
                reason: "must be 'auto' or a stored column".to_string(),
            })
        }
    }
}

impl fmt::Display for SnippetColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Column(field) => field.fmt(f),
        }
    }
}

/// Fixed-order snippet template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetProperties {
    column: SnippetColumn,
    before: String,
    after: String,
    ellipsis: String,
    max_tokens: u8,
}

impl Default for SnippetProperties {
    fn default() -> Self {
        Self {
            column: SnippetColumn::Auto,
            before: String::new(),
            after: String::new(),
            ellipsis: String::new(),
            max_tokens: MAX_TOKENS,
        }
    }
}

impl SnippetProperties {
    /// Build a template from its five positional parts.
    ///
    /// # Errors
    /// Returns `LibrarianError::ConfigInvalid` if `max_tokens` is outside
    /// `1..=64` or `column` names a field that is not stored.
    pub fn new(
        column: SnippetColumn,
        before: impl Into<String>,
        after: impl Into<String>,
        ellipsis: impl Into<String>,
        max_tokens: u8,
    ) -> Result<Self> {
        if !(1..=MAX_SNIPPET_TOKENS).contains(&max_tokens) {
            return Err(LibrarianError::ConfigInvalid {
                field: "max_tokens".to_string(),
                value: max_tokens.to_string(),
                reason: format!("must be between 1 and {MAX_SNIPPET_TOKENS}"),
            });
        }
        if let SnippetColumn::Column(field) = column {
            if !Shape::Input.contains(field) {
                return Err(LibrarianError::ConfigInvalid {
                    field: "snippet column".to_string(),
                    value: field.to_string(),
                    reason: "must be a stored column".to_string(),
                });
            }
        }
        Ok(Self {
            column,
            before: before.into(),
            after: after.into(),
            ellipsis: ellipsis.into(),
            max_tokens,
        })
    }

    #[must_use]
    pub const fn column(&self) -> SnippetColumn {
        self.column
    }

    #[must_use]
    pub fn before(&self) -> &str {
        &self.before
    }

    #[must_use]
    pub fn after(&self) -> &str {
        &self.after
    }

    #[must_use]
    pub fn ellipsis(&self) -> &str {
        &self.ellipsis
    }

    #[must_use]
    pub const fn max_tokens(&self) -> u8 {
        self.max_tokens
    }

    /// The five engine arguments, in engine order.
    #[must_use]
    pub fn params(&self) -> [Value; 5] {
        [
            Value::Integer(self.column.index()),
            Value::Text(self.before.clone()),
            Value::Text(self.after.clone()),
            Value::Text(self.ellipsis.clone()),
            Value::Integer(i64::from(self.max_tokens)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template() {
        let props = SnippetProperties::default();
        assert_eq!(
            props.params(),
            [
                Value::Integer(-1),
                Value::Text(String::new()),
                Value::Text(String::new()),
                Value::Text(String::new()),
                Value::Integer(10),
            ]
        );
    }

    #[test]
    fn test_params_are_positional() {
        let props =
            SnippetProperties::new(SnippetColumn::Column(Field::Content), "[", "]", "…", 16)
                .unwrap();
        let params = props.params();
        assert_eq!(params[0], Value::Integer(1));
        assert_eq!(params[1], Value::Text("[".to_string()));
        assert_eq!(params[2], Value::Text("]".to_string()));
        assert_eq!(params[3], Value::Text("…".to_string()));
        assert_eq!(params[4], Value::Integer(16));
    }

    #[test]
    fn test_max_tokens_bounds() {
        assert!(SnippetProperties::new(SnippetColumn::Auto, "", "", "", 0).is_err());
        assert!(SnippetProperties::new(SnippetColumn::Auto, "", "", "", 65).is_err());
        assert!(SnippetProperties::new(SnippetColumn::Auto, "", "", "", 64).is_ok());
    }

    #[test]
    fn test_column_must_be_stored() {
        let result = SnippetProperties::new(SnippetColumn::Column(Field::Rank), "", "", "", 10);
        assert!(matches!(result, Err(LibrarianError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_column_from_str() {
        assert_eq!("auto".parse::<SnippetColumn>().unwrap(), SnippetColumn::Auto);
        assert_eq!(
            "path".parse::<SnippetColumn>().unwrap(),
            SnippetColumn::Column(Field::Path)
        );
        assert!("snippet".parse::<SnippetColumn>().is_err());
        assert!("bogus".parse::<SnippetColumn>().is_err());
    }
}
