use thiserror::Error;

/// Centralized error types for the librarian.
///
/// All errors are explicit enum variants (no Box<dyn Error>) so callers can
/// match on the failure kind and pick an exit status.
#[derive(Error, Debug)]
pub enum LibrarianError {
    /// The FTS5 engine rejected an operation (malformed MATCH syntax included).
    /// The engine's own message is surfaced unmodified.
    #[error("database error: {source}")]
    Database {
        #[from]
        source: rusqlite::Error,
    },

    /// File system I/O operation failed
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A document could not be read from disk
    #[error("cannot read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File contains invalid UTF-8 encoding
    #[error("invalid UTF-8 in file: {path}")]
    InvalidUtf8 { path: String },

    /// File name cannot be stored as a UTF-8 path
    #[error("path is not valid UTF-8: {path}")]
    NonUtf8Path { path: String },

    /// Directory walk failed
    #[error("scan error: {source}")]
    Walk {
        #[from]
        source: ignore::Error,
    },

    /// Row arity does not match the document shape
    #[error("{shape} row has {actual} values, expected {expected}")]
    ShapeMismatch { shape: &'static str, expected: usize, actual: usize },

    /// Requested projection field is not an output field
    #[error("unknown field: {name}")]
    InvalidField { name: String },

    /// Invalid configuration value
    #[error("invalid {field}: {value} ({reason})")]
    ConfigInvalid { field: String, value: String, reason: String },

    /// Config file is not valid TOML for [`crate::config::Config`]
    #[error("config parse error: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Result type alias for librarian operations.
pub type Result<T> = std::result::Result<T, LibrarianError>;

/// Exit codes for the CLI application.
///
/// Based on BSD sysexits.h conventions for meaningful exit statuses.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Ok = 0,
    /// General software error (internal error, unexpected state)
    Software = 1,
    /// Invalid input data (malformed query, unknown field, bad config)
    DataErr = 2,
    /// I/O error (file not found, unreadable document)
    IoErr = 3,
    /// No input provided (missing or unresolvable path)
    NoInput = 4,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code as u8)
    }
}

impl From<&LibrarianError> for ExitCode {
    fn from(error: &LibrarianError) -> Self {
        match error {
            LibrarianError::Io { .. }
            | LibrarianError::Read { .. }
            | LibrarianError::InvalidUtf8 { .. }
            | LibrarianError::NonUtf8Path { .. }
            | LibrarianError::Walk { .. } => Self::IoErr,
            LibrarianError::Database { .. }
            | LibrarianError::InvalidField { .. }
            | LibrarianError::ConfigInvalid { .. }
            | LibrarianError::ConfigParse { .. } => Self::DataErr,
            LibrarianError::ShapeMismatch { .. } | LibrarianError::Json { .. } => Self::Software,
        }
    }
}
