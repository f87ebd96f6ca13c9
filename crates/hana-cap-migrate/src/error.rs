//! Error types for the migration library.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for configuration errors (bad YAML, missing fields).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when the database client is unusable.
pub const EXIT_CONNECTION_FATAL: u8 = 3;
/// Exit code when at least one statement-file failed.
pub const EXIT_STATEMENT_FAILURES: u8 = 4;
/// Exit code for malformed archive content.
pub const EXIT_PARSE_ERROR: u8 = 5;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code for SIGINT/SIGTERM.
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed DDL or metadata for one table.
    #[error("Parse error in {table}: {message}")]
    Parse { table: String, message: String },

    /// A data row does not line up with the table's columns.
    #[error("Encoding error in {table} (row {row}): expected {expected} fields, got {actual}")]
    Encoding {
        table: String,
        row: u64,
        expected: usize,
        actual: usize,
    },

    /// One or more statement-files failed during replay.
    #[error("{failed} statement file(s) failed: {files:?}")]
    Statement { failed: usize, files: Vec<String> },

    /// The database client cannot be used at all (unreachable, auth failure).
    #[error("Database connection failed: {0}")]
    ConnectionFatal(String),

    /// Native target driver error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Archive layout problem (missing schema directory, etc.)
    #[error("Archive error at {path}: {message}")]
    Archive { path: PathBuf, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV extract could not be read
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Parse error for a table.
    pub fn parse(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Parse {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Archive error.
    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MigrateError::Archive {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::ConnectionFatal(_) | MigrateError::Target(_) | MigrateError::Cancelled
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::ConnectionFatal(_) | MigrateError::Target(_) => EXIT_CONNECTION_FATAL,
            MigrateError::Statement { .. } => EXIT_STATEMENT_FAILURES,
            MigrateError::Parse { .. }
            | MigrateError::Encoding { .. }
            | MigrateError::Archive { .. }
            | MigrateError::Csv(_) => EXIT_PARSE_ERROR,
            MigrateError::Io(_) | MigrateError::Json(_) => EXIT_IO_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::ConnectionFatal("down".into()).exit_code(),
            EXIT_CONNECTION_FATAL
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
        assert_eq!(MigrateError::Cancelled.exit_code(), EXIT_CANCELLED);
    }

    #[test]
    fn test_only_connection_and_cancel_are_fatal() {
        assert!(MigrateError::ConnectionFatal("x".into()).is_fatal());
        assert!(MigrateError::Cancelled.is_fatal());
        assert!(!MigrateError::parse("T", "bad").is_fatal());
        assert!(!MigrateError::Statement {
            failed: 1,
            files: vec!["T.sql".into()]
        }
        .is_fatal());
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::Encoding {
            table: "ORDERS".into(),
            row: 3,
            expected: 4,
            actual: 2,
        };
        let text = err.format_detailed();
        assert!(text.starts_with("Error: Encoding error in ORDERS (row 3)"));
        assert!(text.contains("expected 4 fields, got 2"));
    }
}
