//! Database clients that replay statements.
//!
//! The orchestrator depends only on [`DatabaseClient`]: one statement in, one
//! classified [`StatementOutcome`] out. A client that can no longer be used at
//! all returns [`MigrateError::ConnectionFatal`] instead.

mod hdbsql;
mod postgres;

pub use hdbsql::{classify_output, locate_hdbsql, HdbsqlClient};
pub use postgres::{classify_sqlstate, PostgresClient, SqlStateClass};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{ClientConfig, ClientKind};
use crate::error::{MigrateError, Result};

/// Classification of one statement's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    /// Unique constraint violation: the row is already present.
    DuplicateKey,
    Timeout,
    Error,
}

/// Outcome of one statement plus the client's captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementOutcome {
    pub kind: OutcomeKind,
    pub stdout: String,
    pub stderr: String,
}

impl StatementOutcome {
    pub fn new(kind: OutcomeKind, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            kind,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(stdout: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Success, stdout, "")
    }

    pub fn duplicate(stderr: impl Into<String>) -> Self {
        Self::new(OutcomeKind::DuplicateKey, "", stderr)
    }

    pub fn error(stderr: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Error, "", stderr)
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            OutcomeKind::Timeout,
            "",
            format!("statement timed out after {}s", after.as_secs()),
        )
    }

    /// Whether the row is in the target after this outcome.
    pub fn is_applied(&self) -> bool {
        matches!(self.kind, OutcomeKind::Success | OutcomeKind::DuplicateKey)
    }
}

/// A client able to execute one statement at a time.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Short description for logs (never includes credentials).
    fn describe(&self) -> String;

    /// Execute one statement.
    async fn execute(&self, statement: &str) -> Result<StatementOutcome>;

    /// Verify the database is reachable with the configured credentials.
    async fn health_check(&self) -> Result<()>;
}

/// Build the client selected by the configuration.
pub async fn connect(config: &ClientConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.kind {
        ClientKind::Hdbsql => Ok(Box::new(HdbsqlClient::new(config)?)),
        ClientKind::Postgres => Ok(Box::new(PostgresClient::connect(config).await?)),
    }
}

/// Lower-cased fragment that marks a HANA duplicate-key failure.
pub(crate) const HANA_DUPLICATE: &str = "unique constraint violated";

pub(crate) fn fatal(message: impl Into<String>) -> MigrateError {
    MigrateError::ConnectionFatal(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_applied_outcomes() {
        assert!(StatementOutcome::success("1 row affected").is_applied());
        assert!(StatementOutcome::duplicate("unique constraint violated").is_applied());
        assert!(!StatementOutcome::error("syntax error").is_applied());
        let t = StatementOutcome::timeout(Duration::from_secs(30));
        assert!(!t.is_applied());
        assert_eq!(t.stderr, "statement timed out after 30s");
    }

    #[test]
    fn test_outcome_kind_serializes_snake_case() {
        let json = serde_json::to_string(&OutcomeKind::DuplicateKey).unwrap();
        assert_eq!(json, "\"duplicate_key\"");
    }
}
