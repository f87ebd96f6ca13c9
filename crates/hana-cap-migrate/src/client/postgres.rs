//! Native PostgreSQL client for CAP projects deployed on PostgreSQL.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tokio_postgres::{CancelToken, Config as PgConfig, NoTls};
use tracing::{info, warn};

use super::{fatal, DatabaseClient, OutcomeKind, StatementOutcome};
use crate::config::ClientConfig;
use crate::error::Result;

/// How a SQLSTATE is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStateClass {
    Duplicate,
    Timeout,
    Fatal,
    Error,
}

/// Classify a SQLSTATE code.
pub fn classify_sqlstate(code: &str) -> SqlStateClass {
    match code {
        "23505" => SqlStateClass::Duplicate,
        // query_canceled, raised when statement_timeout expires
        "57014" => SqlStateClass::Timeout,
        // connection exception, invalid authorization, operator intervention
        c if c.starts_with("08") || c.starts_with("28") || c.starts_with("57P") => {
            SqlStateClass::Fatal
        }
        _ => SqlStateClass::Error,
    }
}

/// Session option bounding every statement on the server side.
pub fn statement_timeout_option(timeout: Option<Duration>) -> Option<String> {
    timeout.map(|t| format!("-c statement_timeout={}", t.as_millis()))
}

/// Cancels the in-flight query on the server unless disarmed.
///
/// Dropping `execute` mid-statement (client-side timeout or cancellation)
/// would otherwise leave the statement running on the connection.
struct CancelOnDrop {
    token: Option<CancelToken>,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.token = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                match token.cancel_query(NoTls).await {
                    Ok(()) => info!("Cancelled abandoned statement on the server"),
                    Err(e) => warn!("Failed to cancel abandoned statement: {}", e),
                }
            });
        }
    }
}

/// Executes statements over a single pooled connection.
pub struct PostgresClient {
    pool: Pool,
    endpoint: String,
    timeout: Option<Duration>,
}

impl PostgresClient {
    /// Create the pool and verify the connection.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        if let Some(timeout) = config.timeout() {
            pg_config.connect_timeout(timeout);
        }
        if let Some(options) = statement_timeout_option(config.timeout()) {
            pg_config.options(&options);
        }

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        // statements run strictly one at a time
        let pool = Pool::builder(mgr)
            .max_size(1)
            .build()
            .map_err(|e| fatal(format!("failed to create pool: {}", e)))?;

        let client = Self {
            pool,
            endpoint: format!("{}:{}/{}", config.host, config.port, config.database),
            timeout: config.timeout(),
        };
        client.health_check().await?;
        Ok(client)
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn describe(&self) -> String {
        format!("postgres {}", self.endpoint)
    }

    async fn execute(&self, statement: &str) -> Result<StatementOutcome> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| fatal(format!("failed to get connection: {}", e)))?;

        let guard = CancelOnDrop {
            token: Some(client.cancel_token()),
        };
        let result = client.batch_execute(statement).await;
        guard.disarm();

        match result {
            Ok(()) => Ok(StatementOutcome::success("OK")),
            Err(e) => {
                let Some(db) = e.as_db_error() else {
                    return Err(fatal(format!("connection lost: {}", e)));
                };
                let code = db.code().code();
                let message = format!("{}: {}", code, db.message());
                match classify_sqlstate(code) {
                    SqlStateClass::Duplicate => Ok(StatementOutcome::duplicate(message)),
                    SqlStateClass::Timeout => Ok(match self.timeout {
                        Some(limit) => StatementOutcome::timeout(limit),
                        None => StatementOutcome::new(OutcomeKind::Timeout, "", message),
                    }),
                    SqlStateClass::Fatal => Err(fatal(message)),
                    SqlStateClass::Error => {
                        Ok(StatementOutcome::new(OutcomeKind::Error, "", message))
                    }
                }
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| fatal(format!("failed to get connection: {}", e)))?;
        client.simple_query("SELECT 1").await?;
        info!("Connected to PostgreSQL: {}", self.endpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sqlstate() {
        assert_eq!(classify_sqlstate("23505"), SqlStateClass::Duplicate);
        assert_eq!(classify_sqlstate("08006"), SqlStateClass::Fatal);
        assert_eq!(classify_sqlstate("28P01"), SqlStateClass::Fatal);
        assert_eq!(classify_sqlstate("57P01"), SqlStateClass::Fatal);
        assert_eq!(classify_sqlstate("42601"), SqlStateClass::Error);
        assert_eq!(classify_sqlstate("23502"), SqlStateClass::Error);
        assert_eq!(classify_sqlstate("57014"), SqlStateClass::Timeout);
    }

    #[test]
    fn test_statement_timeout_option() {
        assert_eq!(
            statement_timeout_option(Some(Duration::from_secs(30))).as_deref(),
            Some("-c statement_timeout=30000")
        );
        assert_eq!(statement_timeout_option(None), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_fatal() {
        let config = ClientConfig {
            host: "127.0.0.1".into(),
            port: 1,
            user: "u".into(),
            database: "d".into(),
            timeout_secs: Some(2),
            ..Default::default()
        };
        let err = PostgresClient::connect(&config).await.err().unwrap();
        assert!(err.is_fatal(), "{:?}", err);
    }
}
