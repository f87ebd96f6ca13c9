//! The `hdbsql` command-line client, one subprocess per statement.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{fatal, DatabaseClient, OutcomeKind, StatementOutcome, HANA_DUPLICATE};
use crate::config::ClientConfig;
use crate::error::Result;

const BINARY: &str = "hdbsql";

/// Runs statements through `hdbsql`, feeding each one on stdin.
pub struct HdbsqlClient {
    binary: PathBuf,
    args: Vec<String>,
    endpoint: String,
    fatal_patterns: Vec<String>,
}

impl fmt::Debug for HdbsqlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdbsqlClient")
            .field("binary", &self.binary)
            .field("endpoint", &self.endpoint)
            .field("args", &"[REDACTED]")
            .finish()
    }
}

impl HdbsqlClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let binary = locate_hdbsql(config)?;
        Ok(Self::with_binary(binary, config))
    }

    /// Use an explicit binary. Useful with wrapper scripts.
    pub fn with_binary(binary: impl Into<PathBuf>, config: &ClientConfig) -> Self {
        let endpoint = format!("{}:{}", config.host, config.port);
        let mut args = vec![
            "-n".to_string(),
            endpoint.clone(),
            "-u".to_string(),
            config.user.clone(),
            "-p".to_string(),
            config.password.clone(),
        ];
        if !config.database.is_empty() {
            args.push("-d".to_string());
            args.push(config.database.clone());
        }
        args.push("-attemptencrypt".to_string());
        args.push("-quiet".to_string());

        Self {
            binary: binary.into(),
            args,
            endpoint,
            fatal_patterns: config
                .fatal_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    async fn run(&self, statement: &str) -> Result<(bool, String, String)> {
        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| fatal(format!("cannot start {}: {}", self.binary.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut input = statement.trim_end().trim_end_matches(';').to_string();
            input.push_str(";\n");
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                // the process may exit before reading its input; its output tells why
                debug!("hdbsql stdin closed early: {}", e);
            }
        }

        let output = child.wait_with_output().await?;
        Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}

#[async_trait]
impl DatabaseClient for HdbsqlClient {
    fn describe(&self) -> String {
        format!("hdbsql {} ({})", self.endpoint, self.binary.display())
    }

    async fn execute(&self, statement: &str) -> Result<StatementOutcome> {
        let (ok, stdout, stderr) = self.run(statement).await?;
        let kind = classify_output(ok, &stdout, &stderr, &self.fatal_patterns).map_err(fatal)?;
        Ok(StatementOutcome::new(kind, stdout, stderr))
    }

    async fn health_check(&self) -> Result<()> {
        let (ok, stdout, stderr) = self.run("SELECT 1 FROM DUMMY").await?;
        match classify_output(ok, &stdout, &stderr, &self.fatal_patterns) {
            Ok(OutcomeKind::Success) => {
                info!("Connected to HANA at {}", self.endpoint);
                Ok(())
            }
            Ok(_) => Err(fatal(format!(
                "health check failed: {}",
                first_line(&stderr, &stdout)
            ))),
            Err(message) => Err(fatal(message)),
        }
    }
}

/// Classify an `hdbsql` run. `Err` carries the message of a fatal failure.
pub fn classify_output(
    success: bool,
    stdout: &str,
    stderr: &str,
    fatal_patterns: &[String],
) -> std::result::Result<OutcomeKind, String> {
    if success {
        return Ok(OutcomeKind::Success);
    }
    // hdbsql prints SQL errors on either stream
    let text = format!("{}\n{}", stderr, stdout).to_lowercase();
    if text.contains(HANA_DUPLICATE) {
        return Ok(OutcomeKind::DuplicateKey);
    }
    if let Some(pattern) = fatal_patterns.iter().find(|p| text.contains(p.as_str())) {
        return Err(format!(
            "hdbsql reported '{}': {}",
            pattern,
            first_line(stderr, stdout)
        ));
    }
    Ok(OutcomeKind::Error)
}

fn first_line<'a>(stderr: &'a str, stdout: &'a str) -> &'a str {
    stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output")
}

/// Find the `hdbsql` binary: configured path, then `PATH`, then the client directory.
pub fn locate_hdbsql(config: &ClientConfig) -> Result<PathBuf> {
    if let Some(path) = &config.path {
        if path.is_file() {
            return Ok(path.clone());
        }
        return Err(fatal(format!("hdbsql not found at {}", path.display())));
    }

    if let Some(found) = std::env::var_os("PATH")
        .iter()
        .flat_map(std::env::split_paths)
        .map(|dir| dir.join(BINARY))
        .find(|p| p.is_file())
    {
        return Ok(found);
    }

    let bundled = config.client_dir.join(BINARY);
    if bundled.is_file() {
        return Ok(bundled);
    }

    Err(fatal(format!(
        "hdbsql not found in PATH or {}; set HANA_CLIENT_PATH",
        config.client_dir.display()
    )))
}
