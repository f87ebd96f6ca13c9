//! Replay of statement-files against the target database.
//!
//! Files run one after another and statements within a file run in order.
//! A file succeeds only when every statement was applied (duplicate keys
//! count as applied). Completed files are recorded in the success log and
//! skipped by later runs.

mod logs;

pub use logs::{ExecutionLog, StatementRecord, ERROR_LOG, SUCCESS_LOG, TRACE_LOG};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::{DatabaseClient, OutcomeKind, StatementOutcome};
use crate::config::{Config, QuoteStyle};
use crate::data::StatementFile;
use crate::error::{MigrateError, Result};

/// Lifecycle of one statement-file within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Already succeeded in an earlier run.
    Skipped,
}

/// Per-file counters.
#[derive(Debug, Clone, Serialize)]
pub struct FileState {
    pub file: String,
    pub status: FileStatus,
    pub statements: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl FileState {
    fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            status: FileStatus::Pending,
            statements: 0,
            applied: 0,
            duplicates: 0,
            failed: 0,
            timed_out: 0,
        }
    }

    fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Success => self.applied += 1,
            OutcomeKind::DuplicateKey => {
                self.applied += 1;
                self.duplicates += 1;
            }
            OutcomeKind::Timeout => {
                self.failed += 1;
                self.timed_out += 1;
            }
            OutcomeKind::Error => self.failed += 1,
        }
    }

    fn detail(&self) -> String {
        if self.failed == 0 {
            format!(
                "{} statements ({} duplicates)",
                self.statements, self.duplicates
            )
        } else {
            format!(
                "{} of {} statements failed ({} timed out)",
                self.failed, self.statements, self.timed_out
            )
        }
    }
}

/// Which statement-files to replay.
#[derive(Debug, Clone, Default)]
pub enum FileSelection {
    /// Every `*.sql` file in the statement directory, by name.
    #[default]
    All,
    /// Named files, relative to the statement directory.
    Only(Vec<String>),
}

impl FileSelection {
    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            FileSelection::All
        } else {
            FileSelection::Only(names)
        }
    }

    /// Resolve to concrete paths.
    pub fn resolve(&self, sql_dir: &Path) -> Result<Vec<PathBuf>> {
        match self {
            FileSelection::All => {
                if !sql_dir.is_dir() {
                    return Err(MigrateError::Config(format!(
                        "statement directory not found: {}",
                        sql_dir.display()
                    )));
                }
                let mut files = Vec::new();
                for entry in std::fs::read_dir(sql_dir)? {
                    let path = entry?.path();
                    if path.is_file() && path.extension().is_some_and(|e| e == "sql") {
                        files.push(path);
                    }
                }
                files.sort();
                Ok(files)
            }
            FileSelection::Only(names) => names
                .iter()
                .map(|name| {
                    let path = sql_dir.join(name);
                    if path.is_file() {
                        Ok(path)
                    } else {
                        Err(MigrateError::Config(format!(
                            "statement file not found: {}",
                            path.display()
                        )))
                    }
                })
                .collect(),
        }
    }
}

/// Settings for one replay run.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub sql_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Successfully replayed files are moved here when set.
    pub executed_dir: Option<PathBuf>,
    /// Per-statement limit; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub progress_interval: usize,
    pub quote_style: QuoteStyle,
}

impl ExecutionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sql_dir: config.sql_dir(),
            log_dir: config.log_dir(),
            executed_dir: config
                .output
                .move_executed
                .then(|| config.executed_dir()),
            timeout: config.client.timeout(),
            progress_interval: config.output.progress_interval.max(1),
            quote_style: config.encoding.quote_style,
        }
    }
}

/// Result of a replay run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed", "failed" or "cancelled".
    pub status: String,

    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    pub files_total: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub files_skipped: usize,

    /// Statements applied, duplicates included.
    pub statements_applied: usize,
    pub statements_duplicate: usize,
    pub statements_failed: usize,
    pub statements_timed_out: usize,

    pub failed_files: Vec<String>,
    pub files: Vec<FileState>,
}

impl ExecutionSummary {
    fn new(run_id: String, started_at: DateTime<Utc>, files: Vec<FileState>, cancelled: bool) -> Self {
        let completed_at = Utc::now();
        let count = |status| files.iter().filter(|f| f.status == status).count();
        let failed_files: Vec<String> = files
            .iter()
            .filter(|f| f.status == FileStatus::Failed)
            .map(|f| f.file.clone())
            .collect();
        let status = if cancelled {
            "cancelled"
        } else if failed_files.is_empty() {
            "completed"
        } else {
            "failed"
        };
        Self {
            run_id,
            status: status.to_string(),
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            started_at,
            completed_at,
            files_total: files.len(),
            files_succeeded: count(FileStatus::Succeeded),
            files_failed: failed_files.len(),
            files_skipped: count(FileStatus::Skipped),
            statements_applied: files.iter().map(|f| f.applied).sum(),
            statements_duplicate: files.iter().map(|f| f.duplicates).sum(),
            statements_failed: files.iter().map(|f| f.failed).sum(),
            statements_timed_out: files.iter().map(|f| f.timed_out).sum(),
            failed_files,
            files,
        }
    }

    /// The error the run should exit with, if any.
    pub fn error(&self) -> Option<MigrateError> {
        if self.status == "cancelled" {
            Some(MigrateError::Cancelled)
        } else if !self.failed_files.is_empty() {
            Some(MigrateError::Statement {
                failed: self.failed_files.len(),
                files: self.failed_files.clone(),
            })
        } else {
            None
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

enum FileRun {
    Finished,
    Cancelled,
}

/// Replays statement-files through a [`DatabaseClient`].
pub struct Orchestrator {
    client: Box<dyn DatabaseClient>,
    options: ExecutionOptions,
}

impl Orchestrator {
    pub fn new(client: Box<dyn DatabaseClient>, options: ExecutionOptions) -> Self {
        Self { client, options }
    }

    /// Replay the selected files.
    ///
    /// Statement failures are reported in the summary. A connection-fatal
    /// failure aborts the run and is returned as the error.
    pub async fn run(
        &self,
        selection: &FileSelection,
        cancel: CancellationToken,
    ) -> Result<ExecutionSummary> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let started = Instant::now();

        let paths = selection.resolve(&self.options.sql_dir)?;
        let mut log = ExecutionLog::open(&self.options.log_dir)?;
        let done = log.succeeded_files()?;

        info!("Starting execution run: {}", run_id);
        info!(
            "{} statement files selected, client: {}",
            paths.len(),
            self.client.describe()
        );
        log.trace(&format!(
            "run {} started: {} files via {}",
            run_id,
            paths.len(),
            self.client.describe()
        ))?;

        let mut states = Vec::with_capacity(paths.len());
        let mut cancelled = false;

        for path in &paths {
            let name = file_name(path);
            let mut state = FileState::new(&name);

            if cancelled || cancel.is_cancelled() {
                cancelled = true;
                states.push(state);
                continue;
            }

            if done.contains(&name) {
                info!("{}: already executed, skipping", name);
                log.trace(&format!("SKIP: {} - recorded in {}", name, SUCCESS_LOG))?;
                state.status = FileStatus::Skipped;
                states.push(state);
                continue;
            }

            match self.run_file(path, &mut state, &mut log, &cancel).await? {
                FileRun::Cancelled => {
                    info!("{}: cancelled after {} statements", name, state.applied + state.failed);
                    log.trace(&format!("CANCELLED: {}", name))?;
                    cancelled = true;
                }
                FileRun::Finished => {
                    if state.status == FileStatus::Succeeded {
                        if let Some(dir) = &self.options.executed_dir {
                            move_file(path, dir)?;
                        }
                    }
                }
            }
            states.push(state);
        }

        let summary = ExecutionSummary::new(run_id, started_at, states, cancelled);
        log.trace(&format!(
            "run {} {}: {} succeeded, {} failed, {} skipped",
            summary.run_id,
            summary.status,
            summary.files_succeeded,
            summary.files_failed,
            summary.files_skipped
        ))?;
        info!(
            "Execution {}: {} files succeeded, {} failed, {} skipped in {:.1}s",
            summary.status,
            summary.files_succeeded,
            summary.files_failed,
            summary.files_skipped,
            started.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    async fn run_file(
        &self,
        path: &Path,
        state: &mut FileState,
        log: &mut ExecutionLog,
        cancel: &CancellationToken,
    ) -> Result<FileRun> {
        let file = match StatementFile::load(path, self.options.quote_style) {
            Ok(file) => file,
            Err(e) => {
                warn!("{}: unreadable, skipped: {}", state.file, e);
                state.status = FileStatus::Failed;
                log.record_failure(&state.file, &format!("unreadable: {}", e))?;
                return Ok(FileRun::Finished);
            }
        };
        state.status = FileStatus::Running;
        state.statements = file.statements.len();
        info!("{}: executing {} statements", state.file, state.statements);
        log.trace(&format!("START: {} ({} statements)", state.file, state.statements))?;

        let mut records = Vec::with_capacity(file.statements.len());
        for (i, statement) in file.statements.iter().enumerate() {
            let index = i + 1;
            if cancel.is_cancelled() {
                log.write_outputs(&state.file, &records)?;
                return Ok(FileRun::Cancelled);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    log.write_outputs(&state.file, &records)?;
                    return Ok(FileRun::Cancelled);
                }
                result = self.execute(statement) => result,
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => {
                    error!("{}: statement {} aborted the run: {}", state.file, index, e);
                    state.status = FileStatus::Failed;
                    log.write_outputs(&state.file, &records)?;
                    log.record_failure(&state.file, &format!("aborted at statement {}: {}", index, e))?;
                    return Err(e);
                }
                Err(e) => StatementOutcome::error(e.to_string()),
            };

            match outcome.kind {
                OutcomeKind::Success => {}
                OutcomeKind::DuplicateKey => {
                    info!("{}: statement {} already applied (duplicate key)", state.file, index)
                }
                OutcomeKind::Timeout | OutcomeKind::Error => warn!(
                    "{}: statement {} failed: {}",
                    state.file,
                    index,
                    outcome.stderr.lines().next().unwrap_or_default()
                ),
            }
            log.trace(&format!("{} #{}: {}", state.file, index, logs::kind_label(outcome.kind)))?;
            state.record(outcome.kind);
            records.push(StatementRecord { index, outcome });

            if index % self.options.progress_interval == 0 {
                info!("{}: {}/{} statements", state.file, index, state.statements);
            }
        }

        log.write_outputs(&state.file, &records)?;
        if state.failed == 0 {
            state.status = FileStatus::Succeeded;
            info!("{}: succeeded ({})", state.file, state.detail());
            log.record_success(&state.file, &state.detail())?;
        } else {
            state.status = FileStatus::Failed;
            warn!("{}: failed ({})", state.file, state.detail());
            log.record_failure(&state.file, &state.detail())?;
        }
        Ok(FileRun::Finished)
    }

    /// One statement, bounded by the configured timeout.
    async fn execute(&self, statement: &str) -> Result<StatementOutcome> {
        match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.client.execute(statement)).await {
                Ok(result) => result,
                Err(_) => Ok(StatementOutcome::timeout(limit)),
            },
            None => self.client.execute(statement).await,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn move_file(path: &Path, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let dest = dir.join(file_name(path));
    std::fs::rename(path, &dest)?;
    info!("Moved {} to {}", path.display(), dest.display());
    Ok(())
}
