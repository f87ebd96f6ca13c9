//! Execution logs: success list, error list, chronological trace and per-file
//! captured output.
//!
//! All three logs are append-only across runs. The success log doubles as the
//! persisted resume state.

use chrono::Local;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::client::{OutcomeKind, StatementOutcome};
use crate::error::Result;

pub const SUCCESS_LOG: &str = "success.log";
pub const ERROR_LOG: &str = "errors.log";
pub const TRACE_LOG: &str = "execution.log";

const SUCCESS_TAG: &str = "] SUCCESS: ";
const DETAIL_SEPARATOR: &str = " - ";

/// Captured output of one statement.
#[derive(Debug, Clone)]
pub struct StatementRecord {
    /// 1-based position in the file.
    pub index: usize,
    pub outcome: StatementOutcome,
}

/// Writer for the log directory. Single writer per run.
pub struct ExecutionLog {
    dir: PathBuf,
    trace: File,
}

impl ExecutionLog {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let trace = append(&dir.join(TRACE_LOG))?;
        Ok(Self { dir, trace })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names recorded as fully replayed by earlier runs.
    pub fn succeeded_files(&self) -> Result<HashSet<String>> {
        let path = self.dir.join(SUCCESS_LOG);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(text.lines().filter_map(parse_success_line).collect())
    }

    /// Append a line to the chronological trace.
    pub fn trace(&mut self, message: &str) -> Result<()> {
        writeln!(self.trace, "[{}] {}", timestamp(), message)?;
        Ok(())
    }

    pub fn record_success(&mut self, file: &str, detail: &str) -> Result<()> {
        self.append_line(SUCCESS_LOG, "SUCCESS", file, detail)?;
        self.trace(&format!("SUCCESS: {}{}{}", file, DETAIL_SEPARATOR, detail))
    }

    pub fn record_failure(&mut self, file: &str, detail: &str) -> Result<()> {
        self.append_line(ERROR_LOG, "ERROR", file, detail)?;
        self.trace(&format!("ERROR: {}{}{}", file, DETAIL_SEPARATOR, detail))
    }

    /// Write `<file>.out` and `<file>.err` with the captured output of this run.
    pub fn write_outputs(&self, file: &str, records: &[StatementRecord]) -> Result<()> {
        let mut out = File::create(self.dir.join(format!("{}.out", file)))?;
        let mut err = File::create(self.dir.join(format!("{}.err", file)))?;
        for record in records {
            let outcome = &record.outcome;
            if !outcome.stdout.trim().is_empty() {
                writeln!(out, "-- statement {}", record.index)?;
                writeln!(out, "{}", outcome.stdout.trim_end())?;
            }
            if outcome.kind != OutcomeKind::Success || !outcome.stderr.trim().is_empty() {
                writeln!(err, "-- statement {} ({})", record.index, kind_label(outcome.kind))?;
                writeln!(err, "{}", outcome.stderr.trim_end())?;
            }
        }
        Ok(())
    }

    fn append_line(&self, log: &str, tag: &str, file: &str, detail: &str) -> Result<()> {
        let mut f = append(&self.dir.join(log))?;
        writeln!(
            f,
            "[{}] {}: {}{}{}",
            timestamp(),
            tag,
            file,
            DETAIL_SEPARATOR,
            detail
        )?;
        Ok(())
    }
}

pub(crate) fn kind_label(kind: OutcomeKind) -> &'static str {
    match kind {
        OutcomeKind::Success => "success",
        OutcomeKind::DuplicateKey => "duplicate key, already applied",
        OutcomeKind::Timeout => "timeout",
        OutcomeKind::Error => "error",
    }
}

fn parse_success_line(line: &str) -> Option<String> {
    let (_, rest) = line.split_once(SUCCESS_TAG)?;
    let file = match rest.split_once(DETAIL_SEPARATOR) {
        Some((file, _)) => file,
        None => rest,
    };
    let file = file.trim();
    (!file.is_empty()).then(|| file.to_string())
}

fn append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_success_log_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut log = ExecutionLog::open(dir.path()).unwrap();
        log.record_success("A.sql", "10 statements").unwrap();
        log.record_failure("B.sql", "1 of 3 statements failed").unwrap();
        drop(log);

        // appended, not replaced, by a second run
        let mut log = ExecutionLog::open(dir.path()).unwrap();
        log.record_success("C.sql", "2 statements").unwrap();

        let done = log.succeeded_files().unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains("A.sql") && done.contains("C.sql"));

        let trace = std::fs::read_to_string(dir.path().join(TRACE_LOG)).unwrap();
        assert_eq!(trace.lines().count(), 3);
        let errors = std::fs::read_to_string(dir.path().join(ERROR_LOG)).unwrap();
        assert!(errors.contains("ERROR: B.sql - 1 of 3 statements failed"));
    }

    #[test]
    fn test_parse_success_line() {
        assert_eq!(
            parse_success_line("[2024-01-01 10:00:00] SUCCESS: ORDERS.sql - 5 statements").as_deref(),
            Some("ORDERS.sql")
        );
        assert_eq!(parse_success_line("random text"), None);
    }

    #[test]
    fn test_write_outputs() {
        let dir = TempDir::new().unwrap();
        let log = ExecutionLog::open(dir.path()).unwrap();
        log.write_outputs(
            "T.sql",
            &[
                StatementRecord {
                    index: 1,
                    outcome: StatementOutcome::success("1 row affected"),
                },
                StatementRecord {
                    index: 2,
                    outcome: StatementOutcome::error("* 257: sql syntax error"),
                },
            ],
        )
        .unwrap();
        let out = std::fs::read_to_string(dir.path().join("T.sql.out")).unwrap();
        let err = std::fs::read_to_string(dir.path().join("T.sql.err")).unwrap();
        assert_eq!(out, "-- statement 1\n1 row affected\n");
        assert_eq!(err, "-- statement 2 (error)\n* 257: sql syntax error\n");
    }
}
