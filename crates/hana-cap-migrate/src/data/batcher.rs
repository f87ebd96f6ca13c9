//! Statement-files: one file of INSERT statements per table.

use std::path::{Path, PathBuf};
use tracing::warn;

use super::encoder::EncodedRow;
use crate::config::QuoteStyle;
use crate::error::Result;

const TABLE_HEADER: &str = "-- table:";

/// The INSERT statements of one table, in source row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFile {
    pub table: String,
    /// Statements without the terminating `;`.
    pub statements: Vec<String>,
}

impl StatementFile {
    /// File name for a table. Path separators in table names become `_`.
    pub fn file_name_for(table: &str) -> String {
        format!("{}.sql", table.replace(['/', '\\'], "_"))
    }

    pub fn file_name(&self) -> String {
        Self::file_name_for(&self.table)
    }

    /// Render the file content with its header comments.
    pub fn render(&self, target: &str, skipped: u64) -> String {
        let mut out = format!(
            "{} {}\n-- target: {}\n-- rows: {}\n-- skipped: {}\n",
            TABLE_HEADER,
            self.table,
            target,
            self.statements.len(),
            skipped
        );
        for statement in &self.statements {
            out.push_str(statement);
            out.push_str(";\n");
        }
        out
    }

    /// Write the file into `dir`, replacing any previous version atomically.
    pub fn write(&self, dir: &Path, target: &str, skipped: u64) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let temp = dir.join(format!("{}.tmp", self.file_name()));
        std::fs::write(&temp, self.render(target, skipped))?;
        std::fs::rename(&temp, &path)?;
        Ok(path)
    }

    /// Read a statement-file. The table name comes from the header, or the
    /// file stem when there is none.
    pub fn load(path: &Path, style: QuoteStyle) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let table = text
            .lines()
            .find_map(|l| l.strip_prefix(TABLE_HEADER))
            .map(|t| t.trim().to_string())
            .or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        Ok(Self {
            table,
            statements: split_statements(&text, style),
        })
    }
}

/// Split SQL text on top-level `;`, skipping `--` comments. Semicolons in
/// quoted literals and identifiers do not split.
pub fn split_statements(text: &str, style: QuoteStyle) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == '\\' && q == '\'' && style == QuoteStyle::Backslash {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    for skipped in chars.by_ref() {
                        if skipped == '\n' {
                            break;
                        }
                    }
                    current.push('\n');
                }
                ';' => {
                    let statement = current.trim();
                    if !statement.is_empty() {
                        statements.push(statement.to_string());
                    }
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    statements
}

/// Collects encoded rows of one table into a [`StatementFile`].
#[derive(Debug)]
pub struct StatementBatcher {
    table: String,
    statements: Vec<String>,
    skipped: u64,
    warnings: Vec<String>,
}

impl StatementBatcher {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            statements: Vec::new(),
            skipped: 0,
            warnings: Vec::new(),
        }
    }

    pub fn push(&mut self, row: EncodedRow) {
        self.warnings.extend(row.warnings);
        self.statements.push(row.statement);
    }

    /// Record a row that could not be encoded.
    pub fn skip(&mut self, reason: String) {
        self.skipped += 1;
        self.warnings.push(reason);
    }

    pub fn rows(&self) -> usize {
        self.statements.len()
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The finished file, or `None` when no row was encoded.
    pub fn finish(self) -> Option<StatementFile> {
        if self.statements.is_empty() {
            warn!(table = %self.table, "No rows to write, no statement file produced");
            return None;
        }
        Some(StatementFile {
            table: self.table,
            statements: self.statements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(statement: &str) -> EncodedRow {
        EncodedRow {
            statement: statement.to_string(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_split_statements_respects_quotes_and_comments() {
        let text = "-- table: T\n-- rows: 3\n\
                    INSERT INTO T VALUES ('a;b');\n\
                    INSERT INTO \"T;X\" VALUES ('it''s -- not a comment');\n\
                    -- trailing comment; with semicolon\n\
                    INSERT INTO T VALUES (3)";
        let statements = split_statements(text, QuoteStyle::Doubled);
        assert_eq!(
            statements,
            [
                "INSERT INTO T VALUES ('a;b')",
                "INSERT INTO \"T;X\" VALUES ('it''s -- not a comment')",
                "INSERT INTO T VALUES (3)",
            ]
        );
    }

    #[test]
    fn test_split_backslash_style() {
        let text = r"INSERT INTO T VALUES ('a\';b');INSERT INTO T VALUES ('c\\');";
        let statements = split_statements(text, QuoteStyle::Backslash);
        assert_eq!(
            statements,
            [r"INSERT INTO T VALUES ('a\';b')", r"INSERT INTO T VALUES ('c\\')"]
        );
    }

    #[test]
    fn test_batcher_keeps_order_and_counts() {
        let mut batcher = StatementBatcher::new("T");
        batcher.push(row("INSERT 1"));
        batcher.skip("row 2: bad".to_string());
        batcher.push(row("INSERT 3"));
        assert_eq!(batcher.rows(), 2);
        assert_eq!(batcher.skipped(), 1);
        let file = batcher.finish().unwrap();
        assert_eq!(file.statements, ["INSERT 1", "INSERT 3"]);
    }

    #[test]
    fn test_empty_batch_produces_no_file() {
        let mut batcher = StatementBatcher::new("EMPTY");
        batcher.skip("row 1: bad".to_string());
        assert!(batcher.finish().is_none());
    }

    #[test]
    fn test_write_and_load() {
        let dir = TempDir::new().unwrap();
        let file = StatementFile {
            table: "/BIC/T".to_string(),
            statements: vec![
                "INSERT INTO \"DB_T\" (\"A\") VALUES ('x;y')".to_string(),
                "INSERT INTO \"DB_T\" (\"A\") VALUES (NULL)".to_string(),
            ],
        };
        let path = file.write(dir.path(), "\"DB_T\"", 4).unwrap();
        assert_eq!(path.file_name().unwrap(), "_BIC_T.sql");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("-- table: /BIC/T\n-- target: \"DB_T\"\n-- rows: 2\n-- skipped: 4\n"));

        let loaded = StatementFile::load(&path, QuoteStyle::Doubled).unwrap();
        assert_eq!(loaded, file);
    }
}
