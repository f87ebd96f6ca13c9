//! Data materialization: CSV extracts to statement-files.

pub mod batcher;
pub mod encoder;

pub use batcher::{split_statements, StatementBatcher, StatementFile};
pub use encoder::{parse_values, quote_literal, EncodedRow, RowEncoder};

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::archive::ArchiveLayout;
use crate::config::{EncodingConfig, ProjectConfig};
use crate::error::{MigrateError, Result};
use crate::identifier::qualified_table;
use crate::schema::{SchemaModel, TableSchema};

/// Per-table outcome of materialization.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableDataReport {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub rows: usize,
    pub skipped: u64,
    pub warnings: Vec<String>,
}

/// Outcome of a whole materialization run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterializeReport {
    pub tables: Vec<TableDataReport>,
}

impl MaterializeReport {
    pub fn files_written(&self) -> usize {
        self.tables.iter().filter(|t| t.file.is_some()).count()
    }

    pub fn rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn skipped_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.skipped).sum()
    }
}

/// Turns each table's `data.csv` into a statement-file.
#[derive(Debug, Clone)]
pub struct Materializer {
    out_dir: PathBuf,
    project: ProjectConfig,
    target_schema: Option<String>,
    encoding: EncodingConfig,
}

impl Materializer {
    /// `project` decides target table names; `target_schema` qualifies them.
    pub fn new(
        out_dir: impl Into<PathBuf>,
        project: ProjectConfig,
        target_schema: Option<String>,
        encoding: EncodingConfig,
    ) -> Self {
        Self {
            out_dir: out_dir.into(),
            project,
            target_schema,
            encoding,
        }
    }

    /// Qualified target table reference for a source table.
    pub fn target_for(&self, table: &str) -> String {
        let schema = self.target_schema.as_deref().map(|s| self.encoding.identifier(s));
        qualified_table(
            schema.as_deref(),
            &self.encoding.identifier(&self.project.table_name(table)),
        )
    }

    /// Materialize every table of the model that has a data extract.
    pub fn materialize(&self, layout: &ArchiveLayout, model: &SchemaModel) -> Result<MaterializeReport> {
        let mut report = MaterializeReport::default();
        for dir in layout.table_dirs()? {
            let Some(table) = model.get(&dir.name) else {
                warn!(table = %dir.name, "No schema for table, data not materialized");
                report.tables.push(TableDataReport {
                    table: dir.name.clone(),
                    warnings: vec!["no schema for table".to_string()],
                    ..Default::default()
                });
                continue;
            };
            report.tables.push(self.materialize_table(table, &dir.data_path())?);
        }

        info!(
            "Materialized {} rows into {} statement files ({} rows skipped)",
            report.rows(),
            report.files_written(),
            report.skipped_rows()
        );
        Ok(report)
    }

    /// Materialize one table from its CSV extract.
    pub fn materialize_table(&self, table: &TableSchema, csv_path: &Path) -> Result<TableDataReport> {
        let mut result = TableDataReport {
            table: table.name.clone(),
            ..Default::default()
        };

        let non_empty = std::fs::metadata(csv_path).map(|m| m.len() > 0).unwrap_or(false);
        if !non_empty {
            warn!(table = %table.name, "Data extract missing or empty");
            result.warnings.push("data extract missing or empty".to_string());
            return Ok(result);
        }

        let target = self.target_for(&table.name);
        let encoder = RowEncoder::new(table, &target, &self.encoding);
        let mut batcher = StatementBatcher::new(&table.name);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(csv_path)?;

        let mut row_number = 0u64;
        for record in reader.records() {
            row_number += 1;
            let record = match record {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    warn!(table = %table.name, row = row_number, "Unreadable record: {}", e);
                    batcher.skip(format!("row {}: unreadable record: {}", row_number, e));
                    continue;
                }
            };
            let fields: Vec<&str> = record.iter().collect();
            match encoder.encode(row_number, &fields) {
                Ok(row) => batcher.push(row),
                Err(e @ MigrateError::Encoding { .. }) => {
                    warn!("{}", e);
                    batcher.skip(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        result.rows = batcher.rows();
        result.skipped = batcher.skipped();
        result.warnings = batcher.warnings().to_vec();
        let skipped = batcher.skipped();
        if let Some(file) = batcher.finish() {
            let path = file.write(&self.out_dir, &target, skipped)?;
            info!(
                table = %table.name,
                "Wrote {} statements to {}",
                result.rows,
                path.display()
            );
            result.file = Some(path);
        } else {
            result.warnings.push("no rows encoded".to_string());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSchema;
    use crate::typemap::{CdsKind, SourceType, TargetType};
    use tempfile::TempDir;

    fn table() -> TableSchema {
        let col = |name: &str, kind, nullable| ColumnSchema {
            name: name.to_string(),
            source_type: SourceType::new("X", vec![]),
            target_type: TargetType::plain(kind),
            nullable,
            default: None,
            identity: false,
        };
        TableSchema::new(
            "T",
            vec![
                col("ID", CdsKind::Integer, false),
                col("NAME", CdsKind::String, true),
                col("CREATED_AT", CdsKind::DateTime, true),
            ],
        )
    }

    #[test]
    fn test_materialize_table() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("data.csv");
        std::fs::write(
            &csv_path,
            "1,O'Brien,\n2,\"Smith, J\",2024-01-05 10:00:00\n\n3,short\n4,x,,extra\n",
        )
        .unwrap();

        let out = dir.path().join("sql");
        let materializer = Materializer::new(
            &out,
            ProjectConfig::default(),
            Some("SHOP".to_string()),
            EncodingConfig::default(),
        );
        let report = materializer.materialize_table(&table(), &csv_path).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.skipped, 2);

        let file = StatementFile::load(&out.join("T.sql"), Default::default()).unwrap();
        assert_eq!(
            file.statements,
            [
                "INSERT INTO \"SHOP\".\"DB_T\" (\"ID\", \"NAME\", \"CREATED_AT\") VALUES (1, 'O''Brien', NULL)",
                "INSERT INTO \"SHOP\".\"DB_T\" (\"ID\", \"NAME\", \"CREATED_AT\") VALUES (2, 'Smith, J', '2024-01-05 10:00:00')",
            ]
        );
        let text = std::fs::read_to_string(out.join("T.sql")).unwrap();
        assert!(text.contains("-- skipped: 2\n"));
    }

    #[test]
    fn test_quoted_empty_field_is_a_row() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("data.csv");
        std::fs::write(&csv_path, "a\n\"\"\n\nb\n").unwrap();
        let single = TableSchema::new(
            "S",
            vec![ColumnSchema {
                name: "V".to_string(),
                source_type: SourceType::new("X", vec![]),
                target_type: TargetType::plain(CdsKind::String),
                nullable: true,
                default: None,
                identity: false,
            }],
        );

        let out = dir.path().join("sql");
        let materializer = Materializer::new(&out, ProjectConfig::default(), None, EncodingConfig::default());
        let report = materializer.materialize_table(&single, &csv_path).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.skipped, 0);

        let file = StatementFile::load(&out.join("S.sql"), Default::default()).unwrap();
        assert!(file.statements[1].ends_with("VALUES (NULL)"));
    }

    #[test]
    fn test_empty_extract_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("data.csv");
        std::fs::write(&csv_path, "").unwrap();
        let out = dir.path().join("sql");
        let materializer = Materializer::new(&out, ProjectConfig::default(), None, EncodingConfig::default());

        let report = materializer.materialize_table(&table(), &csv_path).unwrap();
        assert!(report.file.is_none());
        assert_eq!(report.warnings.len(), 1);
        let missing = materializer
            .materialize_table(&table(), &dir.path().join("absent.csv"))
            .unwrap();
        assert!(missing.file.is_none());
        assert!(!out.join("T.sql").exists());
    }

    #[test]
    fn test_target_naming() {
        let hana = Materializer::new("sql", ProjectConfig::default(), Some("SHOP".into()), EncodingConfig::default());
        assert_eq!(hana.target_for("ORDERS"), "\"SHOP\".\"DB_ORDERS\"");

        let pg = Materializer::new(
            "sql",
            ProjectConfig::default(),
            Some("Shop".into()),
            EncodingConfig {
                lowercase_identifiers: true,
                ..Default::default()
            },
        );
        assert_eq!(pg.target_for("ORDERS"), "\"shop\".\"db_orders\"");
    }
}
