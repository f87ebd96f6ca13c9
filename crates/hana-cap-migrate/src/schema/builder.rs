//! Merge DDL and metadata into the canonical schema model.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{ddl, metadata, ColumnSchema, Dialect, SchemaModel, TableSchema};
use crate::archive::ArchiveLayout;
use crate::config::DialectConfig;
use crate::error::Result;
use crate::typemap::{SourceType, TypeMapper};

/// Outcome of building a schema model.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub tables_built: usize,
    pub skipped: Vec<SkippedTable>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTable {
    pub table: String,
    pub reason: String,
}

impl BuildReport {
    fn warn(&mut self, table: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(table = %table, "{}", message);
        self.warnings.push(format!("{}: {}", table, message));
    }

    fn skip(&mut self, table: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(table = %table, "Skipping table: {}", reason);
        self.skipped.push(SkippedTable {
            table: table.to_string(),
            reason,
        });
    }
}

/// Builds [`TableSchema`]s from per-table DDL and metadata.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    dialect: Dialect,
    mapper: TypeMapper,
}

impl SchemaBuilder {
    pub fn new(dialect: Dialect, mapper: TypeMapper) -> Self {
        Self { dialect, mapper }
    }

    pub fn from_config(config: &DialectConfig) -> Self {
        Self::new(Dialect::from_config(config), TypeMapper::from_config(config))
    }

    /// Build the model for every table directory in the bundle.
    pub fn build(&self, layout: &ArchiveLayout) -> Result<(SchemaModel, BuildReport)> {
        let mut model = SchemaModel::new(layout.schema());
        let mut report = BuildReport::default();

        for dir in layout.table_dirs()? {
            if model.get(&dir.name).is_some() {
                report.skip(
                    &dir.name,
                    format!("duplicate table directory {}", dir.path.display()),
                );
                continue;
            }
            let ddl = read_optional(&dir.ddl_path())?;
            let xml = read_optional(&dir.metadata_path())?;
            if let Some(table) =
                self.build_table(&dir.name, ddl.as_deref(), xml.as_deref(), &mut report)
            {
                model.insert(table);
                report.tables_built += 1;
            }
        }

        info!(
            "Schema {}: {} tables built, {} skipped, {} warnings",
            model.schema,
            report.tables_built,
            report.skipped.len(),
            report.warnings.len()
        );
        Ok((model, report))
    }

    /// Build one table. Returns `None` when the table is skipped.
    pub fn build_table(
        &self,
        name: &str,
        ddl_text: Option<&str>,
        metadata_text: Option<&str>,
        report: &mut BuildReport,
    ) -> Option<TableSchema> {
        let parsed = match ddl_text {
            Some(text) => match ddl::parse(text, &self.dialect, &self.mapper) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    report.warn(name, format!("create.sql unusable: {}", e));
                    None
                }
            },
            None => {
                report.warn(name, "create.sql missing");
                None
            }
        };

        let meta = match metadata_text {
            Some(text) => match metadata::parse(text, name) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    report.warn(name, format!("table.xml unusable: {}", e));
                    None
                }
            },
            None => {
                debug!(table = %name, "No table.xml, no additional constraints");
                None
            }
        };

        let columns = match (parsed, &meta) {
            (Some(parsed), _) => {
                if !parsed.table.eq_ignore_ascii_case(name) {
                    report.warn(name, format!("create.sql names table {}", parsed.table));
                }
                for w in parsed.warnings {
                    report.warn(name, w);
                }
                parsed.columns
            }
            (None, Some(meta)) if !meta.fields.is_empty() => {
                report.warn(
                    name,
                    format!(
                        "columns taken from table.xml with type {}",
                        self.mapper.fallback()
                    ),
                );
                meta.fields
                    .iter()
                    .map(|f| ColumnSchema {
                        name: f.name.clone(),
                        source_type: SourceType::new("UNKNOWN", Vec::new()),
                        target_type: self.mapper.fallback(),
                        nullable: !f.not_null,
                        default: None,
                        identity: false,
                    })
                    .collect()
            }
            _ => {
                report.skip(name, "neither create.sql nor table.xml describes any columns");
                return None;
            }
        };

        let mut table = TableSchema::new(name, columns);
        if let Some(meta) = meta {
            if let Some(meta_name) = meta.name.as_deref() {
                if !meta_name.eq_ignore_ascii_case(name) {
                    report.warn(name, format!("table.xml names table {}", meta_name));
                }
            }
            for field in meta.fields.iter().filter(|f| f.not_null) {
                if let Some(col) = table
                    .columns
                    .iter_mut()
                    .find(|c| c.name.eq_ignore_ascii_case(&field.name))
                {
                    col.nullable = false;
                }
            }
            for key in &meta.primary_key {
                match table
                    .columns
                    .iter_mut()
                    .find(|c| c.name.eq_ignore_ascii_case(key))
                {
                    Some(col) => {
                        col.nullable = false;
                        if !table.primary_key.contains(&col.name) {
                            table.primary_key.push(col.name.clone());
                        }
                    }
                    None => report.warn(
                        name,
                        format!("primary key column {} has no matching column, ignored", key),
                    ),
                }
            }
        }

        Some(table)
    }
}

/// Missing files read as `None`. Invalid UTF-8 is replaced rather than fatal.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const T_DDL: &str = "CREATE TABLE T (ID INTEGER NOT NULL, NAME VARCHAR(50), \
                         CREATED_AT TIMESTAMP DEFAULT CURRENT_TIMESTAMP)";
    const T_XML: &str = "<TableEntity><Name>T</Name><KeyAttrs><Name>ID</Name></KeyAttrs>\
                         <AllAttrs><Field><Name>ID</Name></Field><Field><Name>NAME</Name>\
                         <Constr>0</Constr></Field></AllAttrs></TableEntity>";

    #[test]
    fn test_merge_ddl_and_metadata() {
        let mut report = BuildReport::default();
        let table = SchemaBuilder::default()
            .build_table("T", Some(T_DDL), Some(T_XML), &mut report)
            .unwrap();

        let names: Vec<_> = table.column_names().collect();
        assert_eq!(names, ["ID", "NAME", "CREATED_AT"]);
        assert_eq!(table.primary_key, ["ID"]);
        assert!(!table.column("ID").unwrap().nullable);
        assert!(table.column("NAME").unwrap().nullable);
        assert_eq!(
            table.column("CREATED_AT").unwrap().default.as_deref(),
            Some("CURRENT_TIMESTAMP")
        );
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_metadata_not_null_and_unmatched_key() {
        let xml = "<X><KeyAttrs><Name>ID</Name><Name>GONE</Name></KeyAttrs>\
                   <AllAttrs><Field><Name>NAME</Name><Constr>2</Constr></Field></AllAttrs></X>";
        let mut report = BuildReport::default();
        let table = SchemaBuilder::default()
            .build_table("T", Some(T_DDL), Some(xml), &mut report)
            .unwrap();
        assert!(!table.column("NAME").unwrap().nullable);
        assert_eq!(table.primary_key, ["ID"]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("GONE"));
    }

    #[test]
    fn test_ddl_only_has_no_key() {
        let mut report = BuildReport::default();
        let table = SchemaBuilder::default()
            .build_table("T", Some(T_DDL), None, &mut report)
            .unwrap();
        assert!(table.primary_key.is_empty());
        assert_eq!(table.column_count(), 3);
    }

    #[test]
    fn test_metadata_fallback_when_ddl_broken() {
        let mut report = BuildReport::default();
        let table = SchemaBuilder::default()
            .build_table("T", Some("CREATE TABLE T ("), Some(T_XML), &mut report)
            .unwrap();
        let names: Vec<_> = table.column_names().collect();
        assert_eq!(names, ["ID", "NAME"]);
        assert_eq!(table.columns[0].target_type.to_string(), "String");
        assert!(!table.columns[0].nullable);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_both_unusable_is_skipped() {
        let mut report = BuildReport::default();
        let table = SchemaBuilder::default().build_table(
            "T",
            Some("not sql"),
            Some("<broken"),
            &mut report,
        );
        assert!(table.is_none());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].table, "T");
    }

    #[test]
    fn test_build_from_layout() {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join("index/SHOP");
        let write = |bucket: &str, table: &str, files: &[(&str, &str)]| {
            let t = schema.join(bucket).join(table);
            std::fs::create_dir_all(&t).unwrap();
            for (name, content) in files {
                std::fs::write(t.join(name), content).unwrap();
            }
        };
        write("T_", "T", &[("create.sql", T_DDL), ("table.xml", T_XML)]);
        write("A_", "A", &[("create.sql", "CREATE TABLE A (X INTEGER)")]);
        write("B_", "B", &[("data.csv", "1\n")]);

        let layout = ArchiveLayout::open(dir.path(), None).unwrap();
        let (model, report) = SchemaBuilder::default().build(&layout).unwrap();
        assert_eq!(model.schema, "SHOP");
        let tables: Vec<_> = model.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tables, ["A", "T"]);
        assert_eq!(report.tables_built, 2);
        assert_eq!(report.skipped[0].table, "B");
    }
}
