//! CDS rendering of the schema model.

use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use super::SchemaModel;
use crate::error::Result;
use crate::identifier::cds_ident;

/// Where the schema was written and what was backed up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderOutcome {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    pub entities: usize,
}

/// Render the model as CDS source. Output depends only on the model.
pub fn render_cds(model: &SchemaModel, namespace: &str) -> String {
    let mut out = String::new();
    if !namespace.is_empty() {
        let _ = writeln!(out, "namespace {};", namespace);
    }

    for table in model.iter() {
        out.push('\n');
        let _ = writeln!(out, "entity {} {{", cds_ident(&table.name));
        for col in &table.columns {
            out.push_str("    ");
            if table.is_key(&col.name) {
                out.push_str("key ");
            }
            let _ = write!(out, "{}: {}", cds_ident(&col.name), col.target_type);
            if !col.nullable {
                out.push_str(" not null");
            }
            if let Some(default) = col.default.as_deref().filter(|_| !col.identity) {
                let _ = write!(out, " default {}", default);
            }
            out.push_str(";\n");
        }
        out.push_str("}\n");
    }
    out
}

/// Backup path for a schema file: `schema.cds` becomes `schema.cds.backup`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

/// Write the rendered model, copying any existing file to its backup path first.
pub fn write_schema(model: &SchemaModel, namespace: &str, path: &Path) -> Result<RenderOutcome> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let backup = if path.is_file() {
        let backup = backup_path(path);
        std::fs::copy(path, &backup)?;
        info!("Backed up {} to {}", path.display(), backup.display());
        Some(backup)
    } else {
        None
    };

    let content = render_cds(model, namespace);

    // Atomic write: write to temp file, then rename
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, path)?;

    info!("Wrote {} entities to {}", model.len(), path.display());
    Ok(RenderOutcome {
        path: path.to_path_buf(),
        backup,
        entities: model.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, TableSchema};
    use crate::typemap::{CdsKind, SourceType, TargetType};
    use tempfile::TempDir;

    fn column(name: &str, target: TargetType, nullable: bool) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            source_type: SourceType::new("X", vec![]),
            target_type: target,
            nullable,
            default: None,
            identity: false,
        }
    }

    fn model() -> SchemaModel {
        let mut t = TableSchema::new(
            "T",
            vec![
                column("ID", TargetType::plain(CdsKind::Integer), false),
                column(
                    "NAME",
                    TargetType {
                        length: Some(50),
                        ..TargetType::plain(CdsKind::String)
                    },
                    true,
                ),
                ColumnSchema {
                    default: Some("CURRENT_TIMESTAMP".into()),
                    ..column("CREATED_AT", TargetType::plain(CdsKind::DateTime), true)
                },
                ColumnSchema {
                    default: Some("1".into()),
                    identity: true,
                    ..column("SEQ", TargetType::plain(CdsKind::Integer64), false)
                },
            ],
        );
        t.primary_key = vec!["ID".into()];
        let mut m = SchemaModel::new("SHOP");
        m.insert(t);
        m.insert(TableSchema::new(
            "/BIC/A",
            vec![column("V", TargetType::plain(CdsKind::Double), true)],
        ));
        m
    }

    #[test]
    fn test_render_cds() {
        let text = render_cds(&model(), "db");
        let expected = "namespace db;\n\
            \n\
            entity ![/BIC/A] {\n    V: Double;\n}\n\
            \n\
            entity T {\n    key ID: Integer not null;\n    NAME: String(50);\n    \
            CREATED_AT: DateTime default CURRENT_TIMESTAMP;\n    SEQ: Integer64 not null;\n}\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_write_is_idempotent_with_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db").join("schema.cds");

        let first = write_schema(&model(), "db", &path).unwrap();
        assert!(first.backup.is_none());
        let content = std::fs::read_to_string(&path).unwrap();

        std::fs::write(&path, "namespace old;\n").unwrap();
        let second = write_schema(&model(), "db", &path).unwrap();
        let backup = second.backup.unwrap();
        assert_eq!(backup, dir.path().join("db").join("schema.cds.backup"));
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "namespace old;\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);

        let third = write_schema(&model(), "db", &path).unwrap();
        assert!(third.backup.is_some());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), content);
        assert!(!dir.path().join("db").join("schema.cds.tmp").exists());
    }
}
