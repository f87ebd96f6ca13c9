//! Stage functions tying the components together: bundle preparation,
//! schema generation and data materialization.
//!
//! Each stage resolves its inputs from [`Config`] once and hands them down
//! explicitly.

use serde::Serialize;
use tracing::{info, warn};

use crate::archive::{self, ArchiveLayout, INDEX_DIR};
use crate::config::Config;
use crate::data::{MaterializeReport, Materializer};
use crate::error::{MigrateError, Result};
use crate::schema::{write_schema, BuildReport, RenderOutcome, SchemaBuilder, SchemaModel};

/// Extract the bundle if needed and open the extracted tree.
///
/// When the bundle file is absent but an extracted tree exists, the tree is
/// used as is.
pub fn prepare_archive(config: &Config) -> Result<ArchiveLayout> {
    let archive_path = config.archive_path();
    let extract_dir = config.extract_dir();
    let schema = config.archive.schema.as_deref();

    if archive_path.is_file() {
        let outcome = archive::extract(&archive_path, &extract_dir, schema)?;
        return ArchiveLayout::open(&extract_dir, Some(&outcome.schema));
    }
    if extract_dir.join(INDEX_DIR).is_dir() {
        warn!(
            "Bundle {} not found, using extracted tree in {}",
            archive_path.display(),
            extract_dir.display()
        );
        return ArchiveLayout::open(&extract_dir, schema);
    }
    Err(MigrateError::archive(
        archive_path,
        format!(
            "bundle not found and {} holds no extracted tree",
            extract_dir.display()
        ),
    ))
}

/// Parse every table of the bundle into the schema model.
pub fn build_model(config: &Config, layout: &ArchiveLayout) -> Result<(SchemaModel, BuildReport)> {
    SchemaBuilder::from_config(&config.dialect).build(layout)
}

/// Outcome of the schema stage.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaStageReport {
    pub schema: String,
    pub output: RenderOutcome,
    pub build: BuildReport,
}

/// Build the model and write the CDS schema file (with backup).
pub fn generate_schema(config: &Config, layout: &ArchiveLayout) -> Result<SchemaStageReport> {
    info!("Phase 1: Building schema model for {}", layout.schema());
    let (model, build) = build_model(config, layout)?;
    if model.is_empty() {
        return Err(MigrateError::parse(
            layout.schema(),
            "no table could be parsed from the bundle",
        ));
    }
    let output = write_schema(&model, &config.project.namespace, &config.schema_file_path())?;
    Ok(SchemaStageReport {
        schema: layout.schema().to_string(),
        output,
        build,
    })
}

/// Outcome of the data stage.
#[derive(Debug, Clone, Serialize)]
pub struct DataStageReport {
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,
    pub build: BuildReport,
    pub data: MaterializeReport,
}

/// Build the model and write one statement-file per table.
pub fn generate_data(config: &Config, layout: &ArchiveLayout) -> Result<DataStageReport> {
    info!("Phase 2: Materializing data for {}", layout.schema());
    let (model, build) = build_model(config, layout)?;
    let target_schema = config.client.effective_target_schema();
    let materializer = Materializer::new(
        config.sql_dir(),
        config.project.clone(),
        target_schema.clone(),
        config.encoding.clone(),
    );
    let data = materializer.materialize(layout, &model)?;
    Ok(DataStageReport {
        schema: layout.schema().to_string(),
        target_schema,
        build,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bundle(root: &std::path::Path) {
        let table = root.join("index/SHOP/or/ORDERS");
        std::fs::create_dir_all(&table).unwrap();
        std::fs::write(
            table.join("create.sql"),
            "CREATE COLUMN TABLE \"SHOP\".\"ORDERS\" (\"ID\" INTEGER NOT NULL, \"NOTE\" NVARCHAR(20))",
        )
        .unwrap();
        std::fs::write(
            table.join("table.xml"),
            "<Table><Name>ORDERS</Name><KeyAttrs><Name>ID</Name></KeyAttrs></Table>",
        )
        .unwrap();
        std::fs::write(table.join("data.csv"), "1,first\n2,\n").unwrap();
    }

    fn config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.base_dir = Some(root.to_path_buf());
        config
    }

    #[test]
    fn test_extracted_tree_without_bundle() {
        let dir = TempDir::new().unwrap();
        bundle(&dir.path().join("temp_extract"));
        let config = config(dir.path());

        let layout = prepare_archive(&config).unwrap();
        assert_eq!(layout.schema(), "SHOP");

        let schema = generate_schema(&config, &layout).unwrap();
        assert_eq!(schema.output.entities, 1);
        let cds = std::fs::read_to_string(dir.path().join("cap_project/db/schema.cds")).unwrap();
        assert!(cds.contains("entity ORDERS {"));

        let data = generate_data(&config, &layout).unwrap();
        assert_eq!(data.data.rows(), 2);
        assert!(dir.path().join("data_insert_sql/ORDERS.sql").is_file());
    }

    #[test]
    fn test_missing_bundle_and_tree() {
        let dir = TempDir::new().unwrap();
        let err = prepare_archive(&config(dir.path())).unwrap_err();
        assert!(matches!(err, MigrateError::Archive { .. }));
    }
}
