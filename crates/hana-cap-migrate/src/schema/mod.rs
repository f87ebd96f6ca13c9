//! Canonical schema model built from the export's DDL and metadata.
//!
//! Column order inside a [`TableSchema`] is significant: it is the order used
//! both when rendering the CDS entity and when encoding data rows.

pub mod builder;
pub mod ddl;
pub mod metadata;
pub mod render;

pub use builder::{BuildReport, SchemaBuilder, SkippedTable};
pub use ddl::{Dialect, ParsedDdl};
pub use metadata::{FieldMetadata, TableMetadata};
pub use render::{render_cds, write_schema, RenderOutcome};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::typemap::{SourceType, TargetType};

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name as declared.
    pub name: String,

    /// Declared source type.
    pub source_type: SourceType,

    /// Derived CDS type.
    pub target_type: TargetType,

    /// Whether the column accepts NULL.
    pub nullable: bool,

    /// Default expression in its literal source form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Identity / auto-generated column. Never carries a default.
    #[serde(default)]
    pub identity: bool,
}

/// One table: ordered columns plus primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name (the archive directory name).
    pub name: String,

    /// Columns in declaration order.
    pub columns: Vec<ColumnSchema>,

    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: Vec::new(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the named column is part of the primary key.
    pub fn is_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// All tables of one schema, ordered by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaModel {
    /// Source schema name the model was built from.
    pub schema: String,

    /// Tables keyed by name.
    pub tables: BTreeMap<String, TableSchema>,
}

impl SchemaModel {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, table: TableSchema) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }
}
