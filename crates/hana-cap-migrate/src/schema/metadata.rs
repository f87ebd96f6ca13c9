//! Parser for the per-table `table.xml` metadata document.

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::{MigrateError, Result};

/// Bit in `Constr` marking a NOT NULL column.
const CONSTR_NOT_NULL: u32 = 0x2;

/// Constraint data from one metadata document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableMetadata {
    /// Table name as recorded in the document.
    pub name: Option<String>,
    /// Primary key columns in key order.
    pub primary_key: Vec<String>,
    /// Non-system fields in document order.
    pub fields: Vec<FieldMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetadata {
    pub name: String,
    pub not_null: bool,
}

impl TableMetadata {
    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "KeyAttrs")]
    key_attrs: Option<RawKeyAttrs>,
    #[serde(rename = "AllAttrs")]
    all_attrs: Option<RawAllAttrs>,
}

#[derive(Debug, Deserialize)]
struct RawKeyAttrs {
    #[serde(rename = "Name", default)]
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAllAttrs {
    #[serde(rename = "Field", default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Constr")]
    constr: Option<String>,
}

/// Parse a metadata document. `table` is only used in error messages.
pub fn parse(xml: &str, table: &str) -> Result<TableMetadata> {
    let raw: RawTable =
        from_str(xml).map_err(|e| MigrateError::parse(table, format!("invalid table.xml: {}", e)))?;

    if raw.name.is_none() && raw.key_attrs.is_none() && raw.all_attrs.is_none() {
        return Err(MigrateError::parse(
            table,
            "table.xml has no Name, KeyAttrs or AllAttrs element",
        ));
    }

    let primary_key: Vec<String> = raw
        .key_attrs
        .map(|k| k.names.into_iter().map(|n| n.trim().to_string()).collect())
        .unwrap_or_default();

    let mut fields = Vec::new();
    for field in raw.all_attrs.map(|a| a.fields).unwrap_or_default() {
        let Some(name) = field.name.map(|n| n.trim().to_string()) else {
            continue;
        };
        if name.starts_with('$') {
            continue;
        }
        let constr = match field.constr.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(text) => text.parse::<u32>().map_err(|_| {
                MigrateError::parse(table, format!("field {}: bad Constr '{}'", name, text))
            })?,
        };
        let is_key = primary_key.iter().any(|k| k.eq_ignore_ascii_case(&name));
        fields.push(FieldMetadata {
            not_null: constr & CONSTR_NOT_NULL != 0 || is_key,
            name,
        });
    }

    Ok(TableMetadata {
        name: raw.name.map(|n| n.trim().to_string()),
        primary_key,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TableEntity>
  <Schema>SHOP</Schema>
  <Name>ORDERS</Name>
  <KeyAttrs>
    <Name>ORDER_ID</Name>
    <Name>LINE_NO</Name>
  </KeyAttrs>
  <AllAttrs>
    <Field><Name>ORDER_ID</Name><Constr>0</Constr><Type>INTEGER</Type></Field>
    <Field><Name>LINE_NO</Name></Field>
    <Field><Name>CUSTOMER</Name><Constr>26</Constr></Field>
    <Field><Name>NOTE</Name><Constr>1</Constr></Field>
    <Field><Name>$rowid$</Name><Constr>2</Constr></Field>
  </AllAttrs>
</TableEntity>"#;

    #[test]
    fn test_parse_keys_and_fields() {
        let meta = parse(ORDERS_XML, "ORDERS").unwrap();
        assert_eq!(meta.name.as_deref(), Some("ORDERS"));
        assert_eq!(meta.primary_key, ["ORDER_ID", "LINE_NO"]);
        assert_eq!(meta.fields.len(), 4);
        // key columns are implicitly NOT NULL
        assert!(meta.field("ORDER_ID").unwrap().not_null);
        assert!(meta.field("line_no").unwrap().not_null);
        assert!(meta.field("CUSTOMER").unwrap().not_null);
        assert!(!meta.field("NOTE").unwrap().not_null);
        assert!(meta.field("$rowid$").is_none());
    }

    #[test]
    fn test_no_keys() {
        let meta = parse(
            "<T><Name>LOG</Name><AllAttrs><Field><Name>MSG</Name></Field></AllAttrs></T>",
            "LOG",
        )
        .unwrap();
        assert!(meta.primary_key.is_empty());
        assert_eq!(meta.fields.len(), 1);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(parse("<T><Name>X</Name>", "X").is_err());
        assert!(parse("<T><Other>1</Other></T>", "X").is_err());
        assert!(parse(
            "<T><AllAttrs><Field><Name>A</Name><Constr>lots</Constr></Field></AllAttrs></T>",
            "X"
        )
        .is_err());
    }
}
