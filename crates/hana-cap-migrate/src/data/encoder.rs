//! Row encoding: one CSV record to one INSERT statement.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

use crate::config::{EncodingConfig, QuoteStyle};
use crate::error::{MigrateError, Result};
use crate::identifier::quote_sql;
use crate::schema::{ColumnSchema, TableSchema};
use crate::typemap::ValueClass;

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("valid integer regex"));
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?$").expect("valid decimal regex")
});
static HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9A-Fa-f]{2})*$").expect("valid hex regex"));

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// One encoded row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRow {
    /// INSERT statement without the terminating `;`.
    pub statement: String,
    /// Values that failed validation and were quoted as text.
    pub warnings: Vec<String>,
}

/// Encodes rows of one table into INSERT statements.
#[derive(Debug, Clone)]
pub struct RowEncoder<'a> {
    table: &'a TableSchema,
    prefix: String,
    null_marker: Option<String>,
    quote_style: QuoteStyle,
}

impl<'a> RowEncoder<'a> {
    /// `target` is the already-qualified target table reference.
    pub fn new(table: &'a TableSchema, target: &str, options: &EncodingConfig) -> Self {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| quote_sql(&options.identifier(&c.name)))
            .collect();
        Self {
            table,
            prefix: format!("INSERT INTO {} ({}) VALUES (", target, columns.join(", ")),
            null_marker: options.null_marker.clone(),
            quote_style: options.quote_style,
        }
    }

    /// Encode one row. `row` is the 1-based record number, for error messages.
    pub fn encode<S: AsRef<str>>(&self, row: u64, fields: &[S]) -> Result<EncodedRow> {
        let expected = self.table.column_count();
        if fields.len() != expected {
            return Err(MigrateError::Encoding {
                table: self.table.name.clone(),
                row,
                expected,
                actual: fields.len(),
            });
        }

        let mut statement = self.prefix.clone();
        let mut warnings = Vec::new();
        for (i, (column, field)) in self.table.columns.iter().zip(fields).enumerate() {
            if i > 0 {
                statement.push_str(", ");
            }
            let value = self.encode_value(column, field.as_ref(), &mut warnings);
            statement.push_str(&value);
        }
        statement.push(')');

        for w in warnings.iter_mut() {
            *w = format!("row {}: {}", row, w);
        }
        Ok(EncodedRow {
            statement,
            warnings,
        })
    }

    fn encode_value(&self, column: &ColumnSchema, field: &str, warnings: &mut Vec<String>) -> String {
        if self.null_marker.as_deref() == Some(field) {
            return "NULL".to_string();
        }

        let class = column.target_type.kind.value_class();
        if field.is_empty() {
            if column.nullable {
                return "NULL".to_string();
            }
            if class == ValueClass::Text {
                return "''".to_string();
            }
            warnings.push(format!("{}: empty value for NOT NULL column", column.name));
            return "NULL".to_string();
        }

        let valid = match class {
            ValueClass::Text => return quote_literal(field, self.quote_style),
            ValueClass::Integer if INTEGER.is_match(field) => Some(field.to_string()),
            ValueClass::Decimal if DECIMAL.is_match(field) => Some(field.to_string()),
            ValueClass::Boolean => match field.to_ascii_lowercase().as_str() {
                "true" | "1" => Some("TRUE".to_string()),
                "false" | "0" => Some("FALSE".to_string()),
                _ => None,
            },
            ValueClass::Date => NaiveDate::parse_from_str(field, "%Y-%m-%d")
                .ok()
                .map(|_| quote_literal(field, self.quote_style)),
            ValueClass::Time => NaiveTime::parse_from_str(field, "%H:%M:%S%.f")
                .ok()
                .map(|_| quote_literal(field, self.quote_style)),
            ValueClass::Timestamp => TIMESTAMP_FORMATS
                .iter()
                .any(|f| NaiveDateTime::parse_from_str(field, f).is_ok())
                .then(|| quote_literal(field, self.quote_style)),
            ValueClass::Binary if HEX.is_match(field) => Some(format!("X'{}'", field)),
            _ => None,
        };

        valid.unwrap_or_else(|| {
            warnings.push(format!(
                "{}: '{}' is not a valid {}, written as text",
                column.name, field, column.target_type.kind
            ));
            quote_literal(field, self.quote_style)
        })
    }
}

/// Quote a string literal in the given style.
pub fn quote_literal(value: &str, style: QuoteStyle) -> String {
    match style {
        QuoteStyle::Doubled => format!("'{}'", value.replace('\'', "''")),
        QuoteStyle::Backslash => format!(
            "'{}'",
            value.replace('\\', "\\\\").replace('\'', "\\'")
        ),
    }
}

/// Parse the value list of an INSERT statement back into fields.
///
/// `NULL` becomes `None`; quoted literals are unescaped; `X'..'` yields the
/// hex digits; other tokens are returned as written.
pub fn parse_values(statement: &str, style: QuoteStyle) -> std::result::Result<Vec<Option<String>>, String> {
    let upper = statement.to_ascii_uppercase();
    let start = upper
        .find(" VALUES (")
        .ok_or("statement has no VALUES list")?
        + " VALUES (".len();

    let chars: Vec<char> = statement[start..].chars().collect();
    let mut values = Vec::new();
    let mut i = 0;
    loop {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let hex = chars.get(i).is_some_and(|c| c.eq_ignore_ascii_case(&'x'))
            && chars.get(i + 1) == Some(&'\'');
        if hex {
            i += 1;
        }
        if chars.get(i) == Some(&'\'') {
            let (text, next) = read_literal(&chars, i, style)?;
            values.push(Some(text));
            i = next;
        } else {
            let begin = i;
            while i < chars.len() && chars[i] != ',' && chars[i] != ')' {
                i += 1;
            }
            let token: String = chars[begin..i].iter().collect();
            let token = token.trim();
            if token.is_empty() {
                return Err("empty value in VALUES list".to_string());
            }
            values.push(if token.eq_ignore_ascii_case("NULL") {
                None
            } else {
                Some(token.to_string())
            });
        }

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        match chars.get(i) {
            Some(',') => i += 1,
            Some(')') => return Ok(values),
            _ => return Err("unterminated VALUES list".to_string()),
        }
    }
}

fn read_literal(
    chars: &[char],
    open: usize,
    style: QuoteStyle,
) -> std::result::Result<(String, usize), String> {
    let mut text = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        let c = chars[i];
        match (style, c) {
            (QuoteStyle::Backslash, '\\') => {
                let escaped = chars.get(i + 1).ok_or("dangling escape")?;
                text.push(*escaped);
                i += 2;
            }
            (_, '\'') => {
                if style == QuoteStyle::Doubled && chars.get(i + 1) == Some(&'\'') {
                    text.push('\'');
                    i += 2;
                } else {
                    return Ok((text, i + 1));
                }
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err("unterminated string literal".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::{CdsKind, SourceType, TargetType};

    fn column(name: &str, kind: CdsKind, nullable: bool) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            source_type: SourceType::new("X", vec![]),
            target_type: TargetType::plain(kind),
            nullable,
            default: None,
            identity: false,
        }
    }

    fn t_table() -> TableSchema {
        TableSchema::new(
            "T",
            vec![
                column("ID", CdsKind::Integer, false),
                column("NAME", CdsKind::String, true),
                column("CREATED_AT", CdsKind::DateTime, true),
            ],
        )
    }

    #[test]
    fn test_escapes_quotes_and_nulls_empty() {
        let table = t_table();
        let encoder = RowEncoder::new(&table, "\"DB_T\"", &EncodingConfig::default());
        let row = encoder.encode(1, &["1", "O'Brien", ""]).unwrap();
        assert_eq!(
            row.statement,
            "INSERT INTO \"DB_T\" (\"ID\", \"NAME\", \"CREATED_AT\") VALUES (1, 'O''Brien', NULL)"
        );
        assert!(row.warnings.is_empty());
    }

    #[test]
    fn test_length_mismatch_is_encoding_error() {
        let table = t_table();
        let encoder = RowEncoder::new(&table, "\"DB_T\"", &EncodingConfig::default());
        let err = encoder.encode(7, &["1", "x"]).unwrap_err();
        match err {
            MigrateError::Encoding {
                row,
                expected,
                actual,
                ..
            } => assert_eq!((row, expected, actual), (7, 3, 2)),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(encoder.encode(8, &["1", "x", "", "extra"]).is_err());
    }

    #[test]
    fn test_value_classes() {
        let table = TableSchema::new(
            "V",
            vec![
                column("D", CdsKind::Decimal, true),
                column("B", CdsKind::Boolean, true),
                column("DAY", CdsKind::Date, true),
                column("AT", CdsKind::Time, true),
                column("BIN", CdsKind::Binary, true),
                column("TXT", CdsKind::String, false),
            ],
        );
        let encoder = RowEncoder::new(&table, "V", &EncodingConfig::default());
        let row = encoder
            .encode(1, &["-12.50", "1", "2024-02-29", "23:59:59.5", "0aFF", ""])
            .unwrap();
        assert!(row
            .statement
            .ends_with("VALUES (-12.50, TRUE, '2024-02-29', '23:59:59.5', X'0aFF', '')"));
        assert!(row.warnings.is_empty());
    }

    #[test]
    fn test_invalid_values_fall_back_to_text() {
        let table = TableSchema::new(
            "V",
            vec![
                column("N", CdsKind::Integer, true),
                column("DAY", CdsKind::Date, true),
                column("TS", CdsKind::DateTime, true),
                column("BIN", CdsKind::Binary, true),
            ],
        );
        let encoder = RowEncoder::new(&table, "V", &EncodingConfig::default());
        let row = encoder
            .encode(3, &["12a", "2023-02-30", "2024-01-05T10:11:12.1230000", "ABC"])
            .unwrap();
        assert!(row
            .statement
            .ends_with("VALUES ('12a', '2023-02-30', '2024-01-05T10:11:12.1230000', 'ABC')"));
        assert_eq!(row.warnings.len(), 3);
        assert!(row.warnings[0].starts_with("row 3: N:"));
    }

    #[test]
    fn test_non_ascii_digits_are_not_numeric() {
        let table = TableSchema::new(
            "V",
            vec![
                column("N", CdsKind::Integer, true),
                column("D", CdsKind::Decimal, true),
            ],
        );
        let encoder = RowEncoder::new(&table, "V", &EncodingConfig::default());
        let row = encoder.encode(1, &["\u{663}\u{664}", "\u{ff11}.5"]).unwrap();
        assert!(row.statement.ends_with("VALUES ('\u{663}\u{664}', '\u{ff11}.5')"));
        assert_eq!(row.warnings.len(), 2);
    }

    #[test]
    fn test_null_marker_and_not_null_numeric() {
        let table = TableSchema::new(
            "V",
            vec![
                column("N", CdsKind::Integer, false),
                column("S", CdsKind::String, false),
            ],
        );
        let options = EncodingConfig {
            null_marker: Some("\\N".into()),
            quote_style: QuoteStyle::Doubled,
            ..Default::default()
        };
        let encoder = RowEncoder::new(&table, "V", &options);
        let row = encoder.encode(1, &["", "\\N"]).unwrap();
        assert!(row.statement.ends_with("VALUES (NULL, NULL)"));
        assert_eq!(row.warnings.len(), 1);
    }

    #[test]
    fn test_round_trip_both_styles() {
        let table = t_table();
        let fields = ["42", "it's a \\ test, (really)", "2024-01-05 10:11:12"];
        for style in [QuoteStyle::Doubled, QuoteStyle::Backslash] {
            let options = EncodingConfig {
                null_marker: None,
                quote_style: style,
                ..Default::default()
            };
            let encoder = RowEncoder::new(&table, "\"DB_T\"", &options);
            let row = encoder.encode(1, &fields).unwrap();
            let values = parse_values(&row.statement, style).unwrap();
            let expected: Vec<Option<String>> =
                fields.iter().map(|f| Some(f.to_string())).collect();
            assert_eq!(values, expected, "{:?}", style);
        }
    }

    #[test]
    fn test_backslash_style_escaping() {
        assert_eq!(quote_literal(r"a'b\c", QuoteStyle::Backslash), r"'a\'b\\c'");
        assert_eq!(quote_literal(r"a'b\c", QuoteStyle::Doubled), r"'a''b\c'");
    }

    #[test]
    fn test_parse_values_nulls_and_hex() {
        let values = parse_values("INSERT INTO X (A, B, C) VALUES (NULL, X'0A', 'x')", QuoteStyle::Doubled)
            .unwrap();
        assert_eq!(values, [None, Some("0A".to_string()), Some("x".to_string())]);
        assert!(parse_values("INSERT INTO X (A) VALUES ('open", QuoteStyle::Doubled).is_err());
    }
}
