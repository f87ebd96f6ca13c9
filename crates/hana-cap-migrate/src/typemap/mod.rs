//! Type mapping between HANA column types and CDS types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum length CDS accepts for `String(n)` and `Binary(n)`.
pub const MAX_LENGTH: u32 = 5000;
/// Maximum precision for `Decimal(p,s)`.
pub const MAX_PRECISION: u32 = 38;

/// CDS built-in types the migration can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CdsKind {
    String,
    LargeString,
    Integer,
    Integer64,
    Decimal,
    Double,
    Boolean,
    Date,
    Time,
    DateTime,
    Timestamp,
    Binary,
    LargeBinary,
}

impl CdsKind {
    /// Whether the type takes a length parameter.
    pub fn has_length(self) -> bool {
        matches!(self, CdsKind::String | CdsKind::Binary)
    }

    /// How values of this type are validated and written in INSERT statements.
    pub fn value_class(self) -> ValueClass {
        match self {
            CdsKind::Integer | CdsKind::Integer64 => ValueClass::Integer,
            CdsKind::Decimal | CdsKind::Double => ValueClass::Decimal,
            CdsKind::Boolean => ValueClass::Boolean,
            CdsKind::Date => ValueClass::Date,
            CdsKind::Time => ValueClass::Time,
            CdsKind::DateTime | CdsKind::Timestamp => ValueClass::Timestamp,
            CdsKind::Binary | CdsKind::LargeBinary => ValueClass::Binary,
            CdsKind::String | CdsKind::LargeString => ValueClass::Text,
        }
    }

    fn name(self) -> &'static str {
        match self {
            CdsKind::String => "String",
            CdsKind::LargeString => "LargeString",
            CdsKind::Integer => "Integer",
            CdsKind::Integer64 => "Integer64",
            CdsKind::Decimal => "Decimal",
            CdsKind::Double => "Double",
            CdsKind::Boolean => "Boolean",
            CdsKind::Date => "Date",
            CdsKind::Time => "Time",
            CdsKind::DateTime => "DateTime",
            CdsKind::Timestamp => "Timestamp",
            CdsKind::Binary => "Binary",
            CdsKind::LargeBinary => "LargeBinary",
        }
    }
}

impl fmt::Display for CdsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value encoding class used by the row encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Integer,
    Decimal,
    Boolean,
    Date,
    Time,
    Timestamp,
    Binary,
    Text,
}

/// A source column type as written in the DDL, e.g. `DECIMAL(10,2)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceType {
    /// Upper-case type name.
    pub name: String,
    /// Parenthesized parameters in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<u32>,
}

impl SourceType {
    pub fn new(name: impl Into<String>, params: Vec<u32>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            params,
        }
    }

    pub fn length(&self) -> Option<u32> {
        self.params.first().copied()
    }

    pub fn precision(&self) -> Option<u32> {
        self.params.first().copied()
    }

    pub fn scale(&self) -> Option<u32> {
        self.params.get(1).copied()
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(u32::to_string).collect();
            write!(f, "({})", params.join(","))?;
        }
        Ok(())
    }
}

/// A CDS type with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetType {
    pub kind: CdsKind,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl TargetType {
    pub fn plain(kind: CdsKind) -> Self {
        Self {
            kind,
            length: None,
            precision: None,
            scale: None,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(len) = self.length {
            write!(f, "({})", len)?;
        } else if let Some(p) = self.precision {
            match self.scale {
                Some(s) => write!(f, "({},{})", p, s)?,
                None => write!(f, "({})", p)?,
            }
        }
        Ok(())
    }
}

/// Result of mapping one source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// The target CDS type.
    pub target: TargetType,
    /// Set when the mapping is lossy or fell back.
    pub warning: Option<String>,
}

impl TypeMapping {
    fn exact(target: TargetType) -> Self {
        Self {
            target,
            warning: None,
        }
    }
}

/// Table-driven HANA to CDS type mapper.
#[derive(Debug, Clone)]
pub struct TypeMapper {
    table: BTreeMap<String, CdsKind>,
    fallback: CdsKind,
}

impl Default for TypeMapper {
    fn default() -> Self {
        let table = DEFAULT_TABLE
            .iter()
            .map(|(name, kind)| (name.to_string(), *kind))
            .collect();
        Self {
            table,
            fallback: CdsKind::String,
        }
    }
}

const DEFAULT_TABLE: &[(&str, CdsKind)] = &[
    // Character types
    ("NVARCHAR", CdsKind::String),
    ("VARCHAR", CdsKind::String),
    ("NCHAR", CdsKind::String),
    ("CHAR", CdsKind::String),
    ("ALPHANUM", CdsKind::String),
    ("SHORTTEXT", CdsKind::String),
    // Date/time types
    ("SECONDDATE", CdsKind::DateTime),
    ("LONGDATE", CdsKind::DateTime),
    ("TIMESTAMP", CdsKind::DateTime),
    ("DATE", CdsKind::Date),
    ("TIME", CdsKind::Time),
    // Integer types
    ("BIGINT", CdsKind::Integer64),
    ("INTEGER", CdsKind::Integer),
    ("INT", CdsKind::Integer),
    ("SMALLINT", CdsKind::Integer),
    ("TINYINT", CdsKind::Integer),
    // Exact and approximate numerics
    ("DECIMAL", CdsKind::Decimal),
    ("SMALLDECIMAL", CdsKind::Decimal),
    ("DOUBLE", CdsKind::Double),
    ("REAL", CdsKind::Double),
    ("FLOAT", CdsKind::Double),
    // Binary types
    ("BINARY", CdsKind::Binary),
    ("VARBINARY", CdsKind::Binary),
    ("BLOB", CdsKind::LargeBinary),
    // Large objects
    ("CLOB", CdsKind::LargeString),
    ("NCLOB", CdsKind::LargeString),
    ("TEXT", CdsKind::LargeString),
    ("BOOLEAN", CdsKind::Boolean),
];

impl TypeMapper {
    /// Build a mapper from the default table plus overrides.
    pub fn new(overrides: &BTreeMap<String, CdsKind>, fallback: CdsKind) -> Self {
        let mut mapper = Self::default();
        for (name, kind) in overrides {
            mapper.table.insert(name.to_uppercase(), *kind);
        }
        mapper.fallback = fallback;
        mapper
    }

    /// Build a mapper from the dialect configuration.
    pub fn from_config(dialect: &crate::config::DialectConfig) -> Self {
        Self::new(&dialect.type_overrides, dialect.fallback_type)
    }

    /// Target type used for unknown or undeclared source types.
    pub fn fallback(&self) -> TargetType {
        TargetType::plain(self.fallback)
    }

    /// Whether `name` is a source type with a mapping of its own.
    pub fn knows(&self, name: &str) -> bool {
        self.table.contains_key(&name.to_uppercase())
    }

    /// Map a source type. Never fails: unknown names use the fallback type.
    pub fn map(&self, source: &SourceType) -> TypeMapping {
        let Some(kind) = self.table.get(&source.name.to_uppercase()).copied() else {
            return TypeMapping {
                target: TargetType::plain(self.fallback),
                warning: Some(format!(
                    "unknown type {}, mapped to {}",
                    source, self.fallback
                )),
            };
        };

        match kind {
            CdsKind::String | CdsKind::Binary => match source.length() {
                Some(len) if len > MAX_LENGTH => TypeMapping {
                    target: TargetType {
                        length: Some(MAX_LENGTH),
                        ..TargetType::plain(kind)
                    },
                    warning: Some(format!(
                        "{} length {} exceeds {}, clamped",
                        source.name, len, MAX_LENGTH
                    )),
                },
                Some(len) => TypeMapping::exact(TargetType {
                    length: Some(len),
                    ..TargetType::plain(kind)
                }),
                None => TypeMapping::exact(TargetType::plain(kind)),
            },
            CdsKind::Decimal => map_decimal(source),
            _ => TypeMapping::exact(TargetType::plain(kind)),
        }
    }
}

fn map_decimal(source: &SourceType) -> TypeMapping {
    let Some(precision) = source.precision() else {
        return TypeMapping::exact(TargetType::plain(CdsKind::Decimal));
    };

    let mut warnings = Vec::new();
    let p = if precision > MAX_PRECISION {
        warnings.push(format!(
            "precision {} exceeds {}, clamped",
            precision, MAX_PRECISION
        ));
        MAX_PRECISION
    } else {
        precision
    };
    let s = source.scale().map(|scale| {
        if scale > p {
            warnings.push(format!("scale {} exceeds precision {}, clamped", scale, p));
            p
        } else {
            scale
        }
    });

    TypeMapping {
        target: TargetType {
            kind: CdsKind::Decimal,
            length: None,
            precision: Some(p),
            scale: s,
        },
        warning: if warnings.is_empty() {
            None
        } else {
            Some(format!("{}: {}", source, warnings.join("; ")))
        },
    }
}
