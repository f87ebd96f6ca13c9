//! Parser for `CREATE TABLE` scripts.
//!
//! Only the column block is interpreted. Splitting is aware of nested
//! parentheses, single-quoted literals and double-quoted identifiers, so
//! `DECIMAL(10,2)` or `DEFAULT 'a,b'` never split a clause.

use regex::Regex;
use std::sync::LazyLock;

use super::ColumnSchema;
use crate::config::DialectConfig;
use crate::error::{MigrateError, Result};
use crate::typemap::{SourceType, TypeMapper};

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCREATE\s+(?:[A-Z_]+\s+)*?TABLE\b\s*").expect("valid create table regex")
});


/// Dialect rules that steer the parser.
#[derive(Debug, Clone)]
pub struct Dialect {
    /// Upper-case word sequences, longest first.
    identity_markers: Vec<Vec<String>>,
    ignored_type_prefixes: Vec<String>,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::from_config(&DialectConfig::default())
    }
}

impl Dialect {
    pub fn new(identity_markers: &[String], ignored_type_prefixes: &[String]) -> Self {
        let mut markers: Vec<Vec<String>> = identity_markers
            .iter()
            .map(|m| m.split_whitespace().map(str::to_ascii_uppercase).collect())
            .filter(|words: &Vec<String>| !words.is_empty())
            .collect();
        markers.sort_by(|a, b| b.len().cmp(&a.len()));
        Self {
            identity_markers: markers,
            ignored_type_prefixes: ignored_type_prefixes
                .iter()
                .map(|p| p.to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn from_config(config: &DialectConfig) -> Self {
        Self::new(&config.identity_markers, &config.ignored_type_prefixes)
    }

    /// Number of tokens an identity marker occupies at `at`, if one starts there.
    fn identity_len(&self, tokens: &[Token<'_>], at: usize) -> Option<usize> {
        self.identity_markers.iter().find_map(|phrase| {
            let matched = phrase.iter().enumerate().all(|(k, word)| {
                tokens
                    .get(at + k)
                    .is_some_and(|t| t.kind == TokenKind::Word && t.text.eq_ignore_ascii_case(word))
            });
            matched.then_some(phrase.len())
        })
    }

    fn is_ignored(&self, upper: &str) -> bool {
        self.ignored_type_prefixes
            .iter()
            .any(|p| upper.starts_with(p.as_str()))
    }
}

/// Result of parsing one `CREATE TABLE` script.
#[derive(Debug, Clone)]
pub struct ParsedDdl {
    /// Table name without schema qualifier.
    pub table: String,
    /// Columns in declaration order. No primary key information.
    pub columns: Vec<ColumnSchema>,
    /// Non-fatal findings (lossy types, ignored tokens).
    pub warnings: Vec<String>,
}

/// Parse a `CREATE TABLE` script into its column list.
pub fn parse(sql: &str, dialect: &Dialect, mapper: &TypeMapper) -> Result<ParsedDdl> {
    let header = CREATE_TABLE
        .find(sql)
        .ok_or_else(|| MigrateError::parse("DDL", "no CREATE TABLE statement found"))?;
    let (table, after_name) = parse_table_name(sql, header.end())
        .ok_or_else(|| MigrateError::parse("DDL", "missing table name"))?;

    let bytes = sql.as_bytes();
    let open = skip_ws(bytes, after_name);
    if bytes.get(open) != Some(&b'(') {
        return Err(MigrateError::parse(&table, "no column definition block"));
    }
    let close = matching_paren(bytes, open)
        .ok_or_else(|| MigrateError::parse(&table, "unbalanced parentheses in column block"))?;

    let clauses =
        split_top_level(&sql[open + 1..close]).map_err(|m| MigrateError::parse(&table, m))?;

    let mut columns: Vec<ColumnSchema> = Vec::new();
    let mut warnings = Vec::new();
    for clause in clauses {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let column = parse_column(clause, dialect, mapper, &mut warnings)
            .map_err(|m| MigrateError::parse(&table, m))?;
        if let Some(column) = column {
            if columns.iter().any(|c| c.name == column.name) {
                return Err(MigrateError::parse(
                    &table,
                    format!("duplicate column {}", column.name),
                ));
            }
            columns.push(column);
        }
    }

    if columns.is_empty() {
        return Err(MigrateError::parse(&table, "column block has no columns"));
    }

    Ok(ParsedDdl {
        table,
        columns,
        warnings,
    })
}

fn parse_column(
    clause: &str,
    dialect: &Dialect,
    mapper: &TypeMapper,
    warnings: &mut Vec<String>,
) -> std::result::Result<Option<ColumnSchema>, String> {
    let tokens = tokenize(clause)?;
    let Some(first) = tokens.first() else {
        return Ok(None);
    };

    let name = match first.kind {
        TokenKind::Word => {
            if is_table_constraint(&tokens, mapper) {
                return Ok(None);
            }
            first.text.to_string()
        }
        TokenKind::QuotedIdent => unquote_ident(first.text),
        _ => return Err(format!("expected a column name in '{}'", clause)),
    };

    let type_name = match tokens.get(1) {
        Some(t)
            if t.kind == TokenKind::Word
                && t.text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            t.text
        }
        _ => return Err(format!("column {}: missing or unreadable type", name)),
    };

    let mut i = 2;
    let mut params = Vec::new();
    if let Some(group) = tokens.get(2).filter(|t| t.kind == TokenKind::Group) {
        for p in group.inner().split(',') {
            let value = p.trim().parse::<u32>().map_err(|_| {
                format!("column {}: bad type parameter '{}'", name, p.trim())
            })?;
            params.push(value);
        }
        i = 3;
    }

    let mut not_null = false;
    let mut identity = false;
    let mut default = None;
    let mut unrecognized: Vec<&str> = Vec::new();

    while i < tokens.len() {
        if let Some(len) = dialect.identity_len(&tokens, i) {
            identity = true;
            i += len;
            // identity options, e.g. (START WITH 1)
            if tokens.get(i).is_some_and(|t| t.kind == TokenKind::Group) {
                i += 1;
            }
            continue;
        }

        let token = &tokens[i];
        if token.kind != TokenKind::Word {
            unrecognized.push(token.text);
            i += 1;
            continue;
        }

        let upper = token.text.to_ascii_uppercase();
        let next = tokens.get(i + 1);
        match upper.as_str() {
            "NOT" if is_word(next, "NULL") => {
                not_null = true;
                i += 2;
            }
            "NULL" | "UNIQUE" => i += 1,
            "PRIMARY" if is_word(next, "KEY") => i += 2,
            "COMMENT" if next.is_some_and(|t| t.kind == TokenKind::Literal) => i += 2,
            "DEFAULT" => {
                let (expr, after) = default_expr(clause, &tokens, i + 1)
                    .ok_or_else(|| format!("column {}: DEFAULT without a value", name))?;
                default = Some(expr);
                i = after;
            }
            _ if dialect.is_ignored(&upper) => i += 1,
            _ => {
                unrecognized.push(token.text);
                i += 1;
            }
        }
    }

    if !unrecognized.is_empty() {
        warnings.push(format!(
            "column {}: ignored '{}'",
            name,
            unrecognized.join(" ")
        ));
    }

    let source_type = SourceType::new(type_name, params);
    let mapping = mapper.map(&source_type);
    if let Some(w) = mapping.warning {
        warnings.push(format!("column {}: {}", name, w));
    }

    Ok(Some(ColumnSchema {
        name,
        source_type,
        target_type: mapping.target,
        nullable: !not_null,
        default: if identity { None } else { default },
        identity,
    }))
}

/// Default expression starting at token `at`: the token plus any tokens glued
/// to it without whitespace, so `NOW()` and `N'x'` stay whole.
fn default_expr(clause: &str, tokens: &[Token<'_>], at: usize) -> Option<(String, usize)> {
    let first = tokens.get(at)?;
    let start = first.start;
    let mut end = first.end;
    let mut next = at + 1;
    while let Some(t) = tokens.get(next) {
        if t.start != end {
            break;
        }
        end = t.end;
        next += 1;
    }
    Some((clause[start..end].to_string(), next))
}

/// Whether a clause opening with a bare word is a table-level constraint.
///
/// `KEY`, `INDEX`, `UNIQUE` and `CHECK` are also legal column names, so they
/// only start a constraint when no known type follows and a column list does.
fn is_table_constraint(tokens: &[Token<'_>], mapper: &TypeMapper) -> bool {
    let Some(first) = tokens.first() else {
        return false;
    };
    let second = tokens.get(1);
    match first.text.to_ascii_uppercase().as_str() {
        "CONSTRAINT" => true,
        "PRIMARY" | "FOREIGN" => is_word(second, "KEY"),
        "UNIQUE" | "INDEX" | "KEY" | "CHECK" => match second {
            Some(t) if t.kind == TokenKind::Group => true,
            Some(t) if t.kind == TokenKind::Word => {
                (is_word(second, "KEY") || is_word(second, "INDEX") || !mapper.knows(t.text))
                    && tokens.iter().skip(2).any(|t| t.kind == TokenKind::Group)
            }
            _ => false,
        },
        _ => false,
    }
}

fn is_word(token: Option<&Token<'_>>, word: &str) -> bool {
    token.is_some_and(|t| t.kind == TokenKind::Word && t.text.eq_ignore_ascii_case(word))
}

fn parse_table_name(sql: &str, mut pos: usize) -> Option<(String, usize)> {
    let bytes = sql.as_bytes();
    loop {
        pos = skip_ws(bytes, pos);
        let segment;
        if bytes.get(pos) == Some(&b'"') {
            let end = skip_quoted(bytes, pos)?;
            segment = unquote_ident(&sql[pos..end]);
            pos = end;
        } else {
            let start = pos;
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || matches!(bytes[pos], b'_' | b'$' | b'#'))
            {
                pos += 1;
            }
            if pos == start {
                return None;
            }
            segment = sql[start..pos].to_string();
        }

        let after = skip_ws(bytes, pos);
        if bytes.get(after) == Some(&b'.') {
            pos = after + 1;
            continue;
        }
        return Some((segment, pos));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    QuotedIdent,
    Literal,
    Group,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    start: usize,
    end: usize,
}

impl<'a> Token<'a> {
    fn inner(&self) -> &'a str {
        &self.text[1..self.text.len() - 1]
    }
}

fn tokenize(s: &str) -> std::result::Result<Vec<Token<'_>>, String> {
    let bytes = s.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let kind = match b {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i).ok_or("unterminated quoted text")?;
                if b == b'"' {
                    TokenKind::QuotedIdent
                } else {
                    TokenKind::Literal
                }
            }
            b'(' => {
                i = matching_paren(bytes, i).ok_or("unbalanced parentheses")? + 1;
                TokenKind::Group
            }
            b')' => return Err("unbalanced parentheses".to_string()),
            _ => {
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'"' | b'\'' | b'(' | b')')
                {
                    i += 1;
                }
                TokenKind::Word
            }
        };
        tokens.push(Token {
            kind,
            text: &s[start..i],
            start,
            end: i,
        });
    }
    Ok(tokens)
}

fn split_top_level(s: &str) -> std::result::Result<Vec<&str>, String> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i).ok_or("unterminated quoted text")?;
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced parentheses".to_string());
                }
            }
            b',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return Err("unbalanced parentheses".to_string());
    }
    parts.push(&s[start..]);
    Ok(parts)
}

/// Index just past the closing quote. Doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i)?;
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn unquote_ident(quoted: &str) -> String {
    quoted[1..quoted.len() - 1].replace("\"\"", "\"")
}
