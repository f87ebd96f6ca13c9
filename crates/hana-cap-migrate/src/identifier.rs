//! Identifier quoting for generated SQL and CDS text.

/// Quote an identifier for HANA/PostgreSQL SQL, doubling embedded quotes.
pub fn quote_sql(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualified table reference, e.g. `"SHOP"."DB_ORDERS"`.
pub fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", quote_sql(s), quote_sql(table)),
        None => quote_sql(table),
    }
}

/// Render a name as a CDS identifier, using `![...]` delimiters when the
/// name is not a plain identifier.
pub fn cds_ident(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if plain {
        name.to_string()
    } else {
        format!("![{}]", name.replace(']', "]]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_sql() {
        assert_eq!(quote_sql("ORDERS"), "\"ORDERS\"");
        assert_eq!(quote_sql("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified_table(Some("SHOP"), "DB_T"), "\"SHOP\".\"DB_T\"");
        assert_eq!(qualified_table(None, "DB_T"), "\"DB_T\"");
    }

    #[test]
    fn test_cds_ident() {
        assert_eq!(cds_ident("ORDER_ID"), "ORDER_ID");
        assert_eq!(cds_ident("_x1"), "_x1");
        assert_eq!(cds_ident("/BIC/ZSALES"), "![/BIC/ZSALES]");
        assert_eq!(cds_ident("1ST"), "![1ST]");
        assert_eq!(cds_ident("a]b"), "![a]]b]");
    }
}
