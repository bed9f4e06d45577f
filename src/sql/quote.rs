// ABOUTME: Identifier and literal quoting for generated PostgreSQL text
// ABOUTME: Double-quoted identifiers, single-quoted string literals

/// Quote a PostgreSQL identifier (table, column, alias)
///
/// Escapes embedded quotes and wraps the identifier in double quotes.
///
/// # Examples
///
/// ```
/// use entity_replicator::sql::quote_ident;
/// assert_eq!(quote_ident("user"), "\"user\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('"');
    for ch in identifier.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Quote a SQL string literal
///
/// Escapes single quotes by doubling them and wraps the string in single quotes.
///
/// # Examples
///
/// ```
/// use entity_replicator::sql::quote_literal;
/// assert_eq!(quote_literal("foo"), "'foo'");
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// assert_eq!(quote_literal(""), "''");
/// ```
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push('\'');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

/// `"alias"."column"`
pub fn column_ref(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(alias), quote_ident(column))
}

/// `"table" AS "alias"`
pub fn table_as(table: &str, alias: &str) -> String {
    format!("{} AS {}", quote_ident(table), quote_ident(alias))
}
