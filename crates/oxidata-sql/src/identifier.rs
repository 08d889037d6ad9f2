//! SQL identifier validation.
//!
//! Generated SQL carries identifiers bare, so every table, column, and alias
//! must have been validated before it reaches a statement. Values always go
//! through parameters; identifiers go through these checks.

/// Check if a string is a valid bare identifier.
///
/// Identifiers must start with a letter or underscore and contain only
/// letters, digits, and underscores.
///
/// # Examples
///
/// ```
/// use oxidata_sql::is_valid_identifier;
///
/// assert!(is_valid_identifier("Products"));
/// assert!(is_valid_identifier("total_amount"));
/// assert!(!is_valid_identifier("1st"));
/// assert!(!is_valid_identifier("drop table"));
/// ```
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check if a string is a reserved SQL keyword.
///
/// Used to refuse keywords where a column or alias name is expected.
pub fn is_sql_keyword(s: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "all", "and", "as", "asc", "between", "by", "case", "cast", "check",
        "column", "constraint", "create", "cross", "default", "delete",
        "desc", "distinct", "drop", "else", "end", "exists", "false", "from",
        "full", "group", "having", "in", "index", "inner", "insert", "into",
        "is", "join", "key", "left", "like", "limit", "not", "null", "offset",
        "on", "or", "order", "outer", "primary", "references", "right",
        "select", "set", "table", "then", "to", "true", "union", "unique",
        "update", "using", "values", "when", "where", "with",
    ];

    KEYWORDS.contains(&s.to_ascii_lowercase().as_str())
}
