//! Identifier and operator checks applied before any SQL text is assembled.

use crate::domain::error::{ProxyError, ProxyResult};

/// Comparison operators accepted in strict mode, in their emitted (lower-case) form.
pub const ALLOWED_OPERATORS: &[&str] = &[
    "=", "!=", "<>", "<", "<=", ">", ">=", "like", "ilike", "not like", "not ilike",
];

/// Key words PostgreSQL never accepts as a bare column or table name
/// (categories "reserved" and "reserved, can be function or type").
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
    "column", "concurrently", "constraint", "create", "cross", "current_catalog",
    "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
    "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
    "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant",
    "group", "having", "ilike", "in", "initially", "inner", "intersect", "into", "is",
    "isnull", "join", "lateral", "leading", "left", "like", "limit", "localtime",
    "localtimestamp", "natural", "not", "notnull", "null", "offset", "on", "only", "or",
    "order", "outer", "overlaps", "placing", "primary", "references", "returning", "right",
    "select", "session_user", "similar", "some", "symmetric", "system_user", "table",
    "tablesample", "then", "to", "trailing", "true", "union", "unique", "user", "using",
    "variadic", "verbose", "when", "where", "window", "with",
];

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn ensure_ident(ident: &str, what: &str) -> ProxyResult<()> {
    if validate_ident(ident) {
        Ok(())
    } else {
        Err(ProxyError::validation(format!(
            "invalid {} identifier '{}'",
            what, ident
        )))
    }
}

pub fn is_reserved_word(ident: &str) -> bool {
    RESERVED_WORDS.contains(&ident.to_ascii_lowercase().as_str())
}

/// Renders a validated identifier for SQL text. Reserved words are quoted in
/// their folded (lower-case) form, so they name the same column an unquoted
/// identifier would; everything else is emitted as written.
pub fn sql_ident(ident: &str) -> String {
    if is_reserved_word(ident) {
        format!("\"{}\"", ident.to_ascii_lowercase())
    } else {
        ident.to_string()
    }
}

/// The name the catalog stores for `ident`: unquoted identifiers fold to
/// lower case, a double-quoted one keeps its case.
pub fn fold_ident(ident: &str) -> String {
    let ident = ident.trim();
    match ident
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(quoted) if !quoted.is_empty() => quoted.replace("\"\"", "\""),
        _ => ident.to_ascii_lowercase(),
    }
}

/// Accepts `*` or a comma-separated list of identifiers, and returns it with
/// whitespace normalized (`id, name` -> `id,name`).
pub fn normalize_column_list(columns: &str) -> ProxyResult<String> {
    let trimmed = columns.trim();
    if trimmed == "*" {
        return Ok("*".to_string());
    }
    let mut out = Vec::new();
    for part in trimmed.split(',') {
        let part = part.trim();
        ensure_ident(part, "column")?;
        out.push(sql_ident(part));
    }
    Ok(out.join(","))
}

/// Lower-cases and collapses whitespace, then checks the allow-list.
pub fn normalize_operator(op: &str) -> ProxyResult<String> {
    let normalized = op
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if ALLOWED_OPERATORS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(ProxyError::validation(format!(
            "operator '{}' is not allowed",
            op
        )))
    }
}

/// Pattern operators compare text; their placeholders are never cast.
pub fn is_pattern_operator(op: &str) -> bool {
    let op = op.to_lowercase();
    op.ends_with("like")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idents() {
        assert!(validate_ident("tickets"));
        assert!(validate_ident("_kb_articles2"));
        assert!(!validate_ident(""));
        assert!(!validate_ident("2tickets"));
        assert!(!validate_ident("tickets; DROP TABLE users"));
        assert!(!validate_ident("public.tickets"));
        assert!(!validate_ident("título"));
    }

    #[test]
    fn column_lists() {
        assert_eq!(normalize_column_list(" * ").unwrap(), "*");
        assert_eq!(normalize_column_list("id, name").unwrap(), "id,name");
        assert!(normalize_column_list("id,").is_err());
        assert!(normalize_column_list("count(*)").is_err());
        assert_eq!(normalize_column_list("id, order, User").unwrap(), "id,\"order\",\"user\"");
    }

    #[test]
    fn reserved_words_are_quoted() {
        assert_eq!(sql_ident("status"), "status");
        assert_eq!(sql_ident("DueAt"), "DueAt");
        assert_eq!(sql_ident("desc"), "\"desc\"");
        assert_eq!(sql_ident("Order"), "\"order\"");
        assert!(!is_reserved_word("name"));
    }

    #[test]
    fn folding_matches_catalog_names() {
        assert_eq!(fold_ident("DueAt"), "dueat");
        assert_eq!(fold_ident(" status "), "status");
        assert_eq!(fold_ident("\"DueAt\""), "DueAt");
        assert_eq!(fold_ident("\"say \"\"hi\"\"\""), "say \"hi\"");
    }

    #[test]
    fn operators() {
        assert_eq!(normalize_operator("ILIKE").unwrap(), "ilike");
        assert_eq!(normalize_operator(" not   like ").unwrap(), "not like");
        assert_eq!(normalize_operator(">=").unwrap(), ">=");
        assert!(normalize_operator("= 1 OR 1 =").is_err());
        assert!(normalize_operator("").is_err());
        assert!(is_pattern_operator("not ilike"));
        assert!(!is_pattern_operator("="));
    }
}
