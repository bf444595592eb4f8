use crate::{ColdQueryError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// PostgreSQL truncates identifiers longer than NAMEDATALEN - 1
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[a-zA-Z_][a-zA-Z0-9_$"]*$"#).unwrap()
});

/// Check a single, unqualified identifier
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ColdQueryError::invalid_identifier(
            name,
            format!("exceeds the maximum length of {} characters", MAX_IDENTIFIER_LENGTH),
        ));
    }
    if name.contains('.') {
        return Err(ColdQueryError::invalid_identifier(
            name,
            "cannot contain a dot; pass the schema separately",
        ));
    }
    if !IDENTIFIER_PATTERN.is_match(name) {
        return Err(ColdQueryError::invalid_identifier(
            name,
            format!("contains invalid characters, must match {}", IDENTIFIER_PATTERN.as_str()),
        ));
    }
    Ok(())
}

/// Validate and double-quote an identifier, doubling embedded quotes
pub fn sanitize_identifier(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// `"schema"."table"` or `"table"`
pub fn sanitize_table_name(table: &str, schema: Option<&str>) -> Result<String> {
    let table = sanitize_identifier(table)?;
    match schema {
        Some(schema) => Ok(format!("{}.{}", sanitize_identifier(schema)?, table)),
        None => Ok(table),
    }
}

/// `"table"."column"` or `"column"`
pub fn sanitize_column_ref(column: &str, table: Option<&str>) -> Result<String> {
    let column = sanitize_identifier(column)?;
    match table {
        Some(table) => Ok(format!("{}.{}", sanitize_identifier(table)?, column)),
        None => Ok(column),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("users").unwrap(), "\"users\"");
        assert_eq!(sanitize_identifier("_tmp$1").unwrap(), "\"_tmp$1\"");
        assert_eq!(sanitize_identifier("my\"table").unwrap(), "\"my\"\"table\"");
    }

    #[test]
    fn test_rejects_invalid_identifiers() {
        for name in ["", "1users", "users; DROP TABLE users", "public.users", "na me", "über"] {
            let err = sanitize_identifier(name).unwrap_err();
            assert_eq!(err.kind(), "invalid_identifier", "{name} should be rejected");
        }

        let long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(sanitize_identifier(&long).unwrap_err().to_string().contains("maximum length"));
        assert!(sanitize_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
    }

    #[test]
    fn test_qualified_names() {
        assert_eq!(sanitize_table_name("users", None).unwrap(), "\"users\"");
        assert_eq!(sanitize_table_name("users", Some("app")).unwrap(), "\"app\".\"users\"");
        assert_eq!(sanitize_column_ref("id", Some("users")).unwrap(), "\"users\".\"id\"");
        assert!(sanitize_table_name("users", Some("bad schema")).is_err());
    }
}
