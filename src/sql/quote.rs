//! MySQL quoting rules.
//!
//! Every identifier that reaches generated SQL goes through
//! [`quote_identifier`], every string value through [`quote_literal`].

use crate::core::{Result, ViewError};

/// Longest identifier MySQL accepts, in characters.
pub const MAX_IDENTIFIER_LEN: usize = 64;

pub fn validate_identifier(name: &str) -> Result<()> {
    let invalid = |reason: &str| Err(ViewError::InvalidIdentifier(name.to_string(), reason.to_string()));

    if name.is_empty() {
        return invalid("identifier is empty");
    }
    if name.chars().count() > MAX_IDENTIFIER_LEN {
        return invalid("identifier is longer than 64 characters");
    }
    if name.contains('\0') {
        return invalid("identifier contains NUL");
    }
    if name.ends_with(' ') {
        return invalid("identifier ends with a space");
    }
    Ok(())
}

/// Backtick-quote an identifier, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// `table`.`column`
pub fn quote_qualified(table: &str, column: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_identifier(table)?, quote_identifier(column)?))
}

/// Single-quote a string literal.
///
/// Quotes are doubled, not backslash-escaped: `''` stays inside the literal
/// whether or not the session runs with `NO_BACKSLASH_ESCAPES`.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Escape `LIKE` wildcards so `value` matches literally.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
