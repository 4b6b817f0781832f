//! SQL identifier validation.
//!
//! Table and column names are interpolated into generated SQL, so every name
//! that reaches a query must pass [`validate_identifier`] first.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Returns `Ok(())` if `name` is a plain, unquoted SQL identifier.
pub fn validate_identifier(name: &str) -> Result<(), CoreError> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier(name.to_string()))
    }
}
