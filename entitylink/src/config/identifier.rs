//! Identifier grammar shared by collection, field and view names
//! (Design Notes §9): `[A-Za-z_][A-Za-z0-9_]*`.
//!
//! Every interpolation of one of these into a backend query (view name,
//! field name, collection name) is a potential injection vector if it
//! came from configuration (Design Notes §9 "Identifier injection into
//! queries"), so this is checked once at config-parse time rather than
//! trusted at each call site.

use crate::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

static IDENTIFIER_PATTERN: OnceLock<Regex> = OnceLock::new();

fn pattern() -> &'static Regex {
    IDENTIFIER_PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

pub fn validate_identifier(name: &str) -> Result<()> {
    if !pattern().is_match(name) {
        return Err(Error::config(format!(
            "\"{name}\" is not a valid identifier: expected [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_identifier("people").is_ok());
        assert!(validate_identifier("_internal").is_ok());
        assert!(validate_identifier("first_name2").is_ok());
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(validate_identifier("2fast").is_err());
    }

    #[test]
    fn rejects_embedded_whitespace() {
        assert!(validate_identifier("bad name").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_identifier("").is_err());
    }
}
