//! Validation for the small set of statically named identifiers used
//! throughout the core: tag keys, processor names (outbox topic/publisher,
//! view names) and command types.
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt::{self, Display, Formatter};

/// Returns `true` if `s` is a valid identifier: it starts with a letter or
/// underscore, and contains only ASCII letters, digits, and underscores.
pub fn is_valid_identifier(s: &str) -> bool {
    lazy_static! {
        static ref RE: Regex = Regex::new("^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
    }
    RE.is_match(s)
}

/// Error returned when a string does not satisfy [`is_valid_identifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierError(String);

impl IdentifierError {
    pub(crate) fn new(s: &str) -> Self {
        IdentifierError(format!("invalid identifier: {s}"))
    }
}

impl Display for IdentifierError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IdentifierError {}

/// Validates `s` as an identifier, returning it unchanged on success.
pub fn validate_identifier(s: &str) -> Result<&str, IdentifierError> {
    if !is_valid_identifier(s) {
        return Err(IdentifierError::new(s));
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_accepts_a_valid_identifier() {
        assert!(is_valid_identifier("account_opened"));
        assert!(is_valid_identifier("_private"));
    }

    #[test]
    fn it_rejects_empty_and_spaced_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("hello world"));
    }

    #[test]
    fn it_rejects_an_identifier_starting_with_a_digit() {
        assert!(!is_valid_identifier("1topic"));
    }

    #[test]
    fn validate_identifier_surfaces_the_offending_value() {
        let err = validate_identifier("bad key").unwrap_err();
        assert_eq!(err.to_string(), "invalid identifier: bad key");
    }
}
