//! Tags are the dynamic, runtime vocabulary the store matches queries and
//! append conditions against. Unlike a compile-time domain identifier, a
//! [`Tag`] is just a `key=value` pair; what keys and values mean is entirely
//! up to the caller.
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use crate::identifier::validate_identifier;

/// A single `key=value` tag attached to an event.
///
/// The key must be a valid identifier (see [`crate::identifier`]); the value
/// is an arbitrary, non-empty string. Tags serialize to and from the
/// `"key=value"` wire form used by the `tags text[]` column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Creates a new tag, validating the key.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, TagError> {
        let key = key.into();
        let value = value.into();
        validate_identifier(&key).map_err(|_| TagError::InvalidKey(key.clone()))?;
        if value.is_empty() {
            return Err(TagError::EmptyValue(key));
        }
        Ok(Self { key, value })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Error returned when constructing or parsing a [`Tag`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("invalid tag key: {0}")]
    InvalidKey(String),
    #[error("tag value for key {0} must not be empty")]
    EmptyValue(String),
    #[error("malformed tag, expected key=value: {0}")]
    Malformed(String),
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

impl std::str::FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| TagError::Malformed(s.to_string()))?;
        Tag::new(key, value)
    }
}

/// An ordered, deduplicated set of tags.
pub type TagSet = BTreeSet<Tag>;

/// Builds a [`TagSet`] from `(key, value)` pairs, panicking on an invalid key.
///
/// Intended for tests and call sites with statically known, trusted tags;
/// use [`Tag::new`] directly when keys come from untrusted input.
pub fn tags(pairs: impl IntoIterator<Item = (&'static str, String)>) -> TagSet {
    pairs
        .into_iter()
        .map(|(k, v)| Tag::new(k, v).expect("static tag key must be valid"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_formats_as_key_equals_value() {
        let tag = Tag::new("account_id", "acc-1").unwrap();
        assert_eq!(tag.to_string(), "account_id=acc-1");
    }

    #[test]
    fn it_rejects_an_invalid_key() {
        let err = Tag::new("account id", "acc-1").unwrap_err();
        assert_eq!(err, TagError::InvalidKey("account id".into()));
    }

    #[test]
    fn it_rejects_an_empty_value() {
        let err = Tag::new("account_id", "").unwrap_err();
        assert_eq!(err, TagError::EmptyValue("account_id".into()));
    }

    #[test]
    fn it_parses_from_the_wire_form() {
        let tag: Tag = "account_id=acc-1".parse().unwrap();
        assert_eq!(tag, Tag::new("account_id", "acc-1").unwrap());
    }

    #[test]
    fn it_rejects_a_malformed_wire_form() {
        let err = "no-equals-sign".parse::<Tag>().unwrap_err();
        assert_eq!(err, TagError::Malformed("no-equals-sign".into()));
    }

    #[test]
    fn tag_set_orders_and_deduplicates() {
        let set = tags([("b", "2".into()), ("a", "1".into()), ("a", "1".into())]);
        assert_eq!(set.len(), 2);
        let keys: Vec<_> = set.iter().map(Tag::key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
