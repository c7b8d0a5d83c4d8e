//! Runtime queries over the event log.
//!
//! A [`Query`] is the dynamic counterpart of the compile-time `StreamQuery`
//! pattern other event-sourcing cores build on top of a typed event schema:
//! here, event types and tags are plain strings discovered at runtime, so a
//! query is just data - an ordered list of [`QueryItem`]s - rather than a
//! type parameterized over the event enum.
use std::collections::BTreeSet;

use crate::event::NewEvent;
use crate::tag::{Tag, TagSet};

/// One clause of a [`Query`]: matches an event whose type is in
/// `event_types` (or any type, if empty) AND whose tag set is a superset of
/// `tags`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryItem {
    event_types: BTreeSet<String>,
    tags: TagSet,
}

impl QueryItem {
    pub fn new(event_types: impl IntoIterator<Item = String>, tags: TagSet) -> Self {
        Self {
            event_types: event_types.into_iter().collect(),
            tags,
        }
    }

    pub fn event_types(&self) -> &BTreeSet<String> {
        &self.event_types
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Returns `true` if `event_type`/`event_tags` satisfy this clause.
    pub fn matches(&self, event_type: &str, event_tags: &TagSet) -> bool {
        let type_matches = self.event_types.is_empty() || self.event_types.contains(event_type);
        type_matches && event_tags.is_superset(&self.tags)
    }
}

/// An ordered disjunction of [`QueryItem`]s. An event matches the query iff
/// it matches at least one item; a query with no items matches every event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    items: Vec<QueryItem>,
}

impl Query {
    /// The query matching every event.
    pub fn all() -> Self {
        Self { items: Vec::new() }
    }

    pub fn new(items: impl IntoIterator<Item = QueryItem>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// A query matching any event carrying all of `tags`, of any type.
    pub fn by_tags(tags: TagSet) -> Self {
        Self {
            items: vec![QueryItem::new(std::iter::empty(), tags)],
        }
    }

    /// A query matching any event of `event_type`, regardless of tags.
    pub fn by_type(event_type: impl Into<String>) -> Self {
        Self {
            items: vec![QueryItem::new(
                std::iter::once(event_type.into()),
                TagSet::new(),
            )],
        }
    }

    pub fn items(&self) -> &[QueryItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn matches(&self, event_type: &str, event_tags: &TagSet) -> bool {
        self.items.is_empty() || self.items.iter().any(|i| i.matches(event_type, event_tags))
    }

    /// Returns `true` if `event` matches this query.
    pub fn matches_event(&self, event: &NewEvent) -> bool {
        self.matches(event.event_type(), event.tags())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::tags;

    #[test]
    fn empty_query_matches_everything() {
        let q = Query::all();
        assert!(q.matches("AnyEvent", &TagSet::new()));
    }

    #[test]
    fn item_requires_tag_superset() {
        let item = QueryItem::new(std::iter::empty(), tags([("account_id", "acc-1".into())]));
        let event_tags = tags([
            ("account_id", "acc-1".into()),
            ("currency", "USD".into()),
        ]);
        assert!(item.matches("AmountDeposited", &event_tags));
        assert!(!item.matches("AmountDeposited", &tags([("account_id", "acc-2".into())])));
    }

    #[test]
    fn item_restricts_by_event_type_when_given() {
        let item = QueryItem::new(
            [String::from("AmountDeposited")],
            tags([("account_id", "acc-1".into())]),
        );
        let event_tags = tags([("account_id", "acc-1".into())]);
        assert!(item.matches("AmountDeposited", &event_tags));
        assert!(!item.matches("AmountWithdrawn", &event_tags));
    }

    #[test]
    fn query_matches_if_any_item_matches() {
        let q = Query::new([
            QueryItem::new([String::from("A")], TagSet::new()),
            QueryItem::new([String::from("B")], TagSet::new()),
        ]);
        assert!(q.matches("A", &TagSet::new()));
        assert!(q.matches("B", &TagSet::new()));
        assert!(!q.matches("C", &TagSet::new()));
    }
}
