//! Translates the backend-agnostic [`Query`]/[`QueryItem`] types (and the
//! outbox/view tag predicates) into bound SQL fragments appended to a
//! [`sqlx::QueryBuilder`].
//!
//! Kept as bound parameters throughout (never string-interpolated) even
//! though event types and tag values are expected to come from trusted,
//! statically registered configuration - the query shapes here are no
//! different from user-facing filters in other stores this crate's
//! dependencies are built for.
use boundary_core::{Query, Tag, TagSet};
use sqlx::{Postgres, QueryBuilder};

/// Appends `(condition) OR (condition) OR ...` for every item in `query`,
/// or `TRUE` if `query` has no items (matches everything).
pub(crate) fn push_query<'a>(qb: &mut QueryBuilder<'a, Postgres>, query: &'a Query) {
    if query.is_empty() {
        qb.push("TRUE");
        return;
    }
    qb.push("(");
    let mut items = query.items().iter().peekable();
    while let Some(item) = items.next() {
        qb.push("(");
        push_item(qb, item.event_types().iter().map(String::as_str), item.tags());
        qb.push(")");
        if items.peek().is_some() {
            qb.push(" OR ");
        }
    }
    qb.push(")");
}

fn push_item<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    event_types: impl Iterator<Item = &'a str> + Clone,
    tags: &'a TagSet,
) {
    let mut wrote_clause = false;
    let types: Vec<&str> = event_types.collect();
    if !types.is_empty() {
        qb.push("event_type IN (");
        let mut separated = qb.separated(", ");
        for event_type in &types {
            separated.push_bind(*event_type);
        }
        qb.push(")");
        wrote_clause = true;
    }
    if !tags.is_empty() {
        if wrote_clause {
            qb.push(" AND ");
        }
        qb.push("tags @> ");
        qb.push_bind(tag_set_to_array(tags));
        qb.push("::text[]");
        wrote_clause = true;
    }
    if !wrote_clause {
        qb.push("TRUE");
    }
}

/// Renders a tag predicate (used by outbox topics and view subscriptions)
/// against the `tags` column, whose entries are `"key=value"` strings.
/// `required_tags`/`any_of_tags` match on key presence regardless of
/// value; `exact_tag_values` requires an exact `key=value` pair. An event
/// matches iff all three conditions hold; an empty predicate matches
/// everything.
pub(crate) fn push_tag_key_predicate<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    required_tags: &'a [String],
    any_of_tags: &'a [String],
    exact_tag_values: &'a [(String, String)],
) {
    let mut wrote_clause = false;
    for key in required_tags {
        if wrote_clause {
            qb.push(" AND ");
        }
        qb.push("EXISTS (SELECT 1 FROM unnest(tags) t WHERE t LIKE ");
        qb.push_bind(format!("{key}=%"));
        qb.push(")");
        wrote_clause = true;
    }
    if !any_of_tags.is_empty() {
        if wrote_clause {
            qb.push(" AND ");
        }
        qb.push("EXISTS (SELECT 1 FROM unnest(tags) t WHERE ");
        let mut separated = qb.separated(" OR ");
        for key in any_of_tags {
            separated.push("t LIKE ");
            separated.push_bind_unseparated(format!("{key}=%"));
        }
        qb.push(")");
        wrote_clause = true;
    }
    if !exact_tag_values.is_empty() {
        if wrote_clause {
            qb.push(" AND ");
        }
        qb.push("tags @> ");
        qb.push_bind(
            exact_tag_values
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<String>>(),
        );
        qb.push("::text[]");
        wrote_clause = true;
    }
    if !wrote_clause {
        qb.push("TRUE");
    }
}

fn tag_set_to_array(tags: &TagSet) -> Vec<String> {
    tags.iter().map(Tag::to_string).collect()
}

/// Derives a stable advisory-lock key from an idempotency query's tags: the
/// sorted, joined tag strings, hashed into a signed 64-bit integer so
/// concurrent callers guarding the same logical operation contend on the
/// same `pg_advisory_xact_lock` key.
pub(crate) fn advisory_lock_key(query: &Query) -> i64 {
    use md5::{Digest, Md5};

    let mut parts: Vec<String> = query
        .items()
        .iter()
        .flat_map(|item| item.tags().iter().map(Tag::to_string))
        .collect();
    parts.sort();
    parts.dedup();
    let joined = parts.join(",");

    let digest = Md5::digest(joined.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}
