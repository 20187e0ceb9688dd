//! Heuristic search over schema-unknown response graphs.
//!
//! Undocumented portal APIs return arbitrarily nested JSON with no schema
//! contract; field names drift between councils and deployments. This module
//! locates the two things a run needs inside such a graph: an address-like
//! string and the set of document identifiers.
//!
//! All shape predicates and key priorities live in `const` alias tables so
//! new field spellings can be added without touching traversal logic. The
//! first-match-wins short-circuit is expressed as an `Option` threaded up the
//! call stack, never as captured mutable state.

use std::collections::HashSet;

use serde_json::Value;

/// Address-bearing keys tried at each object node, in priority order.
///
/// This table is deliberately distinct from the labeled-text patterns used on
/// rendered pages (`reference.rs`); the two lookups drifted apart in the
/// portals themselves and are kept separate.
pub const ADDRESS_KEYS: &[&str] = &[
    "address",
    "locationAddress",
    "siteAddress",
    "propertyAddress",
];

/// Identifier aliases tried on a document-shaped record, in priority order.
/// When a record exposes more than one, the first alias in this table wins.
pub const DOC_ID_ALIASES: &[&str] = &["documentId", "documentID", "fileId", "id"];

/// Alias fields that, alongside an `id` field, mark an object as
/// document-shaped.
const DOC_SHAPE_ALIASES: &[&str] = &["documentId", "documentID", "fileId"];

/// Top-level keys known to hold document collections.
pub const DOC_CONTAINER_KEYS: &[&str] = &[
    "documents",
    "applicationDocuments",
    "files",
    "attachments",
    "applicationFiles",
    "docs",
];

/// A document identifier discovered in a response graph.
///
/// Identifier uniqueness is not guaranteed by the source; callers receive an
/// already-deduplicated list from [`find_document_ids`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Opaque document identifier, stringified from the source scalar.
    pub id: String,
    /// Dotted path to the record that produced the identifier, for logs.
    pub source_hint: Option<String>,
}

impl DocumentRef {
    fn new(id: String, source_hint: String) -> Self {
        Self {
            id,
            source_hint: Some(source_hint),
        }
    }
}

/// Finds the first address-like string in the graph.
///
/// At each object node the keys in [`ADDRESS_KEYS`] are tried in order before
/// descending into child values, so a shallow hit always beats a deeper one
/// and an earlier key beats a later key at the same node. The first hit
/// anywhere in the traversal short-circuits the rest.
#[must_use]
pub fn find_address(node: &Value) -> Option<String> {
    match node {
        Value::Object(map) => {
            for key in ADDRESS_KEYS {
                if let Some(Value::String(address)) = map.get(*key) {
                    return Some(address.clone());
                }
            }
            map.values().find_map(find_address)
        }
        Value::Array(items) => items.iter().find_map(find_address),
        _ => None,
    }
}

/// Finds every document identifier in the graph.
///
/// Two complementary passes, unioned then deduplicated (first-seen order
/// preserved):
///
/// 1. **Shape match** — every object in the graph is tested for a
///    document-like shape (an `id` field plus one of the known alias
///    fields); array elements are shape-tested and recursed the same way.
/// 2. **Known containers** — top-level keys in [`DOC_CONTAINER_KEYS`] holding
///    a sequence contribute the identifier alias of each element.
///
/// Both passes are deterministic for a given graph. An empty result means
/// the source exposes no documents; callers treat that as a normal terminal
/// case, not an error.
#[must_use]
pub fn find_document_ids(node: &Value) -> Vec<DocumentRef> {
    let mut refs = Vec::new();

    collect_shaped(node, &mut String::new(), &mut refs);

    if let Value::Object(map) = node {
        for container in DOC_CONTAINER_KEYS {
            let Some(Value::Array(items)) = map.get(*container) else {
                continue;
            };
            for (index, item) in items.iter().enumerate() {
                if let Value::Object(record) = item
                    && let Some(id) = extract_id_alias(record)
                {
                    refs.push(DocumentRef::new(id, format!("{container}[{index}]")));
                }
            }
        }
    }

    dedup_refs(refs)
}

/// Recursive shape-match pass. `path` tracks the dotted location for hints.
fn collect_shaped(node: &Value, path: &mut String, refs: &mut Vec<DocumentRef>) {
    match node {
        Value::Object(map) => {
            if looks_like_document(map)
                && let Some(id) = extract_id_alias(map)
            {
                let hint = if path.is_empty() { "$" } else { path.as_str() };
                refs.push(DocumentRef::new(id, hint.to_string()));
            }
            for (key, child) in map {
                let saved = path.len();
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(key);
                collect_shaped(child, path, refs);
                path.truncate(saved);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let saved = path.len();
                path.push_str(&format!("[{index}]"));
                collect_shaped(item, path, refs);
                path.truncate(saved);
            }
        }
        _ => {}
    }
}

/// An object "looks like a document" when it carries an `id` field and at
/// least one of the known document-id alias fields.
fn looks_like_document(map: &serde_json::Map<String, Value>) -> bool {
    map.contains_key("id") && DOC_SHAPE_ALIASES.iter().any(|alias| map.contains_key(*alias))
}

/// Extracts the identifier from a record, first alias in table order wins.
/// Only scalar identifiers count; nested values are ignored.
fn extract_id_alias(map: &serde_json::Map<String, Value>) -> Option<String> {
    DOC_ID_ALIASES.iter().find_map(|alias| match map.get(*alias) {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

fn dedup_refs(refs: Vec<DocumentRef>) -> Vec<DocumentRef> {
    let mut seen = HashSet::new();
    refs.into_iter()
        .filter(|document| seen.insert(document.id.clone()))
        .collect()
}
