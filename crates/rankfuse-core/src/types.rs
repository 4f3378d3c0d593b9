//! Core types shared by stages and composition nodes.
//!
//! - [`DocumentKey`]: opaque identifier taken from a document's key field
//! - [`ScoredRef`]: one entry of a ranked list
//! - [`RankedList`]: key-unique, ordered output of a stage for one query
//! - [`Query`] / [`Ranked`]: single-or-batch input and output shapes

use crate::error::StageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// A corpus record: open-schema JSON object.
///
/// Exactly one field, chosen when a stage is constructed, holds the unique key.
/// The engine itself never inspects any other field.
pub type Document = serde_json::Map<String, Value>;

/// Unique document identifier.
///
/// Holds the value of the corpus's key field. Integers and strings are both
/// accepted; they never compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentKey {
    /// Integer key (e.g. `{"id": 0}`)
    Int(i64),
    /// String key (e.g. `{"id": "doc-0"}`)
    Str(String),
}

impl DocumentKey {
    /// Extracts the key of `document` from `key_field`.
    ///
    /// # Errors
    ///
    /// Returns `StageError::MissingKey` if the field is absent and
    /// `StageError::InvalidKey` if it is neither a string nor an integer.
    pub fn from_document(document: &Document, key_field: &str) -> Result<Self, StageError> {
        match document.get(key_field) {
            None | Some(Value::Null) => Err(StageError::MissingKey(key_field.to_string())),
            Some(Value::String(s)) => Ok(DocumentKey::Str(s.clone())),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(DocumentKey::Int)
                .ok_or_else(|| StageError::InvalidKey(key_field.to_string())),
            Some(_) => Err(StageError::InvalidKey(key_field.to_string())),
        }
    }

    /// Converts the key back into a JSON value (used when hydrating).
    pub fn to_value(&self) -> Value {
        match self {
            DocumentKey::Int(i) => Value::from(*i),
            DocumentKey::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Int(i) => write!(f, "{}", i),
            DocumentKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for DocumentKey {
    fn from(value: i64) -> Self {
        DocumentKey::Int(value)
    }
}

impl From<i32> for DocumentKey {
    fn from(value: i32) -> Self {
        DocumentKey::Int(value.into())
    }
}

impl From<&str> for DocumentKey {
    fn from(value: &str) -> Self {
        DocumentKey::Str(value.to_string())
    }
}

impl From<String> for DocumentKey {
    fn from(value: String) -> Self {
        DocumentKey::Str(value)
    }
}

/// Concatenates the text of `fields` in `document`, separated by spaces.
///
/// Strings are used as-is, numbers and booleans are formatted, arrays are
/// flattened one level. Missing fields and other values are skipped.
pub fn field_text(document: &Document, fields: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for field in fields {
        match document.get(field) {
            Some(Value::Array(items)) => parts.extend(items.iter().filter_map(scalar_text)),
            Some(value) => parts.extend(scalar_text(value)),
            None => {}
        }
    }
    parts.join(" ")
}

/// Returns every scalar value of `fields` as a separate string.
///
/// Used by stages that treat each value (or array element) as its own phrase.
pub fn field_values(document: &Document, fields: &[String]) -> Vec<String> {
    let mut values = Vec::new();
    for field in fields {
        match document.get(field) {
            Some(Value::Array(items)) => values.extend(items.iter().filter_map(scalar_text)),
            Some(value) => values.extend(scalar_text(value)),
            None => {}
        }
    }
    values
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One entry of a ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRef {
    /// Document identifier
    pub key: DocumentKey,
    /// Similarity score, absent when the producing stage emits none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    /// Document fields, only populated by hydration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Document>,
}

impl ScoredRef {
    /// Creates an entry with a score.
    pub fn scored(key: impl Into<DocumentKey>, score: f32) -> Self {
        Self {
            key: key.into(),
            score: Some(score),
            fields: None,
        }
    }

    /// Creates an entry without a score (e.g. exact-match lookups).
    pub fn unscored(key: impl Into<DocumentKey>) -> Self {
        Self {
            key: key.into(),
            score: None,
            fields: None,
        }
    }
}

/// Ordered, key-unique sequence of scored references for one query.
///
/// Position is the rank: the first entry has rank 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedList(pub(crate) Vec<ScoredRef>);

impl RankedList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a list from entries, keeping the first occurrence of each key.
    ///
    /// Returns the list together with the number of dropped duplicates.
    pub fn dedup_from(entries: Vec<ScoredRef>) -> (Self, usize) {
        let total = entries.len();
        let mut seen: HashSet<DocumentKey> = HashSet::with_capacity(total);
        let kept: Vec<ScoredRef> = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.key.clone()))
            .collect();
        let dropped = total - kept.len();
        (Self(kept), dropped)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in rank order.
    pub fn iter(&self) -> std::slice::Iter<'_, ScoredRef> {
        self.0.iter()
    }

    /// Entries as a slice.
    pub fn as_slice(&self) -> &[ScoredRef] {
        &self.0
    }

    /// Keys in rank order.
    pub fn keys(&self) -> impl Iterator<Item = &DocumentKey> {
        self.0.iter().map(|entry| &entry.key)
    }

    /// Keys as a set, for candidate filtering.
    pub fn key_set(&self) -> HashSet<&DocumentKey> {
        self.keys().collect()
    }

    /// 1-indexed rank of `key`, if present.
    pub fn rank_of(&self, key: &DocumentKey) -> Option<usize> {
        self.0
            .iter()
            .position(|entry| &entry.key == key)
            .map(|idx| idx + 1)
    }

    /// Keeps at most `k` entries (the best-ranked ones).
    pub fn truncate(&mut self, k: usize) {
        self.0.truncate(k);
    }

    /// Consumes the list, returning its entries.
    pub fn into_vec(self) -> Vec<ScoredRef> {
        self.0
    }
}

impl FromIterator<ScoredRef> for RankedList {
    /// Collects entries, keeping the first occurrence of each key.
    fn from_iter<I: IntoIterator<Item = ScoredRef>>(iter: I) -> Self {
        Self::dedup_from(iter.into_iter().collect()).0
    }
}

impl IntoIterator for RankedList {
    type Item = ScoredRef;
    type IntoIter = std::vec::IntoIter<ScoredRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a RankedList {
    type Item = &'a ScoredRef;
    type IntoIter = std::slice::Iter<'a, ScoredRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Query input: one query or a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// A single query, answered with a single ranked list
    Single(String),
    /// A batch of queries, answered with one ranked list per element
    Batch(Vec<String>),
}

impl Query {
    /// Queries as a slice (a single query is a batch of one).
    pub fn as_batch(&self) -> &[String] {
        match self {
            Query::Single(query) => std::slice::from_ref(query),
            Query::Batch(queries) => queries,
        }
    }

    /// Returns `true` for batch input.
    pub fn is_batch(&self) -> bool {
        matches!(self, Query::Batch(_))
    }
}

impl From<&str> for Query {
    fn from(value: &str) -> Self {
        Query::Single(value.to_string())
    }
}

impl From<String> for Query {
    fn from(value: String) -> Self {
        Query::Single(value)
    }
}

impl From<Vec<String>> for Query {
    fn from(value: Vec<String>) -> Self {
        Query::Batch(value)
    }
}

impl From<Vec<&str>> for Query {
    fn from(value: Vec<&str>) -> Self {
        Query::Batch(value.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Query {
    fn from(value: &[&str]) -> Self {
        Query::Batch(value.iter().map(|q| q.to_string()).collect())
    }
}

/// Output matching the shape of the [`Query`] that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Ranked {
    /// Answer to a single query
    Single(RankedList),
    /// Answers to a batch, in input order
    Batch(Vec<RankedList>),
}

impl Ranked {
    /// Returns the single list, or `None` for batch output.
    pub fn into_single(self) -> Option<RankedList> {
        match self {
            Ranked::Single(list) => Some(list),
            Ranked::Batch(_) => None,
        }
    }

    /// Returns all lists (a single answer becomes a batch of one).
    pub fn into_batch(self) -> Vec<RankedList> {
        match self {
            Ranked::Single(list) => vec![list],
            Ranked::Batch(lists) => lists,
        }
    }
}
