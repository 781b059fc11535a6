//! Engine query predicates and the filter compiler seam.
//!
//! A [`Query`] is an engine query DSL object attached verbatim to search and
//! delete-by-query bodies. Storage builds the exact-match queries it needs
//! itself; caller-supplied filter expressions are compiled by a [`Filterer`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// An engine query predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Value);

impl Query {
    /// Wraps a raw query DSL object.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Matches every document.
    pub fn match_all() -> Self {
        Self(json!({ "match_all": {} }))
    }

    /// Exact match of a keyword field.
    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Self(json!({ "term": { field: value.into() } }))
    }

    /// Exact match of a keyword field against any of `values`.
    pub fn terms<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self(json!({ "terms": { field: values } }))
    }

    /// Conjunction of queries. A single query is returned unchanged.
    pub fn all_of(mut queries: Vec<Query>) -> Self {
        if queries.len() == 1 {
            return queries.remove(0);
        }
        let must: Vec<Value> = queries.into_iter().map(|q| q.0).collect();
        Self(json!({ "bool": { "must": must } }))
    }

    /// Returns the raw query DSL object.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the query, returning the raw DSL object.
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// A filter expression could not be compiled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FilterError {
    /// Compiler diagnostic.
    pub message: String,
}

impl FilterError {
    /// Creates a filter error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Compiles caller filter expressions into engine queries.
pub trait Filterer: Send + Sync {
    /// Parses a filter expression such as `kind == "VULNERABILITY"`.
    fn parse_expression(&self, filter: &str) -> Result<Query, FilterError>;
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

/// Sort on a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOptions {
    /// Field to sort on.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortOptions {
    /// Sorts ascending on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Sorts descending on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Renders the engine sort clause.
    pub fn to_value(&self) -> Value {
        json!([{ self.field.as_str(): { "order": self.direction.to_string() } }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_query() {
        let query = Query::term("name", "projects/p1");
        assert_eq!(
            query.into_value(),
            json!({"term": {"name": "projects/p1"}})
        );
    }

    #[test]
    fn test_terms_query() {
        let query = Query::terms("name", ["a", "b"]);
        assert_eq!(query.as_value(), &json!({"terms": {"name": ["a", "b"]}}));
    }

    #[test]
    fn test_all_of() {
        let single = Query::all_of(vec![Query::match_all()]);
        assert_eq!(single, Query::match_all());

        let both = Query::all_of(vec![Query::term("a", 1), Query::term("b", 2)]);
        assert_eq!(
            both.into_value(),
            json!({"bool": {"must": [{"term": {"a": 1}}, {"term": {"b": 2}}]}})
        );
    }

    #[test]
    fn test_query_is_transparent() {
        let query = Query::term("kind", "BUILD");
        let body = json!({ "query": query });
        assert_eq!(body, json!({"query": {"term": {"kind": "BUILD"}}}));
    }

    #[test]
    fn test_sort_clause() {
        assert_eq!(
            SortOptions::desc("createTime").to_value(),
            json!([{"createTime": {"order": "desc"}}])
        );
    }
}
