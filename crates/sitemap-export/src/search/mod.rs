//! Search engine access: the backend trait, wire types, and the two pagers.
//!
//! The exporter only needs two calls from the engine: an initial `_search`
//! (optionally opening a scroll cursor) and `_search/scroll` to continue it.

pub mod aggregation;
pub mod client;
pub mod cursor;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

pub use aggregation::{AggregationSpec, Bucket, GroupKey, TermsLevel};
pub use client::OpenSearchClient;
pub use cursor::{CursorPager, CursorRequest, Page};

/// A `_search` call against one index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub body: Value,
    /// Keep-alive for a scroll cursor (e.g. `600s`). `None` for one-shot queries.
    pub scroll: Option<String>,
}

/// The parts of a search response the exporter reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub hits: Hits,
    #[serde(default)]
    pub aggregations: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<RawRecord>,
}

/// `hits.total` is an object on current engines and a bare number on old ones.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            Self::Count(v) | Self::Object { value: v } => *v,
        }
    }
}

/// One hit, reduced to the requested `fields`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub fields: HashMap<String, Vec<Value>>,
}

impl RawRecord {
    /// First value of `field` as a string. Numbers and booleans are stringified.
    pub fn first(&self, field: &str) -> Option<String> {
        match self.fields.get(field)?.first()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// The search engine as seen by the exporter.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a search. Opens a scroll cursor when `request.scroll` is set.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;

    /// Fetch the next page of an open scroll cursor.
    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response_with_object_total() {
        let resp: SearchResponse = serde_json::from_value(json!({
            "_scroll_id": "abc",
            "took": 3,
            "hits": {
                "total": { "value": 42, "relation": "eq" },
                "hits": [
                    { "_id": "1", "fields": { "id": ["s-1"], "country": ["MX"] } },
                    { "_id": "2" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(resp.scroll_id.as_deref(), Some("abc"));
        assert_eq!(resp.hits.total.unwrap().value(), 42);
        assert_eq!(resp.hits.hits.len(), 2);
        assert_eq!(resp.hits.hits[0].first("id").as_deref(), Some("s-1"));
        assert_eq!(resp.hits.hits[1].first("id"), None);
    }

    #[test]
    fn test_parse_response_with_numeric_total() {
        let resp: SearchResponse =
            serde_json::from_value(json!({ "hits": { "total": 7, "hits": [] } })).unwrap();
        assert_eq!(resp.hits.total.unwrap().value(), 7);
        assert!(resp.scroll_id.is_none());
    }

    #[test]
    fn test_first_stringifies_numbers() {
        let record: RawRecord =
            serde_json::from_value(json!({ "fields": { "id": [1234], "flag": [true], "obj": [{}] } }))
                .unwrap();
        assert_eq!(record.first("id").as_deref(), Some("1234"));
        assert_eq!(record.first("flag").as_deref(), Some("true"));
        assert_eq!(record.first("obj"), None);
    }
}
