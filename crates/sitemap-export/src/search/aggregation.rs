//! Terms-aggregation paging.
//!
//! Unlike the cursor walk this is a single round trip: the query asks for the
//! distinct groups (and optionally one nested level of sub-groups) together
//! with the latest timestamp per group. The declared bucket bounds are hard
//! truncation points; groups beyond them are simply absent.

use super::{SearchBackend, SearchRequest};
use crate::error::{ExportError, Result};
use crate::sitemap::LastModified;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

const GROUPS_AGG: &str = "groups";
const UNITS_AGG: &str = "units";
const LAST_MODIFIED_AGG: &str = "last_modified";

/// One level of a terms aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsLevel {
    /// Keyword field to group by.
    pub field: String,
    /// Upper bound on the number of buckets returned.
    pub size: usize,
    /// Date field whose maximum becomes the bucket's last-modified value.
    #[serde(default)]
    pub last_modified_field: Option<String>,
}

/// A grouping query: top-level groups, optionally with nested units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationSpec {
    pub groups: TermsLevel,
    pub units: Option<TermsLevel>,
}

/// An aggregation bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub key: String,
    pub last_modified: Option<LastModified>,
    pub sub_buckets: Vec<Bucket>,
}

/// A flattened bucket: an entity, or one unit nested under an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKey {
    pub entity: String,
    pub unit: Option<String>,
    pub last_modified: Option<LastModified>,
}

impl AggregationSpec {
    fn to_body(&self, query: &Value) -> Value {
        let mut aggs = Map::new();
        aggs.insert(
            GROUPS_AGG.to_string(),
            terms_agg(&self.groups, self.units.as_ref()),
        );
        json!({
            "size": 0,
            "query": query,
            "aggs": aggs,
        })
    }
}

fn terms_agg(level: &TermsLevel, nested: Option<&TermsLevel>) -> Value {
    let mut sub = Map::new();
    if let Some(field) = &level.last_modified_field {
        sub.insert(
            LAST_MODIFIED_AGG.to_string(),
            json!({ "max": { "field": field } }),
        );
    }
    if let Some(units) = nested {
        sub.insert(UNITS_AGG.to_string(), terms_agg(units, None));
    }

    let mut agg = Map::new();
    agg.insert(
        "terms".to_string(),
        json!({ "field": level.field, "size": level.size }),
    );
    if !sub.is_empty() {
        agg.insert("aggs".to_string(), Value::Object(sub));
    }
    Value::Object(agg)
}

/// Run the aggregation and return the top-level buckets in response order.
pub async fn fetch_buckets(
    backend: &dyn SearchBackend,
    index: &str,
    spec: &AggregationSpec,
    query: &Value,
) -> Result<Vec<Bucket>> {
    let request = SearchRequest {
        index: index.to_string(),
        body: spec.to_body(query),
        scroll: None,
    };
    let response = backend.search(&request).await?;
    let groups = response
        .aggregations
        .as_ref()
        .and_then(|aggs| aggs.get(GROUPS_AGG))
        .ok_or_else(|| ExportError::upstream(index, "response carries no aggregation result"))?;

    let buckets = parse_level(groups, &spec.groups, spec.units.as_ref());
    debug!(index, field = %spec.groups.field, buckets = buckets.len(), "fetched aggregation");
    Ok(buckets)
}

fn parse_level(agg: &Value, level: &TermsLevel, nested: Option<&TermsLevel>) -> Vec<Bucket> {
    let dropped = agg
        .get("sum_other_doc_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if dropped > 0 {
        warn!(
            field = %level.field,
            bound = level.size,
            dropped_documents = dropped,
            "aggregation bucket bound reached, remaining groups are not exported"
        );
    }

    let Some(raw) = agg.get("buckets").and_then(Value::as_array) else {
        return Vec::new();
    };

    raw.iter()
        .filter_map(|bucket| {
            let key = bucket_key(bucket)?;
            let sub_buckets = match (nested, bucket.get(UNITS_AGG)) {
                (Some(units), Some(sub)) => parse_level(sub, units, None),
                _ => Vec::new(),
            };
            Some(Bucket {
                key,
                last_modified: bucket_last_modified(bucket),
                sub_buckets,
            })
        })
        .collect()
}

fn bucket_key(bucket: &Value) -> Option<String> {
    if let Some(s) = bucket.get("key_as_string").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    match bucket.get("key")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn bucket_last_modified(bucket: &Value) -> Option<LastModified> {
    let agg = bucket.get(LAST_MODIFIED_AGG)?;
    if let Some(s) = agg.get("value_as_string").and_then(Value::as_str) {
        if let Some(parsed) = LastModified::parse(s) {
            return Some(parsed);
        }
    }
    agg.get("value")
        .and_then(Value::as_f64)
        .and_then(|millis| LastModified::from_epoch_millis(millis as i64))
}

/// Flatten buckets depth-first: each entity, then its units, then the next entity.
pub fn flatten(buckets: &[Bucket]) -> Vec<GroupKey> {
    let mut keys = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        keys.push(GroupKey {
            entity: bucket.key.clone(),
            unit: None,
            last_modified: bucket.last_modified,
        });
        for sub in &bucket.sub_buckets {
            keys.push(GroupKey {
                entity: bucket.key.clone(),
                unit: Some(sub.key.clone()),
                last_modified: sub.last_modified,
            });
        }
    }
    keys
}

/// Latest timestamp per key, for last-modified lookups by identifier.
pub async fn fetch_activity_cache(
    backend: &dyn SearchBackend,
    index: &str,
    level: &TermsLevel,
    query: &Value,
) -> Result<HashMap<String, LastModified>> {
    let spec = AggregationSpec {
        groups: level.clone(),
        units: None,
    };
    let buckets = fetch_buckets(backend, index, &spec, query).await?;
    Ok(buckets
        .into_iter()
        .filter_map(|b| b.last_modified.map(|lm| (b.key, lm)))
        .collect())
}
