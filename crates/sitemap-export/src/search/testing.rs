//! Scripted in-memory backend for pager and orchestrator tests.

use super::{SearchBackend, SearchRequest, SearchResponse};
use crate::error::{ExportError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A request the backend received.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Search(SearchRequest),
    Scroll { scroll_id: String, keep_alive: String },
}

/// Replays queued responses in order and records every call.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<SearchResponse>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: SearchResponse) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn push_error(&self, reason: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(ExportError::upstream("scripted", reason)));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    fn next(&self) -> Result<SearchResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExportError::upstream("scripted", "no scripted response left")))
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.calls.lock().unwrap().push(Call::Search(request.clone()));
        self.next()
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchResponse> {
        self.calls.lock().unwrap().push(Call::Scroll {
            scroll_id: scroll_id.to_string(),
            keep_alive: keep_alive.to_string(),
        });
        self.next()
    }
}

/// A page of hits. Each hit is a JSON object of field name to single value.
pub fn hits_page(scroll_id: &str, total: u64, hits: &[Value]) -> SearchResponse {
    let hits: Vec<Value> = hits
        .iter()
        .map(|fields| {
            let wrapped: serde_json::Map<String, Value> = fields
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .map(|(k, v)| (k.clone(), json!([v])))
                        .collect()
                })
                .unwrap_or_default();
            json!({ "fields": wrapped })
        })
        .collect();

    serde_json::from_value(json!({
        "_scroll_id": scroll_id,
        "hits": { "total": { "value": total, "relation": "eq" }, "hits": hits }
    }))
    .unwrap()
}

/// An aggregation-only response.
pub fn aggregation_response(aggregations: Value) -> SearchResponse {
    serde_json::from_value(json!({
        "hits": { "total": { "value": 0, "relation": "eq" }, "hits": [] },
        "aggregations": aggregations
    }))
    .unwrap()
}
