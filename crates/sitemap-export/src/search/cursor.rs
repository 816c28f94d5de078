//! Scroll-cursor pagination.
//!
//! The cursor is a server-held resource bound to one query. It is opened by
//! the first search and walked forward until the hits delivered reach the
//! total reported by that first response. Pages are never revisited.

use super::{RawRecord, SearchBackend, SearchRequest, SearchResponse};
use crate::error::{ExportError, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Parameters of a full-collection walk.
#[derive(Debug, Clone)]
pub struct CursorRequest {
    pub index: String,
    pub query: Value,
    /// Fields requested through the `fields` API. `_source` is never fetched.
    pub fields: Vec<String>,
    pub page_size: usize,
    pub keep_alive: String,
}

impl CursorRequest {
    fn to_search(&self) -> SearchRequest {
        SearchRequest {
            index: self.index.clone(),
            body: json!({
                "size": self.page_size,
                "_source": false,
                "track_total_hits": true,
                "fields": self.fields,
                "query": self.query,
            }),
            scroll: Some(self.keep_alive.clone()),
        }
    }
}

/// One page of hits.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<RawRecord>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Forward-only walker over a scroll cursor.
pub struct CursorPager<'a> {
    backend: &'a dyn SearchBackend,
    index: String,
    keep_alive: String,
    cursor: Option<String>,
    total: u64,
    delivered: u64,
    exhausted: bool,
}

impl<'a> CursorPager<'a> {
    /// Run the initial query. Returns the pager and the first page.
    pub async fn open(backend: &'a dyn SearchBackend, request: &CursorRequest) -> Result<(Self, Page)> {
        let response = backend.search(&request.to_search()).await?;
        let total = response
            .hits
            .total
            .map(|t| t.value())
            .ok_or_else(|| ExportError::upstream(&request.index, "response carries no hit total"))?;

        let mut pager = Self {
            backend,
            index: request.index.clone(),
            keep_alive: request.keep_alive.clone(),
            cursor: None,
            total,
            delivered: 0,
            exhausted: false,
        };
        let first = pager.accept(response);
        debug!(index = %pager.index, total, first_page = first.len(), "opened cursor");
        Ok((pager, first))
    }

    /// Authoritative hit count reported when the cursor was opened.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Hits delivered so far, including the first page.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page, or `None` once the total has been delivered.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }
        let cursor = self.cursor.clone().ok_or_else(|| {
            ExportError::upstream(&self.index, "response did not include a scroll id")
        })?;

        let response = self.backend.scroll(&cursor, &self.keep_alive).await?;
        if response.hits.hits.is_empty() {
            warn!(
                index = %self.index,
                delivered = self.delivered,
                total = self.total,
                "cursor returned an empty page before reaching the reported total"
            );
            self.exhausted = true;
            return Ok(None);
        }

        Ok(Some(self.accept(response)))
    }

    fn accept(&mut self, response: SearchResponse) -> Page {
        if let Some(id) = response.scroll_id {
            self.cursor = Some(id);
        }
        let records = response.hits.hits;
        self.delivered += records.len() as u64;
        if self.delivered >= self.total || records.is_empty() {
            self.exhausted = true;
        }
        Page { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::testing::{hits_page, Call, ScriptedBackend};

    fn request() -> CursorRequest {
        CursorRequest {
            index: "sociedad_buyers".into(),
            query: json!({ "match_all": {} }),
            fields: vec!["id".into(), "updated_date".into()],
            page_size: 2,
            keep_alive: "600s".into(),
        }
    }

    fn ids(n: std::ops::Range<u32>) -> Vec<Value> {
        n.map(|i| json!({ "id": format!("r{i}") })).collect()
    }

    async fn drain(pager: &mut CursorPager<'_>, first: Page) -> Vec<String> {
        let mut seen: Vec<String> = first.records.iter().filter_map(|r| r.first("id")).collect();
        while let Some(page) = pager.next_page().await.unwrap() {
            seen.extend(page.records.iter().filter_map(|r| r.first("id")));
        }
        seen
    }

    #[tokio::test]
    async fn test_walk_stops_at_total_with_full_pages() {
        let backend = ScriptedBackend::new();
        backend
            .push(hits_page("c1", 4, &ids(0..2)))
            .push(hits_page("c2", 4, &ids(2..4)));

        let (mut pager, first) = CursorPager::open(&backend, &request()).await.unwrap();
        assert_eq!(pager.total(), 4);
        let seen = drain(&mut pager, first).await;

        assert_eq!(seen, vec!["r0", "r1", "r2", "r3"]);
        assert!(pager.is_exhausted());
        // The last page was exactly full; no extra scroll was issued.
        assert_eq!(backend.calls().len(), 2);
        assert_eq!(backend.remaining(), 0);
    }

    #[tokio::test]
    async fn test_short_page_does_not_end_walk() {
        let backend = ScriptedBackend::new();
        backend
            .push(hits_page("c1", 5, &ids(0..2)))
            .push(hits_page("c2", 5, &ids(2..3)))
            .push(hits_page("c3", 5, &ids(3..5)));

        let (mut pager, first) = CursorPager::open(&backend, &request()).await.unwrap();
        let seen = drain(&mut pager, first).await;
        assert_eq!(seen.len(), 5);

        let calls = backend.calls();
        assert!(matches!(&calls[0], Call::Search(req) if req.scroll.as_deref() == Some("600s")));
        assert_eq!(
            calls[1],
            Call::Scroll { scroll_id: "c1".into(), keep_alive: "600s".into() }
        );
        assert_eq!(
            calls[2],
            Call::Scroll { scroll_id: "c2".into(), keep_alive: "600s".into() }
        );
    }

    #[tokio::test]
    async fn test_empty_page_before_total_ends_walk() {
        let backend = ScriptedBackend::new();
        backend
            .push(hits_page("c1", 10, &ids(0..2)))
            .push(hits_page("c2", 10, &[]));

        let (mut pager, first) = CursorPager::open(&backend, &request()).await.unwrap();
        let seen = drain(&mut pager, first).await;
        assert_eq!(seen.len(), 2);
        assert!(pager.next_page().await.unwrap().is_none());
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let backend = ScriptedBackend::new();
        backend.push(hits_page("c1", 0, &[]));

        let (mut pager, first) = CursorPager::open(&backend, &request()).await.unwrap();
        assert!(first.is_empty());
        assert!(pager.next_page().await.unwrap().is_none());
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_scroll_failure_propagates() {
        let backend = ScriptedBackend::new();
        backend.push(hits_page("c1", 3, &ids(0..2))).push_error("timeout");

        let (mut pager, _first) = CursorPager::open(&backend, &request()).await.unwrap();
        let err = pager.next_page().await.unwrap_err();
        assert!(matches!(err, ExportError::Upstream { .. }));
    }

    #[test]
    fn test_request_body() {
        let search = request().to_search();
        assert_eq!(search.index, "sociedad_buyers");
        assert_eq!(search.body["size"], 2);
        assert_eq!(search.body["_source"], false);
        assert_eq!(search.body["track_total_hits"], true);
        assert_eq!(search.body["fields"], json!(["id", "updated_date"]));
    }

    #[test]
    fn test_open_requires_total() {
        let backend = ScriptedBackend::new();
        backend.push(SearchResponse::default());
        let result = tokio_test::block_on(CursorPager::open(&backend, &request()));
        assert!(matches!(result, Err(ExportError::Upstream { .. })));
    }
}
