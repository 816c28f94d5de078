//! HTTP client for OpenSearch / Elasticsearch.
//!
//! Transport failures (connection errors, timeouts, 502/503/504) are retried
//! here, transparently to the pagers. Any other non-success status is an
//! upstream error.

use super::{SearchBackend, SearchRequest, SearchResponse};
use crate::config::SearchSettings;
use crate::error::{ExportError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 512;

/// reqwest-backed [`SearchBackend`].
#[derive(Debug, Clone)]
pub struct OpenSearchClient {
    http: reqwest::Client,
    node: Url,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OpenSearchClient {
    /// Build a client for the configured node.
    pub fn new(settings: &SearchSettings) -> Result<Self> {
        let node = Url::parse(&settings.node).map_err(|e| {
            ExportError::configuration(format!("invalid search node {}: {e}", settings.node))
        })?;
        if node.cannot_be_a_base() {
            return Err(ExportError::configuration(format!(
                "invalid search node {}",
                settings.node
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .gzip(settings.compression)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .user_agent(concat!("sitemap-export/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExportError::configuration(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            node,
            max_retries: settings.max_retries,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        })
    }

    pub fn node(&self) -> &Url {
        &self.node
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.node.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post(&self, url: Url, body: &Value) -> Result<SearchResponse> {
        let mut attempt: u32 = 0;
        loop {
            let reason = match self.http.post(url.clone()).json(body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<SearchResponse>()
                        .await
                        .map_err(|e| ExportError::upstream(url.as_str(), format!("invalid response: {e}")));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    let reason = format!("{status}: {}", truncate(&text, MAX_ERROR_BODY));
                    if !is_retryable(status) || attempt >= self.max_retries {
                        return Err(ExportError::upstream(url.as_str(), reason));
                    }
                    reason
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.max_retries => {
                    e.to_string()
                }
                Err(e) => return Err(ExportError::upstream(url.as_str(), e)),
            };

            attempt += 1;
            warn!(
                url = %url,
                attempt,
                max_retries = self.max_retries,
                "search request failed, retrying: {reason}"
            );
            tokio::time::sleep(self.retry_backoff * attempt).await;
        }
    }
}

#[async_trait]
impl SearchBackend for OpenSearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let mut url = self.endpoint(&[request.index.as_str(), "_search"]);
        if let Some(keep_alive) = &request.scroll {
            url.query_pairs_mut().append_pair("scroll", keep_alive);
        }
        debug!(url = %url, "search");
        self.post(url, &request.body).await
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchResponse> {
        let url = self.endpoint(&["_search", "scroll"]);
        let body = json!({ "scroll": keep_alive, "scroll_id": scroll_id });
        self.post(url, &body).await
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, max_retries: u32) -> OpenSearchClient {
        let settings = SearchSettings {
            node: format!("{}/", server.uri()),
            max_retries,
            retry_backoff_ms: 0,
            ..SearchSettings::default()
        };
        OpenSearchClient::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_search_opens_scroll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sociedad_buyers/_search"))
            .and(query_param("scroll", "600s"))
            .and(body_partial_json(json!({ "size": 2, "_source": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "cursor-1",
                "hits": {
                    "total": { "value": 3, "relation": "eq" },
                    "hits": [
                        { "fields": { "id": ["b1"] } },
                        { "fields": { "id": ["b2"] } }
                    ]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 0);
        let resp = client
            .search(&SearchRequest {
                index: "sociedad_buyers".into(),
                body: json!({ "size": 2, "_source": false, "query": { "match_all": {} } }),
                scroll: Some("600s".into()),
            })
            .await
            .unwrap();

        assert_eq!(resp.scroll_id.as_deref(), Some("cursor-1"));
        assert_eq!(resp.hits.total.unwrap().value(), 3);
        assert_eq!(resp.hits.hits[1].first("id").as_deref(), Some("b2"));
    }

    #[tokio::test]
    async fn test_scroll_sends_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_partial_json(json!({ "scroll_id": "cursor-1", "scroll": "600s" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "cursor-2",
                "hits": { "total": { "value": 3 }, "hits": [ { "fields": { "id": ["b3"] } } ] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 0);
        let resp = client.scroll("cursor-1", "600s").await.unwrap();
        assert_eq!(resp.scroll_id.as_deref(), Some("cursor-2"));
        assert_eq!(resp.hits.hits.len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/missing/_search"))
            .respond_with(ResponseTemplate::new(404).set_body_string("index_not_found_exception"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 5);
        let err = client
            .search(&SearchRequest {
                index: "missing".into(),
                body: json!({}),
                scroll: None,
            })
            .await
            .unwrap_err();

        match err {
            ExportError::Upstream { endpoint, reason } => {
                assert!(endpoint.ends_with("/missing/_search"));
                assert!(reason.contains("404"));
                assert!(reason.contains("index_not_found_exception"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_is_retried_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        let err = client.scroll("cursor", "600s").await.unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_FAILURE);
    }

    #[test]
    fn test_invalid_node_is_configuration_error() {
        let settings = SearchSettings {
            node: "not a url".into(),
            ..SearchSettings::default()
        };
        let err = OpenSearchClient::new(&settings).unwrap_err();
        assert!(matches!(err, ExportError::Configuration(_)));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("ñañaña", 2), "ña");
    }
}
