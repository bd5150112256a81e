// JSON post-list connector for social and video platforms.
//
// Accepts either a bare JSON array of posts or an envelope
// `{ "items" | "data" | "results": [...], "next": "<url>" }` and follows
// `next` links up to `max_pages`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::info;

use capitolwatch_common::{ConnectorError, SourceDescriptor};

use super::{classify_status, classify_transport, FetchBatch, RawRecord, SourceConnector};

const API_KEY_HEADER: &str = "X-API-KEY";

pub struct PostsConnector {
    id: String,
    endpoint: String,
    api_key: Option<String>,
    max_pages: u32,
    client: reqwest::Client,
}

impl PostsConnector {
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            api_key,
            max_pages: 5,
            client,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    async fn get_page(
        &self,
        url: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Value, ConnectorError> {
        let mut req = self.client.get(url);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }
        if let Some(since) = since {
            req = req.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))]);
        }
        let resp = req.send().await.map_err(|e| classify_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body, retry_after_secs));
        }

        let body = resp.text().await.map_err(|e| classify_transport(&e))?;
        serde_json::from_str(&body)
            .map_err(|e| ConnectorError::MalformedResponse(format!("{url}: {e}")))
    }
}

/// Split a response body into its posts and the optional next-page URL.
fn split_page(body: Value) -> Result<(Vec<Value>, Option<String>), ConnectorError> {
    match body {
        Value::Array(items) => Ok((items, None)),
        Value::Object(mut map) => {
            let next = map
                .get("next")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let items = ["items", "data", "results"]
                .iter()
                .find_map(|k| match map.remove(*k) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| {
                    ConnectorError::MalformedResponse("no post list in response".into())
                })?;
            Ok((items, next))
        }
        other => Err(ConnectorError::MalformedResponse(format!(
            "expected array or object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl SourceConnector for PostsConnector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(
        &self,
        source: &SourceDescriptor,
        since: Option<DateTime<Utc>>,
    ) -> Result<FetchBatch, ConnectorError> {
        let mut batch = FetchBatch::default();
        let mut url = Some(self.endpoint.clone());

        while let Some(current) = url.take() {
            if batch.pages_fetched >= self.max_pages {
                batch.truncated = true;
                break;
            }
            let body = self.get_page(&current, since).await?;
            batch.pages_fetched += 1;
            let (items, next) = split_page(body)?;
            batch.records.extend(
                items
                    .into_iter()
                    .map(|payload| RawRecord::new(source.id.clone(), payload)),
            );
            url = next;
        }

        info!(
            connector = self.id.as_str(),
            posts = batch.records.len(),
            pages = batch.pages_fetched,
            truncated = batch.truncated,
            "Post fetch complete"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use capitolwatch_common::Layer;

    #[test]
    fn envelope_and_bare_array_both_split() {
        let (items, next) = split_page(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(items.len(), 2);
        assert!(next.is_none());

        let (items, next) =
            split_page(json!({"data": [{"id": 3}], "next": "http://x/page2"})).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(next.as_deref(), Some("http://x/page2"));

        assert!(split_page(json!("nope")).is_err());
        assert!(split_page(json!({"count": 0})).is_err());
    }

    #[tokio::test]
    async fn follows_next_links_and_sends_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts"))
            .and(header("X-API-KEY", "social-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "p1", "text": "HB25-1001", "created_at": "2025-03-01T00:00:00Z"}],
                "next": format!("{}/posts2", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/posts2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "p2", "text": "SB25-002", "created_at": "2025-03-01T01:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let connector = PostsConnector::new(
            "social",
            format!("{}/posts", server.uri()),
            Some("social-key".into()),
            Duration::from_secs(5),
        );
        let source = SourceDescriptor::new("social", "Social", Layer::Speed);
        let batch = connector.fetch(&source, None).await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.pages_fetched, 2);
        assert!(!batch.truncated);
    }

    #[tokio::test]
    async fn rate_limit_surfaces_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&server)
            .await;

        let connector = PostsConnector::new("video", server.uri(), None, Duration::from_secs(5));
        let source = SourceDescriptor::new("video", "Video", Layer::Speed);
        let err = connector.fetch(&source, None).await.unwrap_err();
        assert_eq!(
            err,
            ConnectorError::RateLimited {
                retry_after_secs: Some(12)
            }
        );
    }
}
