// RSS/Atom connector for news and press-release feeds.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use capitolwatch_common::{ConnectorError, SourceDescriptor};

use super::{classify_status, classify_transport, FetchBatch, RawRecord, SourceConnector};

const USER_AGENT: &str = "capitolwatch-ingest/0.1";

/// Polls a fixed list of feed URLs. The first failing feed fails the fetch;
/// the coordinator decides whether to retry.
pub struct FeedConnector {
    id: String,
    urls: Vec<String>,
    client: reqwest::Client,
}

impl FeedConnector {
    pub fn new(id: impl Into<String>, urls: Vec<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            id: id.into(),
            urls,
            client,
        }
    }

    async fn fetch_one(
        &self,
        source_id: &str,
        url: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawRecord>, ConnectorError> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body, None));
        }

        let bytes = resp.bytes().await.map_err(|e| classify_transport(&e))?;
        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| ConnectorError::MalformedResponse(format!("{url}: {e}")))?;

        let records: Vec<RawRecord> = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let published = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc))?;
                if since.is_some_and(|s| published <= s) {
                    return None;
                }
                let link = entry.links.first().map(|l| l.href.clone());
                let payload = json!({
                    "id": entry.id,
                    "title": entry.title.map(|t| t.content),
                    "summary": entry.summary.map(|s| s.content),
                    "link": link,
                    "author": entry.authors.first().map(|a| a.name.clone()),
                    "published": published.to_rfc3339(),
                    "feed_url": url,
                });
                Some(RawRecord::new(source_id, payload))
            })
            .collect();

        debug!(feed_url = url, items = records.len(), "Parsed feed");
        Ok(records)
    }
}

#[async_trait]
impl SourceConnector for FeedConnector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(
        &self,
        source: &SourceDescriptor,
        since: Option<DateTime<Utc>>,
    ) -> Result<FetchBatch, ConnectorError> {
        let mut records = Vec::new();
        for url in &self.urls {
            records.extend(self.fetch_one(&source.id, url, since).await?);
        }
        info!(
            connector = self.id.as_str(),
            feeds = self.urls.len(),
            items = records.len(),
            "Feed fetch complete"
        );
        Ok(FetchBatch {
            records,
            pages_fetched: self.urls.len() as u32,
            truncated: false,
        })
    }
}
