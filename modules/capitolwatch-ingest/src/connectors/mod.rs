// Source connectors: one per external source, stateless, read-only.
//
// A connector turns one upstream (legislative API endpoint, RSS feed, post
// endpoint) into a batch of raw, source-native records. It never touches the
// store and never retries; timeouts and retry policy live in the coordinator
// that calls it (see `retry`).

pub mod feeds;
pub mod openstates;
pub mod posts;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use capitolwatch_common::{ConnectorError, SourceDescriptor};

pub use feeds::FeedConnector;
pub use openstates::OpenStatesConnector;
pub use posts::PostsConnector;

/// One upstream record, untouched apart from being wrapped with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub source_id: String,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(source_id: impl Into<String>, payload: Value) -> Self {
        Self {
            source_id: source_id.into(),
            payload,
            fetched_at: Utc::now(),
        }
    }
}

/// Output of a single `fetch`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchBatch {
    pub records: Vec<RawRecord>,
    pub pages_fetched: u32,
    /// Upstream had more pages than the configured cap allowed.
    pub truncated: bool,
}

impl FetchBatch {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            pages_fetched: 1,
            records,
            truncated: false,
        }
    }
}

#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Stable connector identifier, used in logs.
    fn id(&self) -> &str;

    /// Whether `fetch` narrows its result to records newer than `since`.
    /// Connectors that ignore it always return a full listing.
    fn supports_since(&self) -> bool {
        true
    }

    /// Fetch raw records, optionally only those newer than `since`.
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        since: Option<DateTime<Utc>>,
    ) -> Result<FetchBatch, ConnectorError>;
}

/// Map a non-2xx HTTP status to the connector error taxonomy.
pub fn classify_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> ConnectorError {
    let body = ai_client::util::truncate_to_char_boundary(body, 200).to_string();
    match status {
        429 => ConnectorError::RateLimited { retry_after_secs },
        401 | 403 => ConnectorError::Unauthorized(format!("HTTP {status}: {body}")),
        500..=599 | 408 => ConnectorError::Unavailable(format!("HTTP {status}: {body}")),
        _ => ConnectorError::MalformedResponse(format!("unexpected HTTP {status}: {body}")),
    }
}

/// Map a transport-level failure. Anything that never produced a response is `Unavailable`.
pub fn classify_transport(err: &reqwest::Error) -> ConnectorError {
    if err.is_decode() {
        return ConnectorError::MalformedResponse(err.to_string());
    }
    if let Some(status) = err.status() {
        return classify_status(status.as_u16(), &err.to_string(), None);
    }
    ConnectorError::Unavailable(err.to_string())
}

/// A free-text item from a high-churn source, normalized just enough for
/// reference extraction. Built from whatever shape the connector returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub external_id: String,
    pub text: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl ContentItem {
    /// Tolerant mapping from feed entries and JSON posts. Returns `None` when
    /// the record has no identifier, no text, or no parseable timestamp.
    pub fn from_raw(record: &RawRecord) -> Option<Self> {
        let p = &record.payload;
        let external_id = first_str(p, &["id", "guid", "post_id", "video_id"])
            .or_else(|| first_str(p, &["url", "link"]))?;

        let text = ["title", "text", "content", "body", "summary", "description", "caption"]
            .iter()
            .filter_map(|k| p.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return None;
        }

        let published_at = first_str(
            p,
            &["published_at", "published", "created_at", "timestamp", "updated"],
        )
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;

        Some(Self {
            external_id,
            text,
            url: first_str(p, &["url", "link", "permalink"]),
            author: first_str(p, &["author", "author_name", "channel", "username"]),
            published_at,
        })
    }
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .filter_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .next()
}
