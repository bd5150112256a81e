// Legislative-data connector backed by the Open States v3 REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use capitolwatch_common::{ConnectorError, EntityKind, SourceDescriptor};
use openstates_client::{Endpoint, ListQuery, OpenStatesClient, OpenStatesError};

use super::{classify_status, FetchBatch, RawRecord, SourceConnector};

/// One Open States list endpoint (bills, people or committees).
pub struct OpenStatesConnector {
    id: String,
    client: OpenStatesClient,
    endpoint: Endpoint,
    jurisdiction: String,
    session: Option<String>,
    max_pages: u32,
}

impl OpenStatesConnector {
    pub fn new(
        id: impl Into<String>,
        client: OpenStatesClient,
        kind: EntityKind,
        jurisdiction: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            endpoint: endpoint_for(kind),
            jurisdiction: jurisdiction.into(),
            session: None,
            max_pages: 10,
        }
    }

    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Convenience constructor used by the orchestrator.
    pub fn from_parts(
        id: impl Into<String>,
        api_key: &str,
        base_url: &str,
        timeout: Duration,
        kind: EntityKind,
        jurisdiction: &str,
    ) -> Self {
        let client = OpenStatesClient::new(api_key.to_string())
            .with_base_url(base_url)
            .with_timeout(timeout);
        Self::new(id, client, kind, jurisdiction)
    }
}

pub fn endpoint_for(kind: EntityKind) -> Endpoint {
    match kind {
        EntityKind::Bill => Endpoint::Bills,
        EntityKind::Legislator => Endpoint::People,
        EntityKind::Committee => Endpoint::Committees,
    }
}

/// Map a client error onto the connector taxonomy.
pub fn connector_error(err: OpenStatesError) -> ConnectorError {
    match err {
        OpenStatesError::Api {
            status,
            message,
            retry_after_secs,
        } => classify_status(status, &message, retry_after_secs),
        OpenStatesError::Network { message, timeout } => {
            if timeout {
                ConnectorError::Unavailable(format!("request timed out: {message}"))
            } else {
                ConnectorError::Unavailable(message)
            }
        }
        OpenStatesError::Parse(message) => ConnectorError::MalformedResponse(message),
    }
}

#[async_trait]
impl SourceConnector for OpenStatesConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_since(&self) -> bool {
        self.endpoint.supports_updated_since()
    }

    async fn fetch(
        &self,
        source: &SourceDescriptor,
        since: Option<DateTime<Utc>>,
    ) -> Result<FetchBatch, ConnectorError> {
        let jurisdiction = source
            .config
            .get("jurisdiction")
            .cloned()
            .unwrap_or_else(|| self.jurisdiction.clone());
        let mut query = ListQuery::new(jurisdiction);
        if let Some(session) = source.config.get("session").or(self.session.as_ref()) {
            query = query.session(session.clone());
        }
        if let Some(since) = since {
            query = query.updated_since(since.to_rfc3339_opts(SecondsFormat::Secs, true));
        }

        let page = self
            .client
            .list_all(self.endpoint, &query, self.max_pages)
            .await
            .map_err(connector_error)?;

        info!(
            connector = self.id.as_str(),
            endpoint = self.endpoint.path(),
            records = page.records.len(),
            pages = page.pages_fetched,
            truncated = page.truncated,
            "Open States fetch complete"
        );

        Ok(FetchBatch {
            records: page
                .records
                .into_iter()
                .map(|payload| RawRecord::new(source.id.clone(), payload))
                .collect(),
            pages_fetched: page.pages_fetched,
            truncated: page.truncated,
        })
    }
}
