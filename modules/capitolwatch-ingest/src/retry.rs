use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use capitolwatch_common::{Config, ConnectorError, SourceDescriptor};

use crate::connectors::{FetchBatch, SourceConnector};

/// Coordinator-side timeout and retry policy for connector calls.
///
/// Every attempt is bounded by `timeout`; an elapsed timeout is treated like
/// any other `Unavailable` failure. Only retryable errors are retried, with
/// exponential backoff starting at `base_delay` (or the upstream's
/// `Retry-After` when it asks for longer). No single wait exceeds
/// `max_backoff`, so a unit of work always ends in bounded time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.connector_max_retries,
            timeout: Duration::from_secs(config.connector_timeout_secs),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32, err: &ConnectorError) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let delay = match err {
            ConnectorError::RateLimited {
                retry_after_secs: Some(secs),
            } => exp.max(Duration::from_secs(*secs)),
            _ => exp,
        };
        delay.min(self.max_backoff)
    }

    /// Run one bounded `fetch`, retrying transient failures.
    pub async fn fetch(
        &self,
        connector: &dyn SourceConnector,
        source: &SourceDescriptor,
        since: Option<DateTime<Utc>>,
    ) -> Result<FetchBatch, ConnectorError> {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, connector.fetch(source, since))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ConnectorError::Unavailable(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                ))),
            };

            match result {
                Ok(batch) => return Ok(batch),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt, &err);
                    warn!(
                        source = source.id.as_str(),
                        connector = connector.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Connector call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnector;
    use capitolwatch_common::Layer;

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("openstates-bills", "Bills", Layer::Foundation)
    }

    #[test]
    fn backoff_doubles_and_honours_retry_after() {
        let policy = RetryPolicy::default();
        let unavailable = ConnectorError::Unavailable("x".into());
        assert_eq!(policy.backoff(1, &unavailable), Duration::from_millis(500));
        assert_eq!(policy.backoff(2, &unavailable), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3, &unavailable), Duration::from_millis(2000));

        let limited = ConnectorError::RateLimited {
            retry_after_secs: Some(10),
        };
        assert_eq!(policy.backoff(1, &limited), Duration::from_secs(10));
        assert_eq!(policy.backoff(12, &unavailable), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn long_retry_after_is_capped() {
        let connector = MockConnector::new("bills")
            .then_err(ConnectorError::RateLimited {
                retry_after_secs: Some(86_400),
            })
            .then_ok(vec![serde_json::json!({"id": 1})]);
        let policy = RetryPolicy::default();

        let started = tokio::time::Instant::now();
        let batch = policy.fetch(&connector, &source(), None).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert!(started.elapsed() <= policy.max_backoff);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let connector = MockConnector::new("bills")
            .then_err(ConnectorError::Unavailable("502".into()))
            .then_ok(vec![serde_json::json!({"id": 1})]);
        let batch = RetryPolicy::default()
            .fetch(&connector, &source(), None)
            .await
            .unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(connector.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_is_not_retried() {
        let connector =
            MockConnector::new("bills").then_err(ConnectorError::Unauthorized("401".into()));
        let err = RetryPolicy::default()
            .fetch(&connector, &source(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Unauthorized(_)));
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_unavailable_after_retries() {
        let connector = MockConnector::new("bills").with_delay(Duration::from_secs(120));
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
        };
        let err = policy.fetch(&connector, &source(), None).await.unwrap_err();
        assert_eq!(err, ConnectorError::Unavailable("timed out after 1s".into()));
        assert_eq!(connector.calls(), 2);
    }
}
