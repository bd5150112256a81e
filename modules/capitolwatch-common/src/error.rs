use thiserror::Error;

use crate::types::Layer;

/// Failure of a single source fetch. Connectors fail fast; retries belong to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("rate limited by upstream (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ConnectorError {
    /// Whether the calling coordinator may retry this failure within the same run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable(_))
    }
}

/// Failure to turn one raw record into a canonical entity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("ambiguous natural key: {0}")]
    AmbiguousKey(String),

    #[error("mapping failure on `{field}`: {reason}")]
    MappingFailure { field: String, reason: String },
}

impl ReconciliationError {
    pub fn mapping(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MappingFailure {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("write conflict: {0}")]
    WriteConflict(String),

    #[error("store unreachable: {0}")]
    Unreachable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("analysis provider timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("analysis provider returned a malformed response: {0}")]
    ProviderMalformed(String),

    #[error("analysis provider quota exceeded")]
    QuotaExceeded,

    #[error("analysis provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl AnalysisError {
    /// Whether the request should go back on the queue for another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout(_) | Self::QuotaExceeded | Self::ProviderUnavailable(_)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{key} has invalid value `{value}`")]
    Invalid { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum CapitolWatchError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("analysis queue is full ({0} pending)")]
    QueueFull(usize),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("{0} layer is not running (missing configuration)")]
    LayerUnavailable(Layer),

    #[error("checkpoint I/O error: {0}")]
    Checkpoint(String),
}

pub type Result<T> = std::result::Result<T, CapitolWatchError>;
