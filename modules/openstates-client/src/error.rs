use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpenStatesError>;

#[derive(Debug, Error)]
pub enum OpenStatesError {
    #[error("Network error: {message}")]
    Network { message: String, timeout: bool },

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for OpenStatesError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return OpenStatesError::Parse(err.to_string());
        }
        OpenStatesError::Network {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for OpenStatesError {
    fn from(err: serde_json::Error) -> Self {
        OpenStatesError::Parse(err.to_string())
    }
}
