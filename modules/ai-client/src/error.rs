use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Network error: {message}")]
    Network { message: String, timeout: bool },

    #[error("Claude API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode Claude response: {0}")]
    Decode(String),

    #[error("No text content in Claude response")]
    EmptyResponse,

    #[error("Invalid API key header: {0}")]
    InvalidHeader(String),
}

impl AiError {
    /// 429 and Anthropic's 529 "overloaded" both mean back off and retry later.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Api { status: 429 | 529, .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network { timeout: true, .. })
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return AiError::Decode(err.to_string());
        }
        AiError::Network {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}
