use std::time::Duration;

use ai_client::{AiError, Claude};
use async_trait::async_trait;

use capitolwatch_common::AnalysisError;

/// Raw provider output plus the token usage used for cost accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Fallible external analysis function. Output may be JSON or free text.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, system: &str, prompt: &str)
        -> Result<ProviderResponse, AnalysisError>;
}

/// Anthropic Messages API provider.
pub struct ClaudeProvider {
    claude: Claude,
    timeout: Duration,
}

impl ClaudeProvider {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Self {
        Self {
            claude: Claude::new(api_key, model).with_timeout(timeout),
            timeout,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.claude = self.claude.with_base_url(url);
        self
    }

    fn map_error(&self, err: AiError) -> AnalysisError {
        if err.is_rate_limited() {
            return AnalysisError::QuotaExceeded;
        }
        if err.is_timeout() {
            return AnalysisError::ProviderTimeout(self.timeout.as_secs());
        }
        match err {
            AiError::Decode(msg) => AnalysisError::ProviderMalformed(msg),
            AiError::EmptyResponse => {
                AnalysisError::ProviderMalformed("response had no text content".into())
            }
            other => AnalysisError::ProviderUnavailable(other.to_string()),
        }
    }
}

#[async_trait]
impl AnalysisProvider for ClaudeProvider {
    fn model(&self) -> &str {
        self.claude.model()
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<ProviderResponse, AnalysisError> {
        let completion = self
            .claude
            .chat_completion(system, prompt)
            .await
            .map_err(|e| self.map_error(e))?;
        Ok(ProviderResponse {
            text: completion.text,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> ClaudeProvider {
        ClaudeProvider::new("sk-test", "claude-3-5-haiku-latest", Duration::from_secs(5))
            .with_base_url(&server.uri())
    }

    #[tokio::test]
    async fn overloaded_maps_to_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;
        let err = provider(&server).complete("sys", "prompt").await.unwrap_err();
        assert_eq!(err, AnalysisError::QuotaExceeded);
    }

    #[tokio::test]
    async fn text_and_usage_are_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "{\"summary\": \"ok\"}"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 120, "output_tokens": 30}
            })))
            .mount(&server)
            .await;
        let resp = provider(&server).complete("sys", "prompt").await.unwrap();
        assert_eq!(resp.input_tokens, 120);
        assert_eq!(resp.output_tokens, 30);
        assert!(resp.text.contains("summary"));
    }
}
