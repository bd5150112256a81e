pub mod error;
pub mod types;

pub use error::{OpenStatesError, Result};
pub use types::{Endpoint, ListQuery, Page, Paginated, Pagination};

use std::time::Duration;

use reqwest::header::RETRY_AFTER;

const BASE_URL: &str = "https://v3.openstates.org";
const API_KEY_HEADER: &str = "X-API-KEY";

pub struct OpenStatesClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenStatesClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request timeout. Callers usually also bound the whole fetch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    /// Fetch a single page of a list endpoint.
    pub async fn page(&self, endpoint: Endpoint, query: &ListQuery, page: u32) -> Result<Page> {
        let url = format!("{}/{}", self.base_url, endpoint.path());
        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&query.params(endpoint, page))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after_secs = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = resp.text().await.unwrap_or_default();
            return Err(OpenStatesError::Api {
                status: status.as_u16(),
                message: body,
                retry_after_secs,
            });
        }

        let body = resp.text().await?;
        let page: Page = serde_json::from_str(&body)?;
        Ok(page)
    }

    /// Walk pages starting at 1 until the last page or `max_pages`, whichever
    /// comes first. Hitting the cap is reported via `truncated`, not an error.
    pub async fn list_all(
        &self,
        endpoint: Endpoint,
        query: &ListQuery,
        max_pages: u32,
    ) -> Result<Paginated> {
        let mut out = Paginated::default();
        let mut page_no = 1;

        while page_no <= max_pages.max(1) {
            let page = self.page(endpoint, query, page_no).await?;
            out.pages_fetched += 1;
            out.total_items = page.pagination.total_items;
            let last_page = page.pagination.max_page;
            let fetched = page.results.len();
            out.records.extend(page.results);

            tracing::debug!(
                endpoint = endpoint.path(),
                page = page_no,
                max_page = last_page,
                fetched,
                "Fetched Open States page"
            );

            if page_no >= last_page || fetched == 0 {
                return Ok(out);
            }
            page_no += 1;
        }

        out.truncated = true;
        tracing::info!(
            endpoint = endpoint.path(),
            pages = out.pages_fetched,
            records = out.records.len(),
            "Pagination cap reached, batch truncated"
        );
        Ok(out)
    }
}
