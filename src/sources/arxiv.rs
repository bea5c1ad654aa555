//! arXiv search API client.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use tracing::{debug, instrument};

use crate::models::PageQuery;
use crate::sources::{PageSource, SourceError};
use crate::utils::HttpClient;

/// Base URL for arXiv API
pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// arXiv search source
///
/// Issues one GET per page against the query endpoint. Failures are
/// returned as-is; the caller decides whether the run continues.
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: HttpClient,
    base_url: String,
}

impl ArxivSource {
    /// Create a source pointing at `base_url` (the public endpoint, a mirror, tests)
    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PageSource for ArxivSource {
    #[instrument(level = "debug", skip_all, fields(start = query.start))]
    async fn fetch_page(&self, query: &PageQuery) -> Result<String, SourceError> {
        debug!(search_query = %query.search_query, "Requesting page");

        let response = self
            .client
            .get(&self.base_url)
            .query(&query.params())
            .header(ACCEPT, "application/atom+xml")
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to fetch arXiv results: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))
    }
}
