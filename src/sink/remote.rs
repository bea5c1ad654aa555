//! HTTP sink for a remote ingestion service.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, instrument};

use crate::models::{Paper, PaperBatch};
use crate::sink::{DeliveryReport, Sink, SinkError};
use crate::utils::{HttpClient, RequestSigner};

/// Header carrying the pre-shared API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Header carrying the Base64 request signature
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// POSTs each batch as `{"papers": [...]}`
///
/// Authentication and signing are independent: either, both or neither
/// may be configured.
#[derive(Debug, Clone)]
pub struct RemoteSink {
    client: HttpClient,
    url: String,
    api_key: Option<String>,
    signer: Option<RequestSigner>,
}

impl RemoteSink {
    pub fn new(client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: None,
            signer: None,
        }
    }

    /// Send `X-API-Key` with every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sign every request body
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Compact JSON request body
    pub fn encode_body(papers: &[Paper]) -> Result<Vec<u8>, SinkError> {
        Ok(serde_json::to_vec(&PaperBatch { papers })?)
    }
}

#[async_trait]
impl Sink for RemoteSink {
    fn name(&self) -> &str {
        "api"
    }

    #[instrument(level = "info", skip_all, fields(url = %self.url))]
    async fn deliver(&self, papers: &[Paper]) -> Result<DeliveryReport, SinkError> {
        let body = Self::encode_body(papers)?;

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json");

        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        if let Some(signer) = &self.signer {
            request = request.header(SIGNATURE_HEADER, signer.sign(&body)?);
        }

        debug!(bytes = body.len(), signed = self.signer.is_some(), "Posting batch");

        let response = request.body(body).send().await.map_err(|e| {
            SinkError::Network(format!("Failed to send papers to API service: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        info!(count = papers.len(), "Sent papers to API service");

        Ok(DeliveryReport {
            delivered: papers.len(),
            destination: self.url.clone(),
        })
    }
}
