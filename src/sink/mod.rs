//! Delivery sinks for collected papers.
//!
//! A run delivers every non-empty page through exactly one [`Sink`], chosen
//! at startup: [`LocalSink`] writes JSONL files, [`RemoteSink`] POSTs the
//! batch to an ingestion service. A failed delivery is never retried.

mod local;
mod remote;

pub use local::LocalSink;
pub use remote::{RemoteSink, API_KEY_HEADER, SIGNATURE_HEADER};

use async_trait::async_trait;

use crate::models::Paper;
use crate::utils::KeyError;

/// Outcome of a successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Number of papers delivered
    pub delivered: usize,

    /// File path or URL the papers went to
    pub destination: String,
}

/// A destination for batches of papers
#[async_trait]
pub trait Sink: Send + Sync + std::fmt::Debug {
    /// Short name used in logs ("local", "api")
    fn name(&self) -> &str;

    /// Deliver one batch, preserving its order
    async fn deliver(&self, papers: &[Paper]) -> Result<DeliveryReport, SinkError>;
}

/// Errors that can occur while delivering a batch
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Filesystem error
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The batch could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Network or HTTP transport error
    #[error("Network error: {0}")]
    Network(String),

    /// The request body could not be signed
    #[error("Failed to sign request body: {0}")]
    Signing(#[from] KeyError),

    /// The ingestion service answered with a non-success status
    #[error("Ingestion service returned status {status} for {url}")]
    Status { status: u16, url: String },
}
