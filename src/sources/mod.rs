//! The arXiv search source and its response parser.
//!
//! [`ArxivSource`] performs the HTTP side of a page fetch behind the
//! [`PageSource`] trait and [`parse_feed`] turns the Atom payload into
//! validated [`Paper`]s. Both report fatal problems through [`SourceError`];
//! problems confined to one entry never leave the parser (see
//! [`EntryError`]).
//!
//! [`Paper`]: crate::models::Paper

mod arxiv;
mod parser;

use async_trait::async_trait;

use crate::models::PageQuery;

pub use arxiv::{ArxivSource, ARXIV_API_URL};
pub use parser::{normalize_id, parse_feed, parse_published, EntryError, ParsedPage};

/// Errors that can occur when interacting with the search API
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network or HTTP transport error
    #[error("Network error: {0}")]
    Network(String),

    /// The API answered with a non-success status
    #[error("Search API returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// The response could not be parsed as a result page
    #[error("Parse error: {0}")]
    Parse(String),

    /// The API rejected the query
    #[error("API error: {0}")]
    Api(String),
}

/// Where result pages come from
#[async_trait]
pub trait PageSource: Send + Sync + std::fmt::Debug {
    /// Fetch the raw Atom payload for one page
    async fn fetch_page(&self, query: &PageQuery) -> Result<String, SourceError>;
}
