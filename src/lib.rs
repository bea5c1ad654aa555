//! # arxiv-collector
//!
//! Collects newly submitted computer-science papers from the arXiv query
//! API and delivers them to a local JSONL directory or a remote ingestion
//! service.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Paper, PageQuery, CollectionWindow)
//! - [`sources`]: arXiv HTTP client and Atom response parser
//! - [`sink`]: Delivery targets behind the [`Sink`] trait
//! - [`collector`]: The pagination loop tying source and sink together
//! - [`utils`]: HTTP client, deduplication, and request signing
//! - [`config`]: Configuration loading and validation

pub mod collector;
pub mod config;
pub mod models;
pub mod sink;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use collector::{build_sink, CollectionSummary, Collector, CollectorError};
pub use models::Paper;
pub use sink::Sink;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
