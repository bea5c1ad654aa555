//! Paginated collection of one time window.
//!
//! The [`Collector`] walks the result pages of a single query strictly in
//! order: fetch, parse, deliver, pause, next page. Any failure other than a
//! malformed entry ends the run.

use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::{CollectorConfig, ConfigError, OutputTarget};
use crate::models::{CollectionWindow, PageQuery, PAGE_SIZE};
use crate::sink::{LocalSink, RemoteSink, Sink, SinkError};
use crate::sources::{parse_feed, ArxivSource, PageSource, SourceError};
use crate::utils::{DedupSet, HttpClient, KeyError};

/// Default pause between page requests
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(3);

/// Errors that end a collection run
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Signing key error: {0}")]
    Key(#[from] KeyError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Fetching page at offset {offset} failed: {source}")]
    Source {
        offset: usize,
        #[source]
        source: SourceError,
    },

    #[error("Delivery via {sink} sink failed: {source}")]
    Delivery {
        sink: String,
        #[source]
        source: SinkError,
    },
}

/// Counters for a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    pub pages_fetched: usize,
    pub papers_delivered: usize,
    pub entries_skipped: usize,
    pub duplicates_skipped: usize,
    /// `totalResults` reported by the last page
    pub total_results: usize,
}

/// Select the sink for the configured output target
pub fn build_sink(
    config: &CollectorConfig,
    client: HttpClient,
) -> Result<Box<dyn Sink>, CollectorError> {
    match &config.output {
        OutputTarget::Local { output_dir } => {
            let sink = LocalSink::create(output_dir).map_err(|source| CollectorError::Delivery {
                sink: "local".to_string(),
                source,
            })?;
            Ok(Box::new(sink))
        }
        OutputTarget::Remote(remote) => {
            let mut sink = RemoteSink::new(client, remote.url.as_str());
            if let Some(api_key) = &remote.api_key {
                sink = sink.with_api_key(api_key);
            }
            if let Some(key) = &remote.signing_key {
                sink = sink.with_signer(key.load()?);
            }
            Ok(Box::new(sink))
        }
    }
}

/// Drives the fetch, parse and deliver loop for one run
#[derive(Debug)]
pub struct Collector {
    source: Box<dyn PageSource>,
    sink: Box<dyn Sink>,
    fetch_hours: u32,
    request_delay: Duration,
    seen: DedupSet,
}

impl Collector {
    pub fn new(source: Box<dyn PageSource>, sink: Box<dyn Sink>, fetch_hours: u32) -> Self {
        Self {
            source,
            sink,
            fetch_hours,
            request_delay: DEFAULT_REQUEST_DELAY,
            seen: DedupSet::new(),
        }
    }

    /// Build the source, sink and signer described by `config`
    ///
    /// The signing key is loaded and the output directory created here, so
    /// both fail before any request is made.
    pub fn from_config(config: &CollectorConfig) -> Result<Self, CollectorError> {
        let client = HttpClient::with_timeout(config.request_timeout)?;
        let source = ArxivSource::with_base_url(client.clone(), &config.search_url);
        let sink = build_sink(config, client)?;

        Ok(Self::new(Box::new(source), sink, config.fetch_hours)
            .with_request_delay(config.request_delay))
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Ids collected so far in this run
    pub fn seen(&self) -> &DedupSet {
        &self.seen
    }

    pub fn sink(&self) -> &dyn Sink {
        self.sink.as_ref()
    }

    /// Collect the window ending now
    pub async fn collect(&mut self) -> Result<CollectionSummary, CollectorError> {
        let window = CollectionWindow::last_hours(self.fetch_hours);
        self.collect_window(&window).await
    }

    /// Collect every page of `window`
    ///
    /// Stops once `offset + PAGE_SIZE` reaches the reported total, or early
    /// if a page comes back without any entries.
    #[instrument(level = "info", skip_all, fields(window = %window.to_query_fragment()))]
    pub async fn collect_window(
        &mut self,
        window: &CollectionWindow,
    ) -> Result<CollectionSummary, CollectorError> {
        let base = PageQuery::computer_science(window, 0);
        let mut summary = CollectionSummary::default();
        let mut offset = 0;

        loop {
            let query = base.at_offset(offset);
            let page = self
                .source
                .fetch_page(&query)
                .await
                .and_then(|body| parse_feed(&body, &mut self.seen))
                .map_err(|source| CollectorError::Source { offset, source })?;

            summary.pages_fetched += 1;
            summary.total_results = page.total_results;
            summary.entries_skipped += page.skipped;
            summary.duplicates_skipped += page.duplicates;

            info!(
                offset,
                total_results = page.total_results,
                entries = page.entries_seen,
                papers = page.papers.len(),
                "Fetched page"
            );

            if !page.papers.is_empty() {
                let report = self.sink.deliver(&page.papers).await.map_err(|source| {
                    CollectorError::Delivery {
                        sink: self.sink.name().to_string(),
                        source,
                    }
                })?;
                summary.papers_delivered += report.delivered;
            }

            if offset + PAGE_SIZE >= page.total_results {
                break;
            }
            if page.entries_seen == 0 {
                warn!(
                    offset,
                    total_results = page.total_results,
                    "Page returned no entries before reaching totalResults, stopping"
                );
                break;
            }

            offset += PAGE_SIZE;
            tokio::time::sleep(self.request_delay).await;
        }

        info!(
            pages = summary.pages_fetched,
            delivered = summary.papers_delivered,
            skipped = summary.entries_skipped,
            duplicates = summary.duplicates_skipped,
            "Collection finished"
        );

        Ok(summary)
    }
}
