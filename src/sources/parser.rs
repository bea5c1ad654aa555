//! Atom response parser for the arXiv query API.
//!
//! A response is a single Atom feed carrying an `opensearch:totalResults`
//! count and zero or more `entry` elements. The count is mandatory: without
//! it pagination cannot proceed, so its absence fails the whole page. Each
//! entry on the other hand is validated on its own and a bad entry is
//! logged and dropped without disturbing its siblings.

use chrono::NaiveDateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Paper, PaperBuilder};
use crate::sources::SourceError;
use crate::utils::DedupSet;

/// Timestamp format of Atom `published` elements
const PUBLISHED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Marker in the id of the pseudo-entry arXiv returns for a rejected query
const API_ERROR_ID_MARKER: &str = "/api/errors";

/// Why a single feed entry was dropped
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EntryError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("entry has no authors")]
    NoAuthors,

    #[error("entry has no categories")]
    NoCategories,

    #[error("identifier {0:?} has no usable arXiv id")]
    InvalidId(String),

    #[error("invalid published timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("malformed text: {0}")]
    Malformed(String),
}

/// Result of parsing one response page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Papers that passed validation and were not seen before, in feed order
    pub papers: Vec<Paper>,

    /// Total number of results the query matches across all pages
    pub total_results: usize,

    /// Number of `entry` elements in the page
    pub entries_seen: usize,

    /// Entries dropped as malformed
    pub skipped: usize,

    /// Entries dropped because their id was already collected this run
    pub duplicates: usize,
}

/// Strip the URI prefix and version suffix from an Atom entry id
///
/// `http://arxiv.org/abs/2401.01234v2` becomes `2401.01234`. Everything
/// from the first `v` that is followed by a digit is dropped.
pub fn normalize_id(raw: &str) -> Option<String> {
    let segment = raw.trim().rsplit('/').next().unwrap_or_default();

    let cut = segment
        .char_indices()
        .find(|&(i, c)| c == 'v' && segment[i + 1..].starts_with(|d: char| d.is_ascii_digit()))
        .map_or(segment.len(), |(i, _)| i);

    let id = &segment[..cut];
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Parse a strict `YYYY-MM-DDTHH:MM:SSZ` UTC timestamp into Unix seconds
pub fn parse_published(value: &str) -> Result<i64, EntryError> {
    NaiveDateTime::parse_from_str(value.trim(), PUBLISHED_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| EntryError::InvalidTimestamp(value.trim().to_string()))
}

/// Parse one response payload
///
/// Every id that produced a paper is added to `seen`; entries whose id is
/// already in `seen` are counted as duplicates and left out.
pub fn parse_feed(xml: &str, seen: &mut DedupSet) -> Result<ParsedPage, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut page = ParsedPage::default();
    let mut total_results: Option<String> = None;

    let mut entry: Option<RawEntry> = None;
    let mut depth = 0usize;
    let mut field = Field::None;
    // Depth of the element that set `field`; markup nested inside it keeps it
    let mut field_depth = 0usize;
    let mut author_name: Option<String> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            SourceError::Parse(format!(
                "Malformed Atom feed at byte {}: {}",
                reader.error_position(),
                e
            ))
        })?;

        match event {
            Event::Start(ref e) => {
                let local = e.local_name();
                match entry.as_mut() {
                    None if local.as_ref() == b"entry" => {
                        entry = Some(RawEntry::default());
                        depth = 0;
                    }
                    None => {
                        if local.as_ref() == b"totalResults" {
                            field = Field::TotalResults;
                            total_results = Some(String::new());
                        }
                    }
                    Some(raw) => {
                        depth += 1;
                        let started = match (depth, local.as_ref()) {
                            (1, b"id") => Some(Field::Id),
                            (1, b"title") => Some(Field::Title),
                            (1, b"summary") => Some(Field::Summary),
                            (1, b"published") => Some(Field::Published),
                            (1, b"author") => {
                                author_name = Some(String::new());
                                None
                            }
                            (1, b"category") => {
                                raw.push_category(e);
                                None
                            }
                            (2, b"name") if author_name.is_some() => Some(Field::AuthorName),
                            _ => None,
                        };
                        if let Some(started) = started {
                            field = started;
                            field_depth = depth;
                        }
                    }
                }
            }
            Event::Empty(ref e) => {
                if let Some(raw) = entry.as_mut() {
                    if depth == 0 && e.local_name().as_ref() == b"category" {
                        raw.push_category(e);
                    }
                }
            }
            Event::Text(ref e) => {
                if field == Field::None {
                    continue;
                }
                match e.unescape() {
                    Ok(text) => append_text(
                        field,
                        &text,
                        entry.as_mut(),
                        &mut author_name,
                        &mut total_results,
                    ),
                    Err(err) => match entry.as_mut() {
                        Some(raw) => raw.malformed = Some(err.to_string()),
                        None => {
                            return Err(SourceError::Parse(format!(
                                "Malformed totalResults text: {}",
                                err
                            )))
                        }
                    },
                }
            }
            Event::CData(ref e) => {
                if field != Field::None {
                    let text = String::from_utf8_lossy(e);
                    append_text(
                        field,
                        &text,
                        entry.as_mut(),
                        &mut author_name,
                        &mut total_results,
                    );
                }
            }
            Event::End(ref e) => {
                let local = e.local_name();
                let Some(raw) = entry.as_mut() else {
                    field = Field::None;
                    continue;
                };

                if depth == 0 && local.as_ref() == b"entry" {
                    if let Some(raw) = entry.take() {
                        page.entries_seen += 1;
                        accept_entry(raw, page.entries_seen, seen, &mut page)?;
                    }
                    continue;
                }

                if depth == 1 && local.as_ref() == b"author" {
                    if let Some(name) = author_name.take() {
                        let name = name.trim();
                        if !name.is_empty() {
                            raw.authors.push(name.to_string());
                        }
                    }
                }
                if depth == field_depth {
                    field = Field::None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let raw_total = total_results
        .ok_or_else(|| SourceError::Parse("Response has no opensearch:totalResults".to_string()))?;
    page.total_results = raw_total.trim().parse().map_err(|_| {
        SourceError::Parse(format!(
            "Non-numeric opensearch:totalResults: {:?}",
            raw_total.trim()
        ))
    })?;

    Ok(page)
}

/// Text-bearing element currently being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    TotalResults,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

/// Entry fields as they appear in the feed, before validation
#[derive(Debug, Default)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    authors: Vec<String>,
    categories: Vec<String>,
    malformed: Option<String>,
}

impl RawEntry {
    fn push_category(&mut self, element: &BytesStart<'_>) {
        let term = element
            .try_get_attribute("term")
            .ok()
            .flatten()
            .and_then(|attr| attr.unescape_value().ok().map(|v| v.trim().to_string()));

        if let Some(term) = term.filter(|t| !t.is_empty()) {
            self.categories.push(term);
        }
    }

    fn is_api_error(&self) -> bool {
        self.id
            .as_deref()
            .is_some_and(|id| id.contains(API_ERROR_ID_MARKER))
    }

    fn into_paper(self) -> Result<Paper, EntryError> {
        if let Some(reason) = self.malformed {
            return Err(EntryError::Malformed(reason));
        }

        let raw_id = required(self.id, "id")?;
        let title = required(self.title, "title")?;
        let summary = required(self.summary, "summary")?;
        let published = required(self.published, "published")?;

        if self.authors.is_empty() {
            return Err(EntryError::NoAuthors);
        }
        if self.categories.is_empty() {
            return Err(EntryError::NoCategories);
        }

        let id = normalize_id(&raw_id).ok_or(EntryError::InvalidId(raw_id))?;
        let published_at = parse_published(&published)?;

        Ok(PaperBuilder::new(id, title)
            .authors(self.authors)
            .abstract_text(summary)
            .categories(self.categories)
            .published_at(published_at)
            .build())
    }
}

/// A trimmed, non-empty text field
fn required(value: Option<String>, name: &'static str) -> Result<String, EntryError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(EntryError::MissingField(name))
}

fn append_text(
    field: Field,
    text: &str,
    entry: Option<&mut RawEntry>,
    author_name: &mut Option<String>,
    total_results: &mut Option<String>,
) {
    if field == Field::TotalResults {
        if let Some(total) = total_results.as_mut() {
            total.push_str(text);
        }
        return;
    }
    if field == Field::AuthorName {
        if let Some(name) = author_name.as_mut() {
            name.push_str(text);
        }
        return;
    }

    let Some(raw) = entry else { return };
    let slot = match field {
        Field::Id => &mut raw.id,
        Field::Title => &mut raw.title,
        Field::Summary => &mut raw.summary,
        Field::Published => &mut raw.published,
        _ => return,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}

fn accept_entry(
    raw: RawEntry,
    position: usize,
    seen: &mut DedupSet,
    page: &mut ParsedPage,
) -> Result<(), SourceError> {
    if raw.is_api_error() {
        let message = raw.summary.unwrap_or_default();
        return Err(SourceError::Api(message.trim().to_string()));
    }

    match raw.into_paper() {
        Ok(paper) => {
            if seen.contains(&paper.id) {
                debug!(arxiv_id = %paper.id, "Skipping duplicate entry");
                page.duplicates += 1;
            } else {
                seen.insert(paper.id.clone());
                page.papers.push(paper);
            }
        }
        Err(e) => {
            warn!(entry = position, error = %e, "Skipping malformed entry");
            page.skipped += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(total: &str, entries: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="http://arxiv.org/api/query" rel="self" type="application/atom+xml"/>
  <title type="html">ArXiv Query: search_query=cat:cs.*</title>
  <id>http://arxiv.org/api/cHxbiOdZaP56ODnBPIenZhzg5f8</id>
  <updated>2024-01-15T00:00:00-05:00</updated>
  {total}
  <opensearch:itemsPerPage xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">100</opensearch:itemsPerPage>
  {entries}
</feed>"#
        )
    }

    fn total(n: &str) -> String {
        format!(
            r#"<opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">{n}</opensearch:totalResults>"#
        )
    }

    fn entry(id: &str, published: &str) -> String {
        format!(
            r#"<entry>
    <id>http://arxiv.org/abs/{id}</id>
    <updated>2024-01-15T08:30:00Z</updated>
    <published>{published}</published>
    <title>  A Study of {id}
      Across Lines </title>
    <summary>  We study things.
    </summary>
    <author><name>Ada Lovelace</name></author>
    <author>
      <name>Alan Turing</name>
      <arxiv:affiliation xmlns:arxiv="http://arxiv.org/schemas/atom">Bletchley</arxiv:affiliation>
    </author>
    <link href="http://arxiv.org/abs/{id}" rel="alternate" type="text/html"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="stat.ML" scheme="http://arxiv.org/schemas/atom"/>
  </entry>"#
        )
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(
            normalize_id("http://arxiv.org/abs/2401.01234v2").as_deref(),
            Some("2401.01234")
        );
        assert_eq!(
            normalize_id("http://arxiv.org/abs/2401.01234").as_deref(),
            Some("2401.01234")
        );
        assert_eq!(
            normalize_id("http://arxiv.org/abs/cs/0112017v1").as_deref(),
            Some("0112017")
        );
        assert_eq!(normalize_id("2401.01234v10").as_deref(), Some("2401.01234"));
        assert_eq!(normalize_id("http://arxiv.org/abs/"), None);
        assert_eq!(normalize_id("v1"), None);
    }

    #[test]
    fn test_normalize_id_keeps_v_without_digits() {
        assert_eq!(normalize_id("abs/solv-int9901v3").as_deref(), Some("solv-int9901"));
    }

    #[test]
    fn test_parse_published() {
        assert_eq!(parse_published("2024-01-15T08:30:00Z"), Ok(1_705_307_400));
        assert_eq!(parse_published("\n 1970-01-01T00:00:00Z "), Ok(0));
    }

    #[test]
    fn test_parse_published_rejects_other_formats() {
        for bad in [
            "2024-01-15T08:30:00+00:00",
            "2024-01-15 08:30:00Z",
            "2024-01-15T08:30Z",
            "2024-01-15",
            "2024-13-15T08:30:00Z",
            "",
        ] {
            assert!(
                matches!(parse_published(bad), Err(EntryError::InvalidTimestamp(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_feed_extracts_papers() {
        let xml = feed(
            &total("2"),
            &[
                entry("2401.00001v1", "2024-01-15T08:30:00Z"),
                entry("2401.00002v3", "2024-01-14T00:00:00Z"),
            ]
            .join("\n"),
        );
        let mut seen = DedupSet::new();

        let page = parse_feed(&xml, &mut seen).unwrap();

        assert_eq!(page.total_results, 2);
        assert_eq!(page.entries_seen, 2);
        assert_eq!(page.papers.len(), 2);

        let first = &page.papers[0];
        assert_eq!(first.id, "2401.00001");
        assert_eq!(first.title, "A Study of 2401.00001v1\n      Across Lines");
        assert_eq!(first.r#abstract, "We study things.");
        assert_eq!(first.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(first.categories, vec!["cs.LG", "stat.ML"]);
        assert_eq!(first.published_at, 1_705_307_400);
        assert_eq!(page.papers[1].id, "2401.00002");

        assert!(seen.contains("2401.00001"));
        assert!(seen.contains("2401.00002"));
    }

    #[test]
    fn test_feed_level_id_and_title_are_ignored() {
        let xml = feed(&total("0"), "");
        let page = parse_feed(&xml, &mut DedupSet::new()).unwrap();

        assert_eq!(page.total_results, 0);
        assert_eq!(page.entries_seen, 0);
        assert!(page.papers.is_empty());
    }

    #[test]
    fn test_missing_total_results_is_fatal() {
        let xml = feed("", &entry("2401.00001v1", "2024-01-15T08:30:00Z"));
        let result = parse_feed(&xml, &mut DedupSet::new());
        assert!(matches!(result, Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_non_numeric_total_results_is_fatal() {
        let xml = feed(&total("lots"), "");
        let result = parse_feed(&xml, &mut DedupSet::new());
        assert!(matches!(result, Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_malformed_xml_is_fatal() {
        let result = parse_feed("<feed><entry></feed>", &mut DedupSet::new());
        assert!(matches!(result, Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_bad_entries_are_skipped_individually() {
        let no_summary = entry("2401.00002v1", "2024-01-15T08:30:00Z")
            .replace("<summary>  We study things.\n    </summary>", "");
        let blank_title = entry("2401.00003v1", "2024-01-15T08:30:00Z").replace(
            "<title>  A Study of 2401.00003v1\n      Across Lines </title>",
            "<title>   </title>",
        );
        let no_authors = entry("2401.00004v1", "2024-01-15T08:30:00Z")
            .replace("<author><name>Ada Lovelace</name></author>", "")
            .replace("<name>Alan Turing</name>", "");
        let no_categories = entry("2401.00005v1", "2024-01-15T08:30:00Z")
            .replace(r#"<category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>"#, "")
            .replace(r#"<category term="stat.ML" scheme="http://arxiv.org/schemas/atom"/>"#, "");
        let bad_date = entry("2401.00006v1", "2024/01/15 08:30");

        let xml = feed(
            &total("7"),
            &[
                entry("2401.00001v1", "2024-01-15T08:30:00Z"),
                no_summary,
                blank_title,
                no_authors,
                no_categories,
                bad_date,
                entry("2401.00007v1", "2024-01-15T08:30:00Z"),
            ]
            .join("\n"),
        );
        let mut seen = DedupSet::new();

        let page = parse_feed(&xml, &mut seen).unwrap();

        let ids: Vec<&str> = page.papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2401.00001", "2401.00007"]);
        assert_eq!(page.entries_seen, 7);
        assert_eq!(page.skipped, 5);
        assert_eq!(seen.len(), 2);
        assert!(!seen.contains("2401.00006"));
    }

    #[test]
    fn test_duplicates_are_skipped_across_pages() {
        let mut seen = DedupSet::new();
        let first = feed(&total("2"), &entry("2401.00001v1", "2024-01-15T08:30:00Z"));
        let second = feed(
            &total("2"),
            &[
                entry("2401.00001v2", "2024-01-15T08:30:00Z"),
                entry("2401.00002v1", "2024-01-15T08:30:00Z"),
            ]
            .join("\n"),
        );

        let page_one = parse_feed(&first, &mut seen).unwrap();
        let page_two = parse_feed(&second, &mut seen).unwrap();

        assert_eq!(page_one.papers.len(), 1);
        assert_eq!(page_two.papers.len(), 1);
        assert_eq!(page_two.papers[0].id, "2401.00002");
        assert_eq!(page_two.duplicates, 1);
    }

    #[test]
    fn test_entities_and_cdata_are_decoded() {
        let tricky = entry("2401.00001v1", "2024-01-15T08:30:00Z")
            .replace(
                "<title>  A Study of 2401.00001v1\n      Across Lines </title>",
                "<title>Graphs &amp; Über-Networks: 图</title>",
            )
            .replace(
                "<summary>  We study things.\n    </summary>",
                "<summary><![CDATA[Uses <b>bold</b> claims]]></summary>",
            );
        let xml = feed(&total("1"), &tricky);

        let page = parse_feed(&xml, &mut DedupSet::new()).unwrap();

        assert_eq!(page.papers[0].title, "Graphs & Über-Networks: 图");
        assert_eq!(page.papers[0].r#abstract, "Uses <b>bold</b> claims");
    }

    #[test]
    fn test_inline_markup_keeps_surrounding_text() {
        let marked_up = entry("2401.00001v1", "2024-01-15T08:30:00Z")
            .replace(
                "<title>  A Study of 2401.00001v1\n      Across Lines </title>",
                "<title>Learning <i>fast</i> and slow</title>",
            )
            .replace(
                "<summary>  We study things.\n    </summary>",
                "<summary>We show <b>x</b> implies <sub>y</sub> always.</summary>",
            );
        let xml = feed(&total("1"), &marked_up);

        let page = parse_feed(&xml, &mut DedupSet::new()).unwrap();

        assert_eq!(page.papers[0].title, "Learning fast and slow");
        assert_eq!(page.papers[0].r#abstract, "We show x implies y always.");
        assert_eq!(page.papers[0].authors.len(), 2);
    }

    #[test]
    fn test_api_error_feed_is_reported() {
        let error_entry = r#"<entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
    <title>Error</title>
    <summary>incorrect id format for 1234</summary>
    <updated>2024-01-15T00:00:00-05:00</updated>
    <author><name>arXiv api core</name></author>
  </entry>"#;
        let xml = feed(&total("1"), error_entry);

        match parse_feed(&xml, &mut DedupSet::new()) {
            Err(SourceError::Api(message)) => assert_eq!(message, "incorrect id format for 1234"),
            other => panic!("expected API error, got {other:?}"),
        }
    }
}
