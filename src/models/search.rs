//! Page query and collection window models.

use chrono::{DateTime, Duration, Utc};

/// Fixed number of results requested per page
pub const PAGE_SIZE: usize = 100;

/// Category filter selecting every computer-science subject class
pub const CS_CATEGORY_FILTER: &str = "cat:cs.*";

/// Date format used by arXiv `submittedDate` range queries
const SUBMITTED_DATE_FORMAT: &str = "%Y%m%d%H%M";

/// Results are always ordered newest submission first
const SORT_BY: &str = "submittedDate";
const SORT_ORDER: &str = "descending";

/// The UTC range `[start, end)` a collection run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CollectionWindow {
    /// Window covering the `hours` before `end`
    pub fn ending_at(end: DateTime<Utc>, hours: u32) -> Self {
        Self {
            start: end - Duration::hours(i64::from(hours)),
            end,
        }
    }

    /// Window covering the `hours` before now
    pub fn last_hours(hours: u32) -> Self {
        Self::ending_at(Utc::now(), hours)
    }

    /// Render as an arXiv query fragment, e.g.
    /// `submittedDate:[202401140830 TO 202401150830]`
    pub fn to_query_fragment(&self) -> String {
        format!(
            "submittedDate:[{} TO {}]",
            self.start.format(SUBMITTED_DATE_FORMAT),
            self.end.format(SUBMITTED_DATE_FORMAT)
        )
    }
}

/// Parameters for fetching one page of results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// Full `search_query` expression
    pub search_query: String,

    /// Offset of the first result
    pub start: usize,

    /// Page size
    pub max_results: usize,
}

impl PageQuery {
    /// Query for computer-science papers submitted inside `window`,
    /// newest first
    pub fn computer_science(window: &CollectionWindow, start: usize) -> Self {
        Self {
            search_query: format!("{} AND {}", CS_CATEGORY_FILTER, window.to_query_fragment()),
            start,
            max_results: PAGE_SIZE,
        }
    }

    /// The same query shifted to another offset
    pub fn at_offset(&self, start: usize) -> Self {
        Self {
            start,
            ..self.clone()
        }
    }

    /// Query string parameters in the order the API documents them
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("search_query", self.search_query.clone()),
            ("start", self.start.to_string()),
            ("max_results", self.max_results.to_string()),
            ("sortBy", SORT_BY.to_string()),
            ("sortOrder", SORT_ORDER.to_string()),
        ]
    }
}
