//! Paper model representing one normalized arXiv search result.

use serde::{Deserialize, Serialize};

/// A computer-science paper collected from arXiv
///
/// Every field is required: the parser only ever builds a `Paper` once the
/// entry passed validation, and the serialized field names are the wire
/// format shared by the local JSONL files and the remote ingestion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// arXiv identifier without version suffix (e.g. "2401.01234")
    #[serde(rename = "arxiv_id")]
    pub id: String,

    /// Paper title, whitespace-trimmed
    pub title: String,

    /// Author names in feed order
    pub authors: Vec<String>,

    /// Abstract text, whitespace-trimmed
    pub r#abstract: String,

    /// Category terms in feed order (e.g. "cs.LG")
    pub categories: Vec<String>,

    /// Publication instant as a Unix timestamp (UTC seconds)
    #[serde(rename = "published_date")]
    pub published_at: i64,
}

/// Builder for constructing Paper objects
#[derive(Debug, Clone, Default)]
pub struct PaperBuilder {
    id: String,
    title: String,
    authors: Vec<String>,
    abstract_text: String,
    categories: Vec<String>,
    published_at: i64,
}

impl PaperBuilder {
    /// Create a new builder with the identifier and title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Add one author
    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.authors.push(name.into());
        self
    }

    /// Replace the author list
    pub fn authors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set abstract
    pub fn abstract_text(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = abstract_text.into();
        self
    }

    /// Add one category term
    pub fn category(mut self, term: impl Into<String>) -> Self {
        self.categories.push(term.into());
        self
    }

    /// Replace the category list
    pub fn categories<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = terms.into_iter().map(Into::into).collect();
        self
    }

    /// Set publication timestamp
    pub fn published_at(mut self, timestamp: i64) -> Self {
        self.published_at = timestamp;
        self
    }

    /// Build the Paper
    pub fn build(self) -> Paper {
        Paper {
            id: self.id,
            title: self.title,
            authors: self.authors,
            r#abstract: self.abstract_text,
            categories: self.categories,
            published_at: self.published_at,
        }
    }
}

/// Request body for the remote ingestion API
#[derive(Debug, Serialize)]
pub struct PaperBatch<'a> {
    pub papers: &'a [Paper],
}
