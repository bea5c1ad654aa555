//! Core data models for collected papers and page queries.

mod paper;
mod search;

pub use paper::{Paper, PaperBatch, PaperBuilder};
pub use search::{CollectionWindow, PageQuery, CS_CATEGORY_FILTER, PAGE_SIZE};
