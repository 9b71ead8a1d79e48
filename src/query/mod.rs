//! Page set queries for wikiledger webs
//!
//! Provides orphan and wanted-page detection, ordering, category subsets
//! and title/content search over a chosen set of pages.

mod page_set;
mod search;

pub use page_set::{PageEntry, PageSet};
pub use search::SearchResults;
