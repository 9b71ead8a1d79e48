//! Title and full-text search over a page set

use super::page_set::PageEntry;
use crate::engine::{WikiError, WikiResult};
use serde::Serialize;
use std::collections::BTreeSet;

/// Search outcome, every list ordered by page name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub query: String,
    /// Pages whose name contains the query
    pub title_matches: Vec<String>,
    /// Pages whose current content contains the query
    pub content_matches: Vec<String>,
    /// Union of both
    pub results: Vec<String>,
}

impl SearchResults {
    /// The only matching page, when there is exactly one
    pub fn single_hit(&self) -> Option<&str> {
        match self.results.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub(crate) fn search(entries: &[PageEntry], query: &str) -> WikiResult<SearchResults> {
    if query.trim().is_empty() {
        return Err(WikiError::Validation(
            "Cannot search for blank or empty text".to_string(),
        ));
    }
    let needle = query.to_lowercase();

    let mut titles = BTreeSet::new();
    let mut contents = BTreeSet::new();
    for entry in entries {
        if entry.page.name.to_lowercase().contains(&needle) {
            titles.insert(entry.page.name.clone());
        }
        if entry.current.content.to_lowercase().contains(&needle) {
            contents.insert(entry.page.name.clone());
        }
    }

    let results = titles.union(&contents).cloned().collect();
    Ok(SearchResults {
        query: query.to_string(),
        title_matches: titles.into_iter().collect(),
        content_matches: contents.into_iter().collect(),
        results,
    })
}
