//! Aggregate questions over a set of pages in one web

use super::search::{self, SearchResults};
use crate::engine::WikiResult;
use crate::graph::ReferenceGraph;
use crate::model::{LinkKind, Page, Revision, Web};
use crate::storage::WikiStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A page and its current revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageEntry {
    pub page: Page,
    pub current: Revision,
}

impl PageEntry {
    pub fn name(&self) -> &str {
        &self.page.name
    }
}

/// A web plus a chosen subset of its pages
///
/// Membership questions (`pages_that_reference` and friends) are answered
/// from the whole web's graph and then restricted to the set.
pub struct PageSet<'a> {
    store: &'a dyn WikiStore,
    web: Web,
    home_page: String,
    entries: Vec<PageEntry>,
}

impl<'a> PageSet<'a> {
    /// Every page of the web, ordered by name
    pub fn load(store: &'a dyn WikiStore, web: Web, home_page: impl Into<String>) -> WikiResult<Self> {
        let mut heads: HashMap<_, Revision> = store
            .current_revisions(web.id)?
            .into_iter()
            .map(|revision| (revision.page_id, revision))
            .collect();
        let entries = store
            .list_pages(web.id)?
            .into_iter()
            .filter_map(|page| heads.remove(&page.id).map(|current| PageEntry { page, current }))
            .collect();

        Ok(Self {
            store,
            web,
            home_page: home_page.into(),
            entries,
        })
    }

    pub fn web(&self) -> &Web {
        &self.web
    }

    pub fn entries(&self) -> &[PageEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.page.name == name)
    }

    fn graph(&self) -> ReferenceGraph<'a> {
        ReferenceGraph::new(self.store, self.web.id)
    }

    /// Keep only the entries `keep` accepts
    pub fn filter(mut self, keep: impl Fn(&PageEntry) -> bool) -> Self {
        self.entries.retain(|entry| keep(entry));
        self
    }

    /// Keep only the named pages
    pub fn restrict_to(self, names: &[String]) -> Self {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        self.filter(|entry| wanted.contains(entry.page.name.as_str()))
    }

    /// Keep only pages tagged with `category`
    pub fn in_category(self, category: &str) -> WikiResult<Self> {
        let tagged = self.graph().pages_in_category(category)?;
        Ok(self.restrict_to(&tagged))
    }

    pub fn by_name(mut self) -> Self {
        self.entries.sort_by(|a, b| a.page.name.cmp(&b.page.name));
        self
    }

    /// Most recently revised first, then a window of `limit` after `offset`
    pub fn by_revision(mut self, offset: usize, limit: usize) -> Self {
        self.entries.sort_by(|a, b| {
            b.current
                .revised_at
                .cmp(&a.current.revised_at)
                .then_with(|| b.current.id.cmp(&a.current.id))
        });
        self.entries = self.entries.into_iter().skip(offset).take(limit).collect();
        self
    }

    /// Timestamp of the most recently appended revision, or the epoch
    pub fn most_recent_revision(&self) -> DateTime<Utc> {
        self.entries
            .iter()
            .max_by_key(|entry| entry.current.id)
            .map(|entry| entry.current.revised_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.page.name.clone()).collect()
    }

    /// Total characters of current content
    pub fn characters(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.current.content.chars().count())
            .sum()
    }

    /// Linked and wanted names referenced from pages in the set, sorted
    pub fn wiki_words(&self) -> WikiResult<Vec<String>> {
        let members: HashSet<_> = self.entries.iter().map(|entry| entry.page.id).collect();
        let words: BTreeSet<String> = self
            .store
            .references_in_web(self.web.id, &LinkKind::PAGE_LINKS)?
            .into_iter()
            .filter(|reference| members.contains(&reference.page_id))
            .map(|reference| reference.referenced_name)
            .collect();
        Ok(words.into_iter().collect())
    }

    /// Wiki words that resolve through a redirect
    pub fn redirected_names(&self) -> WikiResult<Vec<String>> {
        let graph = self.graph();
        let mut names = Vec::new();
        for word in self.wiki_words()? {
            if graph.has_redirect_for(&word)? {
                names.push(word);
            }
        }
        Ok(names)
    }

    /// Pages in the set with at least one revision by `author`
    pub fn pages_authored_by(&self, author: &str) -> WikiResult<Vec<String>> {
        let authored: HashSet<_> = self
            .store
            .authored_pages(self.web.id)?
            .into_iter()
            .filter(|(name, _)| name == author)
            .map(|(_, page_id)| page_id)
            .collect();
        Ok(self
            .entries
            .iter()
            .filter(|entry| authored.contains(&entry.page.id))
            .map(|entry| entry.page.name.clone())
            .collect())
    }

    pub fn pages_that_reference(&self, name: &str) -> WikiResult<Vec<String>> {
        let names = self.graph().pages_that_reference(name)?;
        Ok(self.members_of(names))
    }

    pub fn pages_that_link_to(&self, name: &str) -> WikiResult<Vec<String>> {
        let names = self.graph().pages_that_link_to(name)?;
        Ok(self.members_of(names))
    }

    pub fn pages_that_include(&self, name: &str) -> WikiResult<Vec<String>> {
        let names = self.graph().pages_that_include(name)?;
        Ok(self.members_of(names))
    }

    /// Pages of the whole web tagged with `category`
    pub fn pages_in_category(&self, category: &str) -> WikiResult<Vec<String>> {
        Ok(self.graph().pages_in_category(category)?)
    }

    /// Pages nothing else in the web references
    ///
    /// The home page and pages named after an author are never orphans. A
    /// page that only references itself is still an orphan.
    pub fn orphaned_pages(&self) -> WikiResult<Vec<String>> {
        let mut never_orphans: HashSet<String> = self.store.authors(self.web.id)?.into_iter().collect();
        never_orphans.insert(self.home_page.clone());
        let referenced = self.graph().externally_referenced_pages()?;

        Ok(self
            .entries
            .iter()
            .map(|entry| &entry.page.name)
            .filter(|name| !never_orphans.contains(*name) && !referenced.contains(*name))
            .cloned()
            .collect())
    }

    /// Names referenced from the set that have no page and are not an old
    /// name of one
    pub fn wanted_pages(&self) -> WikiResult<Vec<String>> {
        let existing: HashSet<String> = self
            .store
            .list_pages(self.web.id)?
            .into_iter()
            .map(|page| page.name)
            .collect();
        let redirected: HashSet<String> = self
            .graph()
            .referenced_redirection_names()?
            .into_iter()
            .collect();

        Ok(self
            .wiki_words()?
            .into_iter()
            .filter(|word| !existing.contains(word) && !redirected.contains(word))
            .collect())
    }

    /// Case-insensitive match on page names and current content
    pub fn search(&self, query: &str) -> WikiResult<SearchResults> {
        search::search(&self.entries, query)
    }

    fn members_of(&self, names: Vec<String>) -> Vec<String> {
        names.into_iter().filter(|name| self.contains(name)).collect()
    }
}
