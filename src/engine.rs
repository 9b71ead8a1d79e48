//! WikiEngine: the caller-facing entry point
//!
//! Every operation names its web by address and takes times explicitly;
//! the engine never reads a clock.

use crate::config::WikiConfig;
use crate::graph::ReferenceGraph;
use crate::ledger::{PageEdit, RevisionLedger};
use crate::markup::{LinkNormalizer, Renderer, WikiRenderer};
use crate::model::{NewWeb, Page, PageLock, PageSnapshot, Revision, RevisionId, Web};
use crate::query::{PageSet, SearchResults};
use crate::storage::{CommitOutcome, OpenStore, SqliteStore, StorageError, WikiStore};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors reported to callers
#[derive(Debug, Error)]
pub enum WikiError {
    /// The request was understood but refused
    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for WikiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::WebExists(address) => {
                WikiError::Validation(format!("A web with address '{}' already exists", address))
            }
            StorageError::PageExists(name) => {
                WikiError::Validation(format!("There is already a page named '{}'", name))
            }
            StorageError::PageNotFound(id) => WikiError::NotFound(format!("page {}", id)),
            other => WikiError::Storage(other),
        }
    }
}

/// Result type for engine operations
pub type WikiResult<T> = Result<T, WikiError>;

/// Orphaned and wanted pages of a web (or one of its categories)
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PageListing {
    pub orphans: Vec<String>,
    pub wanted: Vec<String>,
}

/// The wiki engine
///
/// Wraps a store and a renderer. Cheap to share: all state lives in the
/// store.
pub struct WikiEngine {
    store: Arc<dyn WikiStore>,
    renderer: Arc<dyn Renderer>,
    normalizer: LinkNormalizer,
    config: WikiConfig,
}

impl WikiEngine {
    /// Engine with the default renderer
    pub fn new(store: Arc<dyn WikiStore>, config: WikiConfig) -> Self {
        Self::with_renderer(store, Arc::new(WikiRenderer::new()), config)
    }

    pub fn with_renderer(store: Arc<dyn WikiStore>, renderer: Arc<dyn Renderer>, config: WikiConfig) -> Self {
        let normalizer = LinkNormalizer::new(config.legacy_link_prefix.clone());
        Self {
            store,
            renderer,
            normalizer,
            config,
        }
    }

    /// Engine over a fresh in-memory SQLite store
    pub fn in_memory(config: WikiConfig) -> WikiResult<Self> {
        let store = SqliteStore::open_in_memory()?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn WikiStore {
        self.store.as_ref()
    }

    fn ledger(&self) -> RevisionLedger<'_> {
        RevisionLedger::new(
            self.store.as_ref(),
            self.renderer.as_ref(),
            &self.normalizer,
            self.config.merge_window(),
        )
    }

    // === Webs ===

    pub fn create_web(&self, web: &NewWeb) -> WikiResult<Web> {
        if web.name.trim().is_empty() || web.address.trim().is_empty() {
            return Err(WikiError::Validation("A web needs a name and an address".to_string()));
        }
        if !web
            .address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(WikiError::Validation(format!(
                "Web address '{}' may only contain ASCII letters, digits, '_' and '-'",
                web.address
            )));
        }
        if !self.renderer.supports(web.markup) {
            return Err(WikiError::Validation(format!(
                "No markup engine is available for {}; pages in this web could not be saved",
                web.markup
            )));
        }
        let created = self.store.create_web(web)?;
        info!(web = %created.address, markup = %created.markup, "created web");
        Ok(created)
    }

    pub fn web(&self, address: &str) -> WikiResult<Web> {
        self.store
            .load_web(address)?
            .ok_or_else(|| WikiError::NotFound(format!("Web '{}'", address)))
    }

    pub fn webs(&self) -> WikiResult<Vec<Web>> {
        Ok(self.store.list_webs()?)
    }

    // === Pages ===

    /// Create or update a page
    pub fn revise(&self, address: &str, edit: &PageEdit) -> WikiResult<PageSnapshot> {
        let web = self.web(address)?;
        let outcome = self.ledger().revise(&web, edit)?;
        self.snapshot(outcome)
    }

    /// Re-save the revision at `index` (0-based) as a new edit
    pub fn rollback(
        &self,
        address: &str,
        page_name: &str,
        index: usize,
        origin: Option<&str>,
        time: DateTime<Utc>,
    ) -> WikiResult<PageSnapshot> {
        let web = self.web(address)?;
        let outcome = self.ledger().rollback(&web, page_name, index, origin, time)?;
        self.snapshot(outcome)
    }

    fn snapshot(&self, outcome: CommitOutcome) -> WikiResult<PageSnapshot> {
        let revision_count = self.store.revision_count(outcome.page.id)?;
        Ok(PageSnapshot {
            page: outcome.page,
            current: outcome.revision,
            revision_count,
        })
    }

    fn load_page(&self, web: &Web, name: &str) -> WikiResult<Page> {
        self.store
            .load_page(web.id, name)?
            .ok_or_else(|| WikiError::NotFound(format!("Page '{}' in web '{}'", name, web.address)))
    }

    /// The page with its current revision, if it exists
    pub fn read_page(&self, address: &str, name: &str) -> WikiResult<Option<PageSnapshot>> {
        let web = self.web(address)?;
        let Some(page) = self.store.load_page(web.id, name)? else {
            return Ok(None);
        };
        let Some(current) = self.store.current_revision(page.id)? else {
            return Ok(None);
        };
        let revision_count = self.store.revision_count(page.id)?;
        Ok(Some(PageSnapshot {
            page,
            current,
            revision_count,
        }))
    }

    pub fn page(&self, address: &str, name: &str) -> WikiResult<PageSnapshot> {
        self.read_page(address, name)?
            .ok_or_else(|| WikiError::NotFound(format!("Page '{}' in web '{}'", name, address)))
    }

    /// Full history, oldest first
    pub fn revisions(&self, address: &str, name: &str) -> WikiResult<Vec<Revision>> {
        let web = self.web(address)?;
        let page = self.load_page(&web, name)?;
        Ok(self.store.revisions(page.id)?)
    }

    /// Revision by 1-based position in the history
    pub fn revision(&self, address: &str, name: &str, number: usize) -> WikiResult<Revision> {
        let history = self.revisions(address, name)?;
        number
            .checked_sub(1)
            .and_then(|index| history.into_iter().nth(index))
            .ok_or_else(|| WikiError::NotFound(format!("Revision {} of page '{}'", number, name)))
    }

    /// The revision appended just before `revision_id`
    pub fn previous_revision(
        &self,
        address: &str,
        name: &str,
        revision_id: RevisionId,
    ) -> WikiResult<Option<Revision>> {
        let history = self.revisions(address, name)?;
        let position = history
            .iter()
            .position(|revision| revision.id == revision_id)
            .ok_or_else(|| WikiError::NotFound(format!("Revision {} of page '{}'", revision_id, name)))?;
        Ok(position
            .checked_sub(1)
            .and_then(|previous| history.get(previous).cloned()))
    }

    /// Current name of the page that used to be called `old_name`
    pub fn page_that_redirects_for(&self, address: &str, old_name: &str) -> WikiResult<Option<String>> {
        let web = self.web(address)?;
        Ok(ReferenceGraph::new(self.store.as_ref(), web.id).redirect_target(old_name)?)
    }

    pub fn delete_page(&self, address: &str, name: &str) -> WikiResult<()> {
        let web = self.web(address)?;
        let page = self.load_page(&web, name)?;
        self.store.delete_page(page.id)?;
        info!(web = %web.address, page = %name, "deleted page");
        Ok(())
    }

    pub fn authors(&self, address: &str) -> WikiResult<Vec<String>> {
        let web = self.web(address)?;
        Ok(self.store.authors(web.id)?)
    }

    /// Author name to the pages they revised, both sorted
    pub fn page_names_by_author(&self, address: &str) -> WikiResult<BTreeMap<String, Vec<String>>> {
        let set = self.page_set(address, None)?;
        let mut by_author = BTreeMap::new();
        for author in self.store.authors(set.web().id)? {
            let pages = set.pages_authored_by(&author)?;
            by_author.insert(author, pages);
        }
        Ok(by_author)
    }

    // === Files ===

    pub fn register_file(&self, address: &str, file_name: &str, description: &str) -> WikiResult<()> {
        if file_name.trim().is_empty() {
            return Err(WikiError::Validation("File name cannot be blank".to_string()));
        }
        let web = self.web(address)?;
        self.store.save_file(web.id, file_name, description)?;
        Ok(())
    }

    pub fn pages_that_link_to_file(&self, address: &str, file_name: &str) -> WikiResult<Vec<String>> {
        let web = self.web(address)?;
        Ok(ReferenceGraph::new(self.store.as_ref(), web.id).pages_that_link_to_file(file_name)?)
    }

    // === Locks ===

    pub fn lock(&self, address: &str, name: &str, time: DateTime<Utc>, locked_by: &str) -> WikiResult<Page> {
        let web = self.web(address)?;
        let mut page = self.load_page(&web, name)?;
        let lock = PageLock::new(time, locked_by);
        self.store.save_lock(page.id, Some(&lock))?;
        info!(web = %web.address, page = %page.name, by = %locked_by, "locked page");
        page.lock = Some(lock);
        Ok(page)
    }

    pub fn unlock(&self, address: &str, name: &str) -> WikiResult<Page> {
        let web = self.web(address)?;
        let mut page = self.load_page(&web, name)?;
        self.store.save_lock(page.id, None)?;
        info!(web = %web.address, page = %page.name, "unlocked page");
        page.lock = None;
        Ok(page)
    }

    pub fn is_locked(&self, address: &str, name: &str, now: DateTime<Utc>) -> WikiResult<bool> {
        let web = self.web(address)?;
        let page = self.load_page(&web, name)?;
        Ok(page.is_locked(now, self.config.lock_period()))
    }

    // === Queries ===

    /// All pages of a web, or only those in `category`
    pub fn page_set(&self, address: &str, category: Option<&str>) -> WikiResult<PageSet<'_>> {
        let web = self.web(address)?;
        let set = PageSet::load(self.store.as_ref(), web, self.config.home_page.clone())?;
        match category {
            Some(category) => set.in_category(category),
            None => Ok(set),
        }
    }

    pub fn orphans(&self, address: &str, category: Option<&str>) -> WikiResult<Vec<String>> {
        self.page_set(address, category)?.orphaned_pages()
    }

    pub fn wanted_pages(&self, address: &str, category: Option<&str>) -> WikiResult<Vec<String>> {
        self.page_set(address, category)?.wanted_pages()
    }

    pub fn listing(&self, address: &str, category: Option<&str>) -> WikiResult<PageListing> {
        let set = self.page_set(address, category)?;
        Ok(PageListing {
            orphans: set.orphaned_pages()?,
            wanted: set.wanted_pages()?,
        })
    }

    pub fn categories(&self, address: &str) -> WikiResult<Vec<String>> {
        let web = self.web(address)?;
        Ok(ReferenceGraph::new(self.store.as_ref(), web.id).list_categories()?)
    }

    pub fn search(&self, address: &str, query: &str) -> WikiResult<SearchResults> {
        self.page_set(address, None)?.search(query)
    }

    /// Current revisions, most recently revised first
    pub fn recent(&self, address: &str, offset: usize, limit: usize) -> WikiResult<Vec<PageSnapshot>> {
        let set = self.page_set(address, None)?.by_revision(offset, limit);
        let mut snapshots = Vec::with_capacity(set.len());
        for entry in set.entries() {
            snapshots.push(PageSnapshot {
                page: entry.page.clone(),
                current: entry.current.clone(),
                revision_count: self.store.revision_count(entry.page.id)?,
            });
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, MarkupMode};
    use chrono::{Duration, TimeZone};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn engine() -> WikiEngine {
        let engine = WikiEngine::in_memory(WikiConfig::default()).unwrap();
        engine.create_web(&NewWeb::new("Test", "test")).unwrap();
        engine
    }

    fn save(engine: &WikiEngine, name: &str, content: &str, author: &str, minute: i64) -> PageSnapshot {
        engine
            .revise("test", &PageEdit::new(name, content, Author::new(author), t(minute)))
            .unwrap()
    }

    #[test]
    fn create_web_validates_address() {
        let engine = engine();
        let err = engine.create_web(&NewWeb::new("Dup", "test")).unwrap_err();
        assert!(matches!(err, WikiError::Validation(_)));
        let err = engine.create_web(&NewWeb::new("Bad", "has space")).unwrap_err();
        assert!(matches!(err, WikiError::Validation(_)));
        let err = engine.create_web(&NewWeb::new("Accents", "café")).unwrap_err();
        assert!(matches!(err, WikiError::Validation(ref msg) if msg.contains("ASCII")));
        assert_eq!(engine.webs().unwrap().len(), 1);
    }

    #[test]
    fn web_in_unrenderable_markup_is_refused() {
        let engine = engine();
        for markup in [MarkupMode::Textile, MarkupMode::Mixed] {
            let err = engine
                .create_web(&NewWeb::new("Old", "old").with_markup(markup))
                .unwrap_err();
            assert!(matches!(err, WikiError::Validation(ref msg) if msg.contains("No markup engine")));
        }
        assert!(engine.web("old").is_err());
        engine
            .create_web(&NewWeb::new("New", "new").with_markup(MarkupMode::Markdown))
            .unwrap();
    }

    #[test]
    fn unknown_web_is_not_found() {
        let engine = engine();
        assert!(matches!(engine.web("nope"), Err(WikiError::NotFound(_))));
        let edit = PageEdit::new("Page", "x", Author::new("a"), t(0));
        assert!(matches!(engine.revise("nope", &edit), Err(WikiError::NotFound(_))));
    }

    #[test]
    fn snapshot_reports_history() {
        let engine = engine();
        let first = save(&engine, "Page", "one", "alice", 0);
        assert!(!first.has_history());
        let second = save(&engine, "Page", "two", "bob", 5);
        assert!(second.has_history());
        assert_eq!(second.content(), "two");
        assert_eq!(engine.page("test", "Page").unwrap(), second);
        assert!(engine.read_page("test", "Missing").unwrap().is_none());
    }

    #[test]
    fn revisions_are_numbered_from_one() {
        let engine = engine();
        save(&engine, "Page", "one", "alice", 0);
        let latest = save(&engine, "Page", "two", "bob", 5);

        assert_eq!(engine.revision("test", "Page", 1).unwrap().content, "one");
        assert_eq!(engine.revision("test", "Page", 2).unwrap().content, "two");
        assert!(matches!(engine.revision("test", "Page", 0), Err(WikiError::NotFound(_))));
        assert!(matches!(engine.revision("test", "Page", 3), Err(WikiError::NotFound(_))));

        let previous = engine
            .previous_revision("test", "Page", latest.current.id)
            .unwrap()
            .unwrap();
        assert_eq!(previous.content, "one");
        assert!(engine
            .previous_revision("test", "Page", previous.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn lock_cycle_uses_configured_period() {
        let engine = engine();
        save(&engine, "Page", "text", "alice", 0);

        let page = engine.lock("test", "Page", t(0), "alice").unwrap();
        assert_eq!(page.locked_by(), Some("alice"));
        assert!(engine.is_locked("test", "Page", t(29)).unwrap());
        assert!(!engine.is_locked("test", "Page", t(30)).unwrap());

        engine.unlock("test", "Page").unwrap();
        assert!(!engine.is_locked("test", "Page", t(1)).unwrap());
        assert_eq!(engine.page("test", "Page").unwrap().page.lock, None);
    }

    #[test]
    fn lock_on_missing_page_is_not_found() {
        let engine = engine();
        let err = engine.lock("test", "Nowhere", t(0), "alice").unwrap_err();
        assert!(matches!(err, WikiError::NotFound(_)));
    }

    #[test]
    fn delete_removes_page_and_its_edges() {
        let engine = engine();
        save(&engine, "HomePage", "see [[Gone]]", "alice", 0);
        save(&engine, "Gone", "links [[HomePage]]", "alice", 0);

        engine.delete_page("test", "Gone").unwrap();
        assert!(engine.read_page("test", "Gone").unwrap().is_none());
        assert_eq!(engine.wanted_pages("test", None).unwrap(), vec!["Gone"]);
        assert!(matches!(engine.delete_page("test", "Gone"), Err(WikiError::NotFound(_))));
    }

    #[test]
    fn files_are_classified_by_registration() {
        let engine = engine();
        engine.register_file("test", "report.pdf", "Quarterly report").unwrap();
        save(&engine, "Page", "[[report.pdf:file]] and [[draft.pdf:file]]", "alice", 0);

        assert_eq!(engine.pages_that_link_to_file("test", "report.pdf").unwrap(), vec!["Page"]);
        assert!(engine.pages_that_link_to_file("test", "draft.pdf").unwrap().is_empty());
    }

    #[test]
    fn authors_and_their_pages() {
        let engine = engine();
        save(&engine, "One", "x", "alice", 0);
        save(&engine, "Two", "y", "bob", 0);
        save(&engine, "One", "z", "bob", 60);

        assert_eq!(engine.authors("test").unwrap(), vec!["alice", "bob"]);
        let by_author = engine.page_names_by_author("test").unwrap();
        assert_eq!(by_author["alice"], vec!["One"]);
        assert_eq!(by_author["bob"], vec!["One", "Two"]);
    }

    #[test]
    fn recent_lists_newest_first() {
        let engine = engine();
        save(&engine, "Early", "x", "alice", 0);
        save(&engine, "Late", "y", "alice", 90);

        let recent = engine.recent("test", 0, 10).unwrap();
        let names: Vec<_> = recent.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["Late", "Early"]);
    }

    #[test]
    fn redirect_lookup_after_rename() {
        let engine = engine();
        save(&engine, "Draft", "body", "alice", 0);
        let edit = PageEdit::new("Draft", "body", Author::new("alice"), t(1)).renamed_to("Final");
        engine.revise("test", &edit).unwrap();

        assert_eq!(
            engine.page_that_redirects_for("test", "Draft").unwrap().as_deref(),
            Some("Final")
        );
        assert_eq!(engine.page_that_redirects_for("test", "Other").unwrap(), None);
    }
}
