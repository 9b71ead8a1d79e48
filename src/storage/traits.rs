//! Storage trait definitions

use crate::model::{
    Author, LinkKind, NewWeb, Page, PageId, PageLock, Reference, Revision, RevisionId, Web,
    WebId, WebReference,
};
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Connection lock poisoned")]
    LockPoisoned,

    #[error("Unknown link type code: {0:?}")]
    UnknownLinkKind(String),

    #[error("Unknown markup mode: {0}")]
    UnknownMarkup(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Web address already in use: {0}")]
    WebExists(String),

    #[error("Page name already in use: {0}")]
    PageExists(String),

    #[error("Page not found: {0}")]
    PageNotFound(PageId),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Which page a commit writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitTarget {
    /// Create the page together with its first revision
    NewPage,
    /// Write to an existing page whose head revision was `head` when the
    /// caller made its decision
    Existing {
        page_id: PageId,
        head: RevisionId,
        /// Overwrite `head` in place instead of appending
        amend: bool,
    },
}

/// One atomic write to the ledger: page row, revision and outbound edges
#[derive(Debug, Clone)]
pub struct RevisionCommit {
    pub web_id: WebId,
    pub target: CommitTarget,
    /// Name the page carries after the commit
    pub name: String,
    pub content: String,
    pub author: Author,
    pub revised_at: DateTime<Utc>,
    /// Replaces the page's outbound edges wholesale
    pub references: Vec<Reference>,
    /// Names the page carried before a rename; stored as Redirected edges
    /// that outlive the content they were committed with
    pub former_names: Vec<String>,
}

/// What a commit wrote
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub page: Page,
    pub revision: Revision,
    pub amended: bool,
}

/// Trait for wiki storage backends
///
/// Implementations must be thread-safe (Send + Sync) to support
/// concurrent access from multiple threads.
pub trait WikiStore: Send + Sync {
    // === Web Operations ===

    /// Create a web; the address must be unused
    fn create_web(&self, web: &NewWeb) -> StorageResult<Web>;

    /// Load a web by address
    fn load_web(&self, address: &str) -> StorageResult<Option<Web>>;

    /// List all webs ordered by name
    fn list_webs(&self) -> StorageResult<Vec<Web>>;

    // === File Records ===

    /// Register (or re-describe) a file name within a web
    fn save_file(&self, web_id: WebId, file_name: &str, description: &str) -> StorageResult<()>;

    /// Whether a file name is registered within a web
    fn has_file(&self, web_id: WebId, file_name: &str) -> StorageResult<bool>;

    // === Page Operations ===

    /// Load a page by name
    fn load_page(&self, web_id: WebId, name: &str) -> StorageResult<Option<Page>>;

    /// List all pages of a web ordered by name
    fn list_pages(&self, web_id: WebId) -> StorageResult<Vec<Page>>;

    /// Delete a page with its revisions and references
    fn delete_page(&self, page_id: PageId) -> StorageResult<bool>;

    /// Set or clear the page's edit lock
    fn save_lock(&self, page_id: PageId, lock: Option<&PageLock>) -> StorageResult<()>;

    // === Revision Operations ===

    /// Full history of a page in sequence order
    fn revisions(&self, page_id: PageId) -> StorageResult<Vec<Revision>>;

    /// The revision with the highest sequence number
    fn current_revision(&self, page_id: PageId) -> StorageResult<Option<Revision>>;

    /// Number of revisions of a page
    fn revision_count(&self, page_id: PageId) -> StorageResult<usize>;

    /// The current revision of every page in a web
    fn current_revisions(&self, web_id: WebId) -> StorageResult<Vec<Revision>>;

    /// Distinct author names of all revisions in a web, sorted
    fn authors(&self, web_id: WebId) -> StorageResult<Vec<String>>;

    /// Distinct (author name, page) pairs over every revision in a web
    fn authored_pages(&self, web_id: WebId) -> StorageResult<Vec<(String, PageId)>>;

    /// Apply a commit atomically
    ///
    /// Either everything in the commit is persisted or nothing is. A stale
    /// `head` fails with `StorageError::Conflict`.
    fn commit_revision(&self, commit: &RevisionCommit) -> StorageResult<CommitOutcome>;

    // === Reference Operations ===

    /// Outbound edges of a page ordered by referenced name
    fn references_from(&self, page_id: PageId) -> StorageResult<Vec<Reference>>;

    /// Redirected edges a page holds because it was renamed, sorted
    fn former_names(&self, page_id: PageId) -> StorageResult<Vec<String>>;

    /// All edges of the given kinds whose source page is in the web
    fn references_in_web(&self, web_id: WebId, kinds: &[LinkKind]) -> StorageResult<Vec<WebReference>>;

    /// Names of pages in the web holding an edge of one of `kinds` to `name`
    fn referencing_page_names(
        &self,
        web_id: WebId,
        name: &str,
        kinds: &[LinkKind],
    ) -> StorageResult<Vec<String>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: WikiStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
