//! wikiledger: revision ledger and reference graph for collaborative wikis
//!
//! Pages live in webs (isolated namespaces) and keep an append-style
//! history of revisions. Every save is normalized, rendered and committed
//! together with the page's outbound references, which then answer the
//! questions a wiki asks about itself: which pages are orphaned, which
//! names are wanted, which old names still redirect.
//!
//! # Core Concepts
//!
//! - **Revision ledger**: same-author saves inside a merge window amend the
//!   head revision; anything else appends
//! - **Reference graph**: typed edges (linked, wanted, included, category,
//!   redirect, file, author) replaced atomically on every commit
//! - **Page sets**: orphans, wanted pages, categories and search
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use wikiledger::{Author, NewWeb, PageEdit, WikiConfig, WikiEngine};
//!
//! let engine = WikiEngine::in_memory(WikiConfig::default()).unwrap();
//! engine.create_web(&NewWeb::new("Docs", "docs")).unwrap();
//! let edit = PageEdit::new("HomePage", "Start at [[Guide]]", Author::new("ana"), Utc::now());
//! engine.revise("docs", &edit).unwrap();
//! assert_eq!(engine.wanted_pages("docs", None).unwrap(), vec!["Guide"]);
//! ```

pub mod config;
pub mod engine;
pub mod graph;
pub mod ledger;
pub mod markup;
pub mod model;
pub mod query;
pub mod storage;

pub use config::{ConfigError, WikiConfig};
pub use engine::{PageListing, WikiEngine, WikiError, WikiResult};
pub use graph::ReferenceGraph;
pub use ledger::{PageEdit, RevisionLedger, StoreResolver};
pub use markup::{
    LinkNormalizer, LinkResolver, MarkdownEngine, MarkupEngine, RenderError, RenderRequest, Rendered,
    Renderer, WikiRenderer,
};
pub use model::{
    Author, LinkKind, MarkupMode, NewWeb, Page, PageId, PageLock, PageSnapshot, Reference, Revision,
    RevisionId, Web, WebId, WebReference,
};
pub use query::{PageEntry, PageSet, SearchResults};
pub use storage::{OpenStore, SqliteStore, StorageError, StorageResult, WikiStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
