//! Storage backends for wikiledger
//!
//! The engine talks to storage through the `WikiStore` trait. The primary
//! implementation is `SqliteStore` for persistent storage.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    CommitOutcome, CommitTarget, OpenStore, RevisionCommit, StorageError, StorageResult, WikiStore,
};
