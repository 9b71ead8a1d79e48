//! Core data model: webs, pages, revisions and typed references

mod page;
mod reference;
mod revision;
mod web;

pub use page::{Page, PageId, PageLock, PageSnapshot};
pub use reference::{LinkKind, Reference, WebReference};
pub use revision::{Author, Revision, RevisionId};
pub use web::{MarkupMode, NewWeb, Web, WebId};
