//! The renderer contract
//!
//! The ledger hands every candidate revision to a `Renderer` before it is
//! committed. The renderer proves the markup can be processed and reports
//! the references the content makes; a failure aborts the save.

use crate::model::{LinkKind, MarkupMode, Reference, Web};
use crate::storage::StorageError;
use thiserror::Error;

/// Errors a renderer can report
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No markup engine available for {0}")]
    UnsupportedMarkup(MarkupMode),

    #[error("{0}")]
    Malformed(String),

    #[error("Reference lookup failed: {0}")]
    Lookup(#[from] StorageError),
}

/// Answers the questions a renderer has about the rest of the web
pub trait LinkResolver {
    /// `Linked` when the name resolves to a page (directly or through a
    /// redirect), otherwise `Wanted`
    fn page_link_kind(&self, name: &str) -> Result<LinkKind, RenderError>;

    /// `File` when the file is registered, otherwise `WantedFile`
    fn file_link_kind(&self, name: &str) -> Result<LinkKind, RenderError>;

    /// Current content of a page, for transclusion
    fn included_content(&self, name: &str) -> Result<Option<String>, RenderError>;
}

/// Everything a renderer needs to process one revision
pub struct RenderRequest<'a> {
    pub web: &'a Web,
    pub page_name: &'a str,
    pub content: &'a str,
    pub resolver: &'a dyn LinkResolver,
}

/// Rendered output plus the references found on the way
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    /// In order of first appearance, without duplicates
    pub references: Vec<Reference>,
}

impl Rendered {
    pub fn push_reference(&mut self, reference: Reference) {
        if !self.references.contains(&reference) {
            self.references.push(reference);
        }
    }
}

/// Turns revision content into output and reports its references
pub trait Renderer: Send + Sync {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered, RenderError>;

    /// Whether content in `mode` can be rendered at all
    fn supports(&self, _mode: MarkupMode) -> bool {
        true
    }
}

/// Converts text in one markup dialect to HTML
pub trait MarkupEngine: Send + Sync {
    fn to_html(&self, text: &str) -> Result<String, RenderError>;
}
