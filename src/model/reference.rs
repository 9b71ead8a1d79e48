//! References: typed edges from a page to a referenced name

use super::page::PageId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a reference edge, persisted as a single-character code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkKind {
    /// Points to a page that exists (or to the old name of one)
    Linked,
    /// Points to a name with no page yet
    Wanted,
    /// The source page used to be called the referenced name
    Redirected,
    /// Transclusion of the referenced page
    Included,
    /// Category tag
    Category,
    /// Synthetic authorship link
    Author,
    /// Points to a registered file
    File,
    /// Points to a file that has not been registered
    WantedFile,
}

impl LinkKind {
    /// Kinds that make the referenced page reachable by navigation
    pub const PAGE_USES: [LinkKind; 3] = [LinkKind::Linked, LinkKind::Wanted, LinkKind::Included];

    /// Kinds that are plain links (no transclusion)
    pub const PAGE_LINKS: [LinkKind; 2] = [LinkKind::Linked, LinkKind::Wanted];

    pub fn code(&self) -> char {
        match self {
            LinkKind::Linked => 'L',
            LinkKind::Wanted => 'W',
            LinkKind::Redirected => 'R',
            LinkKind::Included => 'I',
            LinkKind::Category => 'C',
            LinkKind::Author => 'A',
            LinkKind::File => 'F',
            LinkKind::WantedFile => 'E',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'L' => Some(LinkKind::Linked),
            'W' => Some(LinkKind::Wanted),
            'R' => Some(LinkKind::Redirected),
            'I' => Some(LinkKind::Included),
            'C' => Some(LinkKind::Category),
            'A' => Some(LinkKind::Author),
            'F' => Some(LinkKind::File),
            'E' => Some(LinkKind::WantedFile),
            _ => None,
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An outbound edge as extracted from content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub referenced_name: String,
    pub kind: LinkKind,
}

impl Reference {
    pub fn new(referenced_name: impl Into<String>, kind: LinkKind) -> Self {
        Self {
            referenced_name: referenced_name.into(),
            kind,
        }
    }
}

/// A stored edge together with its source page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebReference {
    pub page_id: PageId,
    pub page_name: String,
    pub referenced_name: String,
    pub kind: LinkKind,
}
