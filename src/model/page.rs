//! Pages, their advisory edit lock, and the typed current-content snapshot

use super::revision::Revision;
use super::web::WebId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row identifier of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(i64);

impl PageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timed marker warning other editors that someone is editing the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLock {
    pub locked_at: DateTime<Utc>,
    pub locked_by: String,
}

impl PageLock {
    pub fn new(locked_at: DateTime<Utc>, locked_by: impl Into<String>) -> Self {
        Self {
            locked_at,
            locked_by: locked_by.into(),
        }
    }

    /// A lock holds while `locked_at + period > now`; a period reaching
    /// past the end of time never expires
    pub fn is_active(&self, now: DateTime<Utc>, period: Duration) -> bool {
        self.locked_at
            .checked_add_signed(period)
            .map_or(true, |expires| expires > now)
    }

    /// Whole minutes the lock has been held at `now`
    pub fn held_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.locked_at).num_minutes()
    }
}

/// A stored page (identity and lock state; content lives in revisions)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub web_id: WebId,
    pub name: String,
    pub lock: Option<PageLock>,
}

impl Page {
    pub fn is_locked(&self, now: DateTime<Utc>, period: Duration) -> bool {
        self.lock
            .as_ref()
            .map(|lock| lock.is_active(now, period))
            .unwrap_or(false)
    }

    pub fn locked_by(&self) -> Option<&str> {
        self.lock.as_ref().map(|lock| lock.locked_by.as_str())
    }

    pub fn lock_duration(&self, now: DateTime<Utc>) -> Option<i64> {
        self.lock.as_ref().map(|lock| lock.held_minutes(now))
    }
}

/// A page together with its current revision
///
/// The current revision is the most recently appended one (highest
/// sequence number), never the one with the latest timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub page: Page,
    pub current: Revision,
    pub revision_count: usize,
}

impl PageSnapshot {
    pub fn name(&self) -> &str {
        &self.page.name
    }

    pub fn content(&self) -> &str {
        &self.current.content
    }

    pub fn revised_at(&self) -> DateTime<Utc> {
        self.current.revised_at
    }

    /// More than one history entry
    pub fn has_history(&self) -> bool {
        self.revision_count > 1
    }
}
