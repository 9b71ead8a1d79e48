//! Web: an isolated namespace of pages with its own settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Row identifier of a web
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebId(i64);

impl WebId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for WebId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Markup dialect a web's pages are written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupMode {
    Textile,
    #[default]
    Markdown,
    Mixed,
}

impl MarkupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkupMode::Textile => "textile",
            MarkupMode::Markdown => "markdown",
            MarkupMode::Mixed => "mixed",
        }
    }
}

impl fmt::Display for MarkupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "textile" => Ok(MarkupMode::Textile),
            "markdown" => Ok(MarkupMode::Markdown),
            "mixed" => Ok(MarkupMode::Mixed),
            other => Err(other.to_string()),
        }
    }
}

/// A stored web
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Web {
    pub id: WebId,
    /// Display name
    pub name: String,
    /// Unique address used to select the web
    pub address: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub markup: MarkupMode,
    /// Only `[[bracketed]]` links count; CamelCase words are plain text
    pub brackets_only: bool,
}

impl Web {
    /// True when the web is open or the candidate matches its password
    pub fn check_password(&self, candidate: Option<&str>) -> bool {
        match &self.password {
            None => true,
            Some(password) if password.is_empty() => true,
            Some(password) => candidate == Some(password.as_str()),
        }
    }
}

/// Parameters for creating a web
#[derive(Debug, Clone, Default)]
pub struct NewWeb {
    pub name: String,
    pub address: String,
    pub password: Option<String>,
    pub markup: MarkupMode,
    pub brackets_only: bool,
}

impl NewWeb {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_markup(mut self, markup: MarkupMode) -> Self {
        self.markup = markup;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn brackets_only(mut self, brackets_only: bool) -> Self {
        self.brackets_only = brackets_only;
        self
    }
}
