//! Rewrites legacy `"text":target` hyperlinks into `[[target|text]]`
//!
//! Pages written with the inline hyperlink notation of the old markup
//! dialect point at other pages without using reference syntax, so the
//! extractor never sees them and their targets look orphaned. This pass
//! turns every such link that plausibly names a page into a wiki link.
//! It never fails: anything it cannot interpret is left as it was.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Path prefix of links exported by the previous wiki installation
pub const DEFAULT_LEGACY_PREFIX: &str = "/wiki/documentation/pages/";

/// `"visible text":target`, optionally wrapped in square brackets. The
/// target may not contain quotes or vertical bars, which the dialect
/// reserves for other markup.
fn legacy_link_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"\[?"(\S.*?)":([^\s"|]+)\]?"#).ok())
        .as_ref()
}

/// Strip trailing characters that are neither alphanumeric nor `_`
fn trim_trailing_punctuation(text: &str) -> &str {
    text.trim_end_matches(|c: char| !(c.is_alphanumeric() || c == '_'))
}

/// Rewrites legacy inline links into canonical wiki references
#[derive(Debug, Clone)]
pub struct LinkNormalizer {
    legacy_prefix: String,
}

impl Default for LinkNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_LEGACY_PREFIX)
    }
}

impl LinkNormalizer {
    /// An empty prefix disables prefix stripping
    pub fn new(legacy_prefix: impl Into<String>) -> Self {
        Self {
            legacy_prefix: legacy_prefix.into(),
        }
    }

    pub fn legacy_prefix(&self) -> &str {
        &self.legacy_prefix
    }

    /// Return `content` with recognised legacy links rewritten
    ///
    /// Matching always runs against the untouched input, and each
    /// substitution replaces only the span it matched. Alias declarations
    /// that resolved a rewritten link are blanked afterwards (the line
    /// break stays).
    pub fn normalize(&self, content: &str) -> String {
        let Some(pattern) = legacy_link_pattern() else {
            return content.to_string();
        };

        let mut output = String::with_capacity(content.len());
        let mut copied = 0usize;
        let mut consumed_aliases: Vec<String> = Vec::new();
        let mut rewrites = 0usize;

        for caps in pattern.captures_iter(content) {
            let (Some(whole), Some(visible), Some(target)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };

            let link_or_alias = trim_trailing_punctuation(target.as_str());
            if link_or_alias.is_empty() {
                continue;
            }

            // The link ends where the trimmed target ends; a bracketed link
            // also owns its closing bracket.
            let mut whole_end = target.start() + link_or_alias.len();
            if whole.as_str().starts_with('[') && content[whole_end..].starts_with(']') {
                whole_end += 1;
            }

            let (mut link, alias_declaration) = match find_alias(content, link_or_alias) {
                Some((url, declaration)) => (url, Some(declaration)),
                None => (link_or_alias.to_string(), None),
            };

            if !self.legacy_prefix.is_empty() {
                if let Some(rest) = link.strip_prefix(self.legacy_prefix.as_str()) {
                    link = rest.to_string();
                }
            }

            // Paths and fragments cannot be told apart from external or
            // in-page targets, so they stay as they are
            if link.contains('/') || link.contains('#') || link.is_empty() {
                continue;
            }

            let spaced = link.replace('+', " ");
            let page_name = match urlencoding::decode(&spaced) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => spaced.clone(),
            };

            let replacement = format!("[[{}|{}]]", page_name, visible.as_str());
            output.push_str(&content[copied..whole.start()]);
            output.push_str(&replacement);
            copied = whole_end;
            rewrites += 1;

            if let Some(declaration) = alias_declaration {
                if !consumed_aliases.contains(&declaration) {
                    consumed_aliases.push(declaration);
                }
            }
        }

        output.push_str(&content[copied..]);

        for declaration in &consumed_aliases {
            output = output.replace(declaration.as_str(), "");
        }

        if rewrites > 0 {
            debug!(rewrites, aliases = consumed_aliases.len(), "rewrote legacy links");
        }
        output
    }
}

/// Find an alias declaration `[alias]url` at the start of a line
///
/// Returns the declared url and the full declaration text.
fn find_alias(content: &str, alias: &str) -> Option<(String, String)> {
    let pattern = Regex::new(&format!(r"(?m)^\[{}\](\S+)", regex::escape(alias))).ok()?;
    let caps = pattern.captures(content)?;
    Some((caps.get(1)?.as_str().to_string(), caps.get(0)?.as_str().to_string()))
}
