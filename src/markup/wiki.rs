//! Default renderer: wiki chunks first, then the web's markup engine
//!
//! Recognised chunks:
//! - `[[Page]]`, `[[Page|text]]`: page link (Linked or Wanted)
//! - `[[!include Page]]`: transclusion (Included)
//! - `[[!redirects Old name]]`: this page answers for an old name (Redirected)
//! - `[[name:file]]`, `[[name:pic]]`, `[[name:audio]]`, `[[name:video]]`,
//!   each with an optional `|text`: file reference (File or WantedFile)
//! - a line `category: a, b` (`:category: ...` hides it): Category
//! - CamelCase words, unless the web is brackets-only; `\Word` escapes one

use super::renderer::{LinkResolver, MarkupEngine, RenderError, RenderRequest, Rendered, Renderer};
use crate::model::{LinkKind, MarkupMode, Reference};
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn chunk_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"\[\[([^\[\]\n]+?)\]\]|(\\?)\b(\p{Lu}+\p{Ll}+\p{Lu}[\p{L}\p{Nd}_]+)\b").ok()
        })
        .as_ref()
}

fn category_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^(:)?category\s*:(.*)$").ok())
        .as_ref()
}

/// Characters after which a CamelCase run is part of a URL or path
const URL_CONTEXT: &[char] = &['/', '.', ':', '#', '=', '?', '&', '-', '@', '%'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileChunk {
    File,
    Pic,
    Audio,
    Video,
}

impl FileChunk {
    fn parse(suffix: &str) -> Option<Self> {
        match suffix.trim() {
            "file" => Some(FileChunk::File),
            "pic" => Some(FileChunk::Pic),
            "audio" => Some(FileChunk::Audio),
            "video" => Some(FileChunk::Video),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Include(&'a str),
    Redirects(&'a str),
    File {
        name: &'a str,
        text: &'a str,
        kind: FileChunk,
    },
    Link {
        name: &'a str,
        text: &'a str,
    },
}

fn split_text(body: &str) -> (&str, &str) {
    match body.split_once('|') {
        Some((name, text)) if !text.trim().is_empty() => (name.trim(), text.trim()),
        Some((name, _)) => (name.trim(), name.trim()),
        None => (body.trim(), body.trim()),
    }
}

fn parse_chunk(inner: &str) -> Option<Chunk<'_>> {
    let inner = inner.trim();
    if let Some(name) = inner.strip_prefix("!include ") {
        let name = name.trim();
        return (!name.is_empty()).then_some(Chunk::Include(name));
    }
    if let Some(name) = inner.strip_prefix("!redirects ") {
        let name = name.trim();
        return (!name.is_empty()).then_some(Chunk::Redirects(name));
    }
    if let Some((head, suffix)) = inner.rsplit_once(':') {
        if let Some(kind) = FileChunk::parse(suffix) {
            let (name, text) = split_text(head);
            return (!name.is_empty()).then_some(Chunk::File { name, text, kind });
        }
    }
    let (name, text) = split_text(inner);
    (!name.is_empty() && !name.starts_with('!')).then_some(Chunk::Link { name, text })
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// CommonMark via pulldown-cmark
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownEngine;

impl MarkupEngine for MarkdownEngine {
    fn to_html(&self, text: &str) -> Result<String, RenderError> {
        let parser = Parser::new_ext(text, Options::all());
        let mut output = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut output, parser);
        Ok(output)
    }
}

/// Renderer for the wiki chunk syntax, dispatching markup per web
///
/// Markup engines are registered per `MarkupMode`; a web whose mode has no
/// engine cannot be rendered and its saves are rejected.
pub struct WikiRenderer {
    engines: HashMap<MarkupMode, Box<dyn MarkupEngine>>,
}

impl Default for WikiRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl WikiRenderer {
    /// Renderer with the Markdown engine registered
    pub fn new() -> Self {
        Self::without_engines().with_engine(MarkupMode::Markdown, MarkdownEngine)
    }

    pub fn without_engines() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    pub fn with_engine(mut self, mode: MarkupMode, engine: impl MarkupEngine + 'static) -> Self {
        self.engines.insert(mode, Box::new(engine));
        self
    }

    fn expand(&self, request: &RenderRequest<'_>, rendered: &mut Rendered) -> Result<String, RenderError> {
        let mut expanded = String::with_capacity(request.content.len());
        for line in request.content.split_inclusive('\n') {
            let body = line.trim_end_matches(['\r', '\n']);
            let ending = &line[body.len()..];

            match expand_category_line(body, rendered) {
                Some(html) => expanded.push_str(&html),
                None => expanded.push_str(&self.expand_line(body, request, rendered)?),
            }
            expanded.push_str(ending);
        }
        Ok(expanded)
    }

    fn expand_line(
        &self,
        line: &str,
        request: &RenderRequest<'_>,
        rendered: &mut Rendered,
    ) -> Result<String, RenderError> {
        let Some(pattern) = chunk_pattern() else {
            return Ok(line.to_string());
        };

        let mut output = String::with_capacity(line.len());
        let mut last = 0;
        for caps in pattern.captures_iter(line) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            output.push_str(&line[last..whole.start()]);
            last = whole.end();

            if let Some(inner) = caps.get(1) {
                match parse_chunk(inner.as_str()) {
                    Some(chunk) => output.push_str(&expand_chunk(chunk, request, rendered)?),
                    None => output.push_str(whole.as_str()),
                }
                continue;
            }

            let Some(word) = caps.get(3) else {
                output.push_str(whole.as_str());
                continue;
            };
            let escaped = caps.get(2).map(|m| !m.as_str().is_empty()).unwrap_or(false);
            let in_url = line[..whole.start()].ends_with(URL_CONTEXT);
            if escaped {
                output.push_str(word.as_str());
            } else if request.web.brackets_only || in_url {
                output.push_str(whole.as_str());
            } else {
                let name = word.as_str();
                let kind = request.resolver.page_link_kind(name)?;
                rendered.push_reference(Reference::new(name, kind));
                output.push_str(&page_link_html(&request.web.address, name, name, kind));
            }
        }
        output.push_str(&line[last..]);
        Ok(output)
    }
}

impl Renderer for WikiRenderer {
    fn supports(&self, mode: MarkupMode) -> bool {
        self.engines.contains_key(&mode)
    }

    fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered, RenderError> {
        let engine = self
            .engines
            .get(&request.web.markup)
            .ok_or(RenderError::UnsupportedMarkup(request.web.markup))?;

        let mut rendered = Rendered::default();
        let expanded = self.expand(request, &mut rendered)?;
        rendered.html = engine.to_html(&expanded)?;
        Ok(rendered)
    }
}

fn expand_category_line(line: &str, rendered: &mut Rendered) -> Option<String> {
    let caps = category_pattern()?.captures(line)?;
    let hidden = caps.get(1).is_some();
    let names: Vec<&str> = caps
        .get(2)
        .map(|m| m.as_str())
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();

    for name in &names {
        rendered.push_reference(Reference::new(*name, LinkKind::Category));
    }
    if hidden {
        return Some(String::new());
    }

    let spans: Vec<String> = names
        .iter()
        .map(|name| format!(r#"<span class="category">{}</span>"#, escape_html(name)))
        .collect();
    Some(format!(r#"<div class="property">category: {}</div>"#, spans.join(", ")))
}

fn expand_chunk(
    chunk: Chunk<'_>,
    request: &RenderRequest<'_>,
    rendered: &mut Rendered,
) -> Result<String, RenderError> {
    let address = request.web.address.as_str();
    match chunk {
        Chunk::Include(name) => {
            if name == request.page_name {
                return Err(RenderError::Malformed(format!("Page '{}' includes itself", name)));
            }
            rendered.push_reference(Reference::new(name, LinkKind::Included));
            Ok(match request.resolver.included_content(name)? {
                Some(content) => content,
                None => format!("<em>Could not include {}</em>", escape_html(name)),
            })
        }
        Chunk::Redirects(name) => {
            rendered.push_reference(Reference::new(name, LinkKind::Redirected));
            Ok(String::new())
        }
        Chunk::File { name, text, kind } => {
            let link_kind = request.resolver.file_link_kind(name)?;
            rendered.push_reference(Reference::new(name, link_kind));
            Ok(file_link_html(address, name, text, kind, link_kind == LinkKind::File))
        }
        Chunk::Link { name, text } => {
            let kind = request.resolver.page_link_kind(name)?;
            rendered.push_reference(Reference::new(name, kind));
            Ok(page_link_html(address, name, text, kind))
        }
    }
}

fn page_link_html(address: &str, name: &str, text: &str, kind: LinkKind) -> String {
    let target = urlencoding::encode(name);
    let text = escape_html(text);
    if kind == LinkKind::Linked {
        format!(r#"<a class="existingWikiWord" href="/{address}/show/{target}">{text}</a>"#)
    } else {
        format!(r#"<span class="newWikiWord">{text}<a href="/{address}/new/{target}">?</a></span>"#)
    }
}

fn file_link_html(address: &str, name: &str, text: &str, kind: FileChunk, known: bool) -> String {
    let target = urlencoding::encode(name);
    let href = format!("/{address}/files/{target}");
    let text = escape_html(text);
    if !known {
        return format!(r#"<span class="newWikiWord">{text}<a href="{href}">?</a></span>"#);
    }
    match kind {
        FileChunk::File => format!(r#"<a class="existingWikiWord" href="{href}">{text}</a>"#),
        FileChunk::Pic => format!(r#"<img alt="{text}" src="{href}" />"#),
        FileChunk::Audio => format!(r#"<audio src="{href}" controls="controls">{text}</audio>"#),
        FileChunk::Video => format!(r#"<video src="{href}" controls="controls">{text}</video>"#),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Web, WebId};
    use std::collections::HashSet;

    #[derive(Default)]
    struct FixedResolver {
        pages: HashSet<String>,
        files: HashSet<String>,
        includes: HashMap<String, String>,
    }

    impl FixedResolver {
        fn with_pages(names: &[&str]) -> Self {
            Self {
                pages: names.iter().map(|n| n.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    impl LinkResolver for FixedResolver {
        fn page_link_kind(&self, name: &str) -> Result<LinkKind, RenderError> {
            Ok(if self.pages.contains(name) {
                LinkKind::Linked
            } else {
                LinkKind::Wanted
            })
        }

        fn file_link_kind(&self, name: &str) -> Result<LinkKind, RenderError> {
            Ok(if self.files.contains(name) {
                LinkKind::File
            } else {
                LinkKind::WantedFile
            })
        }

        fn included_content(&self, name: &str) -> Result<Option<String>, RenderError> {
            Ok(self.includes.get(name).cloned())
        }
    }

    fn web(markup: MarkupMode, brackets_only: bool) -> Web {
        Web {
            id: WebId::new(1),
            name: "Test".into(),
            address: "test".into(),
            password: None,
            markup,
            brackets_only,
        }
    }

    fn render_with(web: &Web, resolver: &FixedResolver, content: &str) -> Result<Rendered, RenderError> {
        let request = RenderRequest {
            web,
            page_name: "Current",
            content,
            resolver,
        };
        WikiRenderer::new().render(&request)
    }

    #[test]
    fn links_are_classified_and_rendered() {
        let resolver = FixedResolver::with_pages(&["Known Page"]);
        let rendered = render_with(
            &web(MarkupMode::Markdown, true),
            &resolver,
            "See [[Known Page]] and [[Missing|the missing one]].",
        )
        .unwrap();

        assert_eq!(
            rendered.references,
            vec![
                Reference::new("Known Page", LinkKind::Linked),
                Reference::new("Missing", LinkKind::Wanted),
            ]
        );
        assert!(rendered
            .html
            .contains(r#"<a class="existingWikiWord" href="/test/show/Known%20Page">Known Page</a>"#));
        assert!(rendered.html.contains(r#"<span class="newWikiWord">the missing one<a href="/test/new/Missing">?</a></span>"#));
    }

    #[test]
    fn repeated_links_are_reported_once() {
        let rendered = render_with(
            &web(MarkupMode::Markdown, true),
            &FixedResolver::default(),
            "[[A]] [[B]] [[A]]\n[[A|again]]",
        )
        .unwrap();
        assert_eq!(
            rendered.references,
            vec![Reference::new("A", LinkKind::Wanted), Reference::new("B", LinkKind::Wanted)]
        );
    }

    #[test]
    fn include_redirect_and_category_chunks() {
        let mut resolver = FixedResolver::default();
        resolver.includes.insert("Snippet".into(), "included *text*".into());
        let rendered = render_with(
            &web(MarkupMode::Markdown, true),
            &resolver,
            "[[!include Snippet]]\n[[!redirects Old Name]]\ncategory: Guides, How To\n:category: Hidden\nbody",
        )
        .unwrap();

        assert_eq!(
            rendered.references,
            vec![
                Reference::new("Snippet", LinkKind::Included),
                Reference::new("Old Name", LinkKind::Redirected),
                Reference::new("Guides", LinkKind::Category),
                Reference::new("How To", LinkKind::Category),
                Reference::new("Hidden", LinkKind::Category),
            ]
        );
        assert!(rendered.html.contains("<em>text</em>"));
        assert!(rendered.html.contains(r#"<span class="category">How To</span>"#));
        assert!(!rendered.html.contains("Hidden"));
    }

    #[test]
    fn missing_include_is_still_a_reference() {
        let rendered = render_with(
            &web(MarkupMode::Markdown, true),
            &FixedResolver::default(),
            "[[!include Nowhere]]",
        )
        .unwrap();
        assert_eq!(rendered.references, vec![Reference::new("Nowhere", LinkKind::Included)]);
        assert!(rendered.html.contains("Could not include Nowhere"));
    }

    #[test]
    fn self_inclusion_is_rejected() {
        let err = render_with(
            &web(MarkupMode::Markdown, true),
            &FixedResolver::default(),
            "[[!include Current]]",
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::Malformed(_)));
    }

    #[test]
    fn file_chunks_use_file_kinds() {
        let mut resolver = FixedResolver::default();
        resolver.files.insert("logo.png".into());
        let rendered = render_with(
            &web(MarkupMode::Markdown, true),
            &resolver,
            "[[logo.png|Logo:pic]] and [[manual.pdf:file]]",
        )
        .unwrap();

        assert_eq!(
            rendered.references,
            vec![
                Reference::new("logo.png", LinkKind::File),
                Reference::new("manual.pdf", LinkKind::WantedFile),
            ]
        );
        assert!(rendered.html.contains(r#"<img alt="Logo" src="/test/files/logo.png" />"#));
    }

    #[test]
    fn camel_case_words_link_unless_brackets_only() {
        let resolver = FixedResolver::with_pages(&["HomePage"]);
        let content = "Back to HomePage, not \\NotALink, see http://example.com/FooBar and NewIdea";

        let open = render_with(&web(MarkupMode::Markdown, false), &resolver, content).unwrap();
        assert_eq!(
            open.references,
            vec![
                Reference::new("HomePage", LinkKind::Linked),
                Reference::new("NewIdea", LinkKind::Wanted),
            ]
        );
        assert!(open.html.contains("NotALink"));
        assert!(!open.html.contains("\\NotALink"));

        let strict = render_with(&web(MarkupMode::Markdown, true), &resolver, content).unwrap();
        assert!(strict.references.is_empty());
    }

    #[test]
    fn unsupported_markup_fails() {
        let err = render_with(&web(MarkupMode::Textile, true), &FixedResolver::default(), "text").unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedMarkup(MarkupMode::Textile)));
    }

    #[test]
    fn registered_engine_serves_its_mode() {
        struct Verbatim;
        impl MarkupEngine for Verbatim {
            fn to_html(&self, text: &str) -> Result<String, RenderError> {
                Ok(text.to_string())
            }
        }

        let renderer = WikiRenderer::without_engines().with_engine(MarkupMode::Textile, Verbatim);
        assert!(renderer.supports(MarkupMode::Textile));
        assert!(!renderer.supports(MarkupMode::Markdown));

        let web = web(MarkupMode::Textile, true);
        let resolver = FixedResolver::default();
        let request = RenderRequest {
            web: &web,
            page_name: "Current",
            content: "h1. [[Target]]",
            resolver: &resolver,
        };
        let rendered = renderer.render(&request).unwrap();
        assert_eq!(
            rendered.html,
            r#"h1. <span class="newWikiWord">Target<a href="/test/new/Target">?</a></span>"#
        );
    }

    #[test]
    fn chunk_parsing() {
        assert_eq!(parse_chunk("Page"), Some(Chunk::Link { name: "Page", text: "Page" }));
        assert_eq!(parse_chunk(" Page | shown "), Some(Chunk::Link { name: "Page", text: "shown" }));
        assert_eq!(parse_chunk("Guide: Intro"), Some(Chunk::Link { name: "Guide: Intro", text: "Guide: Intro" }));
        assert_eq!(parse_chunk("!include  "), None);
        assert_eq!(parse_chunk("!unknown Thing"), None);
        assert_eq!(
            parse_chunk("a.mp3:audio"),
            Some(Chunk::File { name: "a.mp3", text: "a.mp3", kind: FileChunk::Audio })
        );
    }
}
