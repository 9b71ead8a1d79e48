//! Revision ledger: decides how an edit is recorded in a page's history
//!
//! Every save runs the same pipeline: validate, normalize legacy links,
//! render to prove the markup and collect references, then commit the
//! revision and the page's new edge set as one storage transaction.
//! Consecutive saves by the same author inside the merge window amend the
//! head revision instead of appending a new one.

use crate::engine::{WikiError, WikiResult};
use crate::graph::ReferenceGraph;
use crate::markup::{LinkNormalizer, LinkResolver, RenderError, RenderRequest, Renderer};
use crate::model::{Author, LinkKind, Page, Reference, Revision, Web};
use crate::storage::{CommitOutcome, CommitTarget, RevisionCommit, WikiStore};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

/// One requested save of a page
#[derive(Debug, Clone)]
pub struct PageEdit {
    /// Current name of the page (or the name of the page to create)
    pub name: String,
    /// Name the page should carry afterwards; `None` keeps `name`
    pub new_name: Option<String>,
    pub content: String,
    pub author: Author,
    pub revised_at: DateTime<Utc>,
}

impl PageEdit {
    pub fn new(
        name: impl Into<String>,
        content: impl Into<String>,
        author: Author,
        revised_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            new_name: None,
            content: content.into(),
            author,
            revised_at,
        }
    }

    pub fn renamed_to(mut self, new_name: impl Into<String>) -> Self {
        self.new_name = Some(new_name.into());
        self
    }

    fn target_name(&self) -> &str {
        self.new_name.as_deref().unwrap_or(&self.name)
    }
}

/// Answers renderer lookups from the stored graph
pub struct StoreResolver<'a> {
    store: &'a dyn WikiStore,
    graph: ReferenceGraph<'a>,
}

impl<'a> StoreResolver<'a> {
    pub fn new(store: &'a dyn WikiStore, web: &Web) -> Self {
        Self {
            store,
            graph: ReferenceGraph::new(store, web.id),
        }
    }
}

impl LinkResolver for StoreResolver<'_> {
    fn page_link_kind(&self, name: &str) -> Result<LinkKind, RenderError> {
        Ok(self.graph.classify(name)?)
    }

    fn file_link_kind(&self, name: &str) -> Result<LinkKind, RenderError> {
        if self.store.has_file(self.graph.web_id(), name)? {
            Ok(LinkKind::File)
        } else {
            Ok(LinkKind::WantedFile)
        }
    }

    fn included_content(&self, name: &str) -> Result<Option<String>, RenderError> {
        let Some(page) = self.store.load_page(self.graph.web_id(), name)? else {
            return Ok(None);
        };
        Ok(self
            .store
            .current_revision(page.id)?
            .map(|revision| revision.content))
    }
}

/// Renderer failures reject the save; store failures stay store failures
fn render_failure(err: RenderError) -> WikiError {
    match err {
        RenderError::Lookup(storage) => WikiError::from(storage),
        other => WikiError::Validation(format!("Content could not be rendered: {}", other)),
    }
}

/// Append/merge policy over one store
pub struct RevisionLedger<'a> {
    store: &'a dyn WikiStore,
    renderer: &'a dyn Renderer,
    normalizer: &'a LinkNormalizer,
    merge_window: Duration,
}

impl<'a> RevisionLedger<'a> {
    pub fn new(
        store: &'a dyn WikiStore,
        renderer: &'a dyn Renderer,
        normalizer: &'a LinkNormalizer,
        merge_window: Duration,
    ) -> Self {
        Self {
            store,
            renderer,
            normalizer,
            merge_window,
        }
    }

    /// Record an edit, creating the page if it does not exist yet
    pub fn revise(&self, web: &Web, edit: &PageEdit) -> WikiResult<CommitOutcome> {
        let target_name = edit.target_name();
        if target_name.trim().is_empty() {
            return Err(WikiError::Validation("Page name cannot be blank".to_string()));
        }

        let existing = self.store.load_page(web.id, &edit.name)?;
        let head = match &existing {
            Some(page) => Some(self.store.current_revision(page.id)?.ok_or_else(|| {
                WikiError::NotFound(format!("Page '{}' has no revisions", page.name))
            })?),
            None => None,
        };

        let content = self.normalizer.normalize(&edit.content);

        if let (Some(page), Some(head)) = (&existing, &head) {
            if head.content == content && page.name == target_name {
                warn!(web = %web.address, page = %page.name, "rejected unchanged save");
                return Err(WikiError::Validation(format!(
                    "You have tried to save page '{}' without changing its content",
                    page.name
                )));
            }
        }

        let current_name = existing.as_ref().map(|page| page.name.as_str()).unwrap_or(&edit.name);
        if target_name != current_name && self.store.load_page(web.id, target_name)?.is_some() {
            return Err(WikiError::Validation(format!(
                "There is already a page named '{}'",
                target_name
            )));
        }

        let resolver = StoreResolver::new(self.store, web);
        let request = RenderRequest {
            web,
            page_name: target_name,
            content: &content,
            resolver: &resolver,
        };
        let rendered = self.renderer.render(&request).map_err(render_failure)?;

        let references = self.collect_references(target_name, &edit.author, rendered.references);
        let former_names = self.former_names(existing.as_ref(), target_name)?;

        let target = match (&existing, &head) {
            (Some(page), Some(head)) => CommitTarget::Existing {
                page_id: page.id,
                head: head.id,
                amend: self.is_continuous(head, &edit.author, edit.revised_at),
            },
            _ => CommitTarget::NewPage,
        };

        let commit = RevisionCommit {
            web_id: web.id,
            target,
            name: target_name.to_string(),
            content,
            author: edit.author.clone(),
            revised_at: edit.revised_at,
            references,
            former_names,
        };
        let outcome = self.store.commit_revision(&commit)?;

        if current_name != target_name {
            info!(web = %web.address, from = %current_name, to = %target_name, "renamed page");
        }
        info!(
            web = %web.address,
            page = %outcome.page.name,
            revision = %outcome.revision.id,
            amended = outcome.amended,
            "committed revision"
        );
        Ok(outcome)
    }

    /// Re-save the content of an earlier revision as a fresh edit
    ///
    /// `index` counts from 0 in history order. The new revision is
    /// attributed to the author of the revision being restored, made from
    /// `origin`.
    pub fn rollback(
        &self,
        web: &Web,
        page_name: &str,
        index: usize,
        origin: Option<&str>,
        revised_at: DateTime<Utc>,
    ) -> WikiResult<CommitOutcome> {
        let page = self
            .store
            .load_page(web.id, page_name)?
            .ok_or_else(|| WikiError::NotFound(format!("Page '{}' not found", page_name)))?;
        let restored = self
            .store
            .revisions(page.id)?
            .into_iter()
            .nth(index)
            .ok_or_else(|| WikiError::Validation(format!("Revision {} not found", index)))?;

        let mut author = Author::new(restored.author.name);
        if let Some(origin) = origin {
            author = author.with_origin(origin);
        }
        info!(web = %web.address, page = %page.name, index, "rolling back");

        let edit = PageEdit::new(page.name.clone(), restored.content, author, revised_at);
        self.revise(web, &edit)
    }

    /// Same author, and the head is younger than the merge window. A window
    /// reaching past the end of time never closes.
    fn is_continuous(&self, head: &Revision, author: &Author, revised_at: DateTime<Utc>) -> bool {
        head.author.is_same_person(author)
            && head
                .revised_at
                .checked_add_signed(self.merge_window)
                .map_or(true, |closes| closes > revised_at)
    }

    /// Extracted edges plus the committing author's edge
    fn collect_references(&self, target_name: &str, author: &Author, extracted: Vec<Reference>) -> Vec<Reference> {
        let mut references = extracted;
        let author_edge = Reference::new(author.name.clone(), LinkKind::Author);
        if !author.name.trim().is_empty() && !references.contains(&author_edge) {
            references.push(author_edge);
        }
        debug!(page = %target_name, count = references.len(), "collected references");
        references
    }

    /// Names the page answered to before renames, plus the one it is
    /// leaving now; never its own target name
    fn former_names(&self, existing: Option<&Page>, target_name: &str) -> WikiResult<Vec<String>> {
        let Some(page) = existing else {
            return Ok(Vec::new());
        };
        let mut names = self.store.former_names(page.id)?;
        if page.name != target_name && !names.contains(&page.name) {
            names.push(page.name.clone());
        }
        names.retain(|name| name != target_name);
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{Rendered, WikiRenderer};
    use crate::model::{MarkupMode, NewWeb};
    use crate::storage::{OpenStore, SqliteStore};
    use chrono::TimeZone;

    struct Fixture {
        store: SqliteStore,
        renderer: WikiRenderer,
        normalizer: LinkNormalizer,
        web: Web,
    }

    impl Fixture {
        fn new() -> Self {
            let store = SqliteStore::open_in_memory().unwrap();
            let web = store.create_web(&NewWeb::new("Test", "test").brackets_only(true)).unwrap();
            Self {
                store,
                renderer: WikiRenderer::new(),
                normalizer: LinkNormalizer::default(),
                web,
            }
        }

        fn ledger(&self) -> RevisionLedger<'_> {
            RevisionLedger::new(&self.store, &self.renderer, &self.normalizer, Duration::minutes(30))
        }

        fn save(&self, name: &str, content: &str, author: &str, minute: i64) -> WikiResult<CommitOutcome> {
            self.ledger()
                .revise(&self.web, &PageEdit::new(name, content, Author::new(author), at(minute)))
        }

        fn history(&self, name: &str) -> Vec<Revision> {
            let page = self.store.load_page(self.web.id, name).unwrap().unwrap();
            self.store.revisions(page.id).unwrap()
        }

        fn edges(&self, name: &str) -> Vec<Reference> {
            let page = self.store.load_page(self.web.id, name).unwrap().unwrap();
            self.store.references_from(page.id).unwrap()
        }
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn first_save_creates_page_and_revision() {
        let fx = Fixture::new();
        let outcome = fx.save("HomePage", "Welcome to [[Guide]]", "alice", 0).unwrap();

        assert!(!outcome.amended);
        assert_eq!(outcome.page.name, "HomePage");
        assert_eq!(fx.history("HomePage").len(), 1);
        assert_eq!(
            fx.edges("HomePage"),
            vec![Reference::new("Guide", LinkKind::Wanted), Reference::new("alice", LinkKind::Author)]
        );
    }

    #[test]
    fn unchanged_save_is_rejected_without_touching_history() {
        let fx = Fixture::new();
        fx.save("Page", "same", "alice", 0).unwrap();

        let err = fx.save("Page", "same", "bob", 60).unwrap_err();
        assert!(matches!(err, WikiError::Validation(ref msg) if msg.contains("without changing")));
        let history = fx.history("Page");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].author.name, "alice");
        assert_eq!(history[0].revised_at, at(0));
    }

    #[test]
    fn same_author_inside_window_amends() {
        let fx = Fixture::new();
        fx.save("Page", "one", "alice", 0).unwrap();
        let outcome = fx.save("Page", "two", "alice", 29).unwrap();

        assert!(outcome.amended);
        let history = fx.history("Page");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "two");
        assert_eq!(history[0].revised_at, at(29));
    }

    #[test]
    fn same_author_outside_window_appends() {
        let fx = Fixture::new();
        fx.save("Page", "one", "alice", 0).unwrap();
        let outcome = fx.save("Page", "two", "alice", 31).unwrap();

        assert!(!outcome.amended);
        let contents: Vec<_> = fx.history("Page").into_iter().map(|r| r.content).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[test]
    fn unbounded_window_amends_instead_of_overflowing() {
        let fx = Fixture::new();
        let ledger = RevisionLedger::new(&fx.store, &fx.renderer, &fx.normalizer, Duration::weeks(10_000_000_000));
        let edit = |content: &str, minute| PageEdit::new("Page", content, Author::new("alice"), at(minute));
        ledger.revise(&fx.web, &edit("one", 0)).unwrap();
        let outcome = ledger.revise(&fx.web, &edit("two", 60 * 24)).unwrap();
        assert!(outcome.amended);
        assert_eq!(fx.history("Page").len(), 1);
    }

    #[test]
    fn different_author_always_appends() {
        let fx = Fixture::new();
        fx.save("Page", "one", "alice", 0).unwrap();
        fx.save("Page", "two", "bob", 1).unwrap();
        assert_eq!(fx.history("Page").len(), 2);
    }

    #[test]
    fn rename_records_redirect_and_keeps_it() {
        let fx = Fixture::new();
        fx.save("OldName", "body", "alice", 0).unwrap();
        let edit = PageEdit::new("OldName", "body", Author::new("alice"), at(40)).renamed_to("NewName");
        let outcome = fx.ledger().revise(&fx.web, &edit).unwrap();

        assert_eq!(outcome.page.name, "NewName");
        assert!(fx.store.load_page(fx.web.id, "OldName").unwrap().is_none());
        assert_eq!(fx.history("NewName").len(), 2);

        // A later content edit must not lose the redirect
        fx.save("NewName", "changed body", "bob", 90).unwrap();
        assert!(fx
            .edges("NewName")
            .contains(&Reference::new("OldName", LinkKind::Redirected)));
        let graph = ReferenceGraph::new(&fx.store, fx.web.id);
        assert_eq!(graph.redirect_target("OldName").unwrap().as_deref(), Some("NewName"));
    }

    #[test]
    fn renaming_back_drops_the_redirect_to_itself() {
        let fx = Fixture::new();
        fx.save("First", "body", "alice", 0).unwrap();
        let away = PageEdit::new("First", "body", Author::new("alice"), at(1)).renamed_to("Second");
        fx.ledger().revise(&fx.web, &away).unwrap();
        let back = PageEdit::new("Second", "body", Author::new("alice"), at(2)).renamed_to("First");
        fx.ledger().revise(&fx.web, &back).unwrap();

        let redirects: Vec<_> = fx
            .edges("First")
            .into_iter()
            .filter(|r| r.kind == LinkKind::Redirected)
            .map(|r| r.referenced_name)
            .collect();
        assert_eq!(redirects, vec!["Second"]);
    }

    #[test]
    fn removing_a_redirect_directive_removes_its_edge() {
        let fx = Fixture::new();
        fx.save("Two", "[[!redirects Hop]]", "alice", 0).unwrap();
        let graph = ReferenceGraph::new(&fx.store, fx.web.id);
        assert_eq!(graph.redirect_target("Hop").unwrap().as_deref(), Some("Two"));

        fx.save("Two", "no redirect any more", "bob", 60).unwrap();
        assert_eq!(fx.edges("Two"), vec![Reference::new("bob", LinkKind::Author)]);
        assert_eq!(graph.redirect_target("Hop").unwrap(), None);
        assert_eq!(graph.classify("Hop").unwrap(), LinkKind::Wanted);
    }

    #[test]
    fn rename_redirect_survives_dropping_the_same_directive() {
        let fx = Fixture::new();
        fx.save("Draft", "body", "alice", 0).unwrap();
        let edit = PageEdit::new("Draft", "[[!redirects Draft]] body", Author::new("alice"), at(40))
            .renamed_to("Final");
        fx.ledger().revise(&fx.web, &edit).unwrap();

        fx.save("Final", "body", "bob", 90).unwrap();
        assert!(fx.edges("Final").contains(&Reference::new("Draft", LinkKind::Redirected)));
        assert_eq!(fx.store.former_names(fx.store.load_page(fx.web.id, "Final").unwrap().unwrap().id).unwrap(), vec!["Draft"]);
    }

    #[test]
    fn rename_onto_existing_page_is_rejected() {
        let fx = Fixture::new();
        fx.save("One", "first", "alice", 0).unwrap();
        fx.save("Two", "second", "alice", 0).unwrap();

        let edit = PageEdit::new("One", "first", Author::new("alice"), at(5)).renamed_to("Two");
        let err = fx.ledger().revise(&fx.web, &edit).unwrap_err();
        assert!(matches!(err, WikiError::Validation(ref msg) if msg.contains("already a page")));
        assert_eq!(fx.history("One").len(), 1);
    }

    #[test]
    fn render_failure_aborts_the_save() {
        let fx = Fixture::new();
        fx.save("Page", "links to [[Target]]", "alice", 0).unwrap();

        let err = fx.save("Page", "[[!include Page]]", "bob", 60).unwrap_err();
        assert!(matches!(err, WikiError::Validation(_)));
        assert_eq!(fx.history("Page").len(), 1);
        assert_eq!(fx.edges("Page")[0], Reference::new("Target", LinkKind::Wanted));
    }

    #[test]
    fn web_without_markup_engine_rejects_saves() {
        let fx = Fixture::new();
        let textile = fx
            .store
            .create_web(&NewWeb::new("Old", "old").with_markup(MarkupMode::Textile))
            .unwrap();
        let edit = PageEdit::new("Page", "text", Author::new("alice"), at(0));
        let err = fx.ledger().revise(&textile, &edit).unwrap_err();
        assert!(matches!(err, WikiError::Validation(ref msg) if msg.contains("textile")));
        assert!(fx.store.list_pages(textile.id).unwrap().is_empty());
    }

    #[test]
    fn legacy_links_are_normalized_before_storing() {
        let fx = Fixture::new();
        fx.save("Page", r#"See "the guide":Guide+Page for more"#, "alice", 0).unwrap();

        assert_eq!(fx.history("Page")[0].content, "See [[Guide Page|the guide]] for more");
        assert!(fx.edges("Page").contains(&Reference::new("Guide Page", LinkKind::Wanted)));
    }

    #[test]
    fn renderer_sees_links_to_existing_pages() {
        let fx = Fixture::new();
        fx.save("Target", "here", "alice", 0).unwrap();
        fx.save("Source", "to [[Target]]", "alice", 0).unwrap();
        assert_eq!(fx.edges("Source")[0], Reference::new("Target", LinkKind::Linked));
    }

    #[test]
    fn rollback_restores_content_as_new_revision() {
        let fx = Fixture::new();
        fx.save("Page", "original", "alice", 0).unwrap();
        fx.save("Page", "vandalised", "mallory", 60).unwrap();

        let outcome = fx
            .ledger()
            .rollback(&fx.web, "Page", 0, Some("192.168.1.9"), at(120))
            .unwrap();

        assert!(!outcome.amended);
        assert_eq!(outcome.revision.content, "original");
        assert_eq!(outcome.revision.author, Author::new("alice").with_origin("192.168.1.9"));
        assert_eq!(fx.history("Page").len(), 3);
    }

    #[test]
    fn rollback_to_missing_revision_is_a_validation_failure() {
        let fx = Fixture::new();
        fx.save("Page", "only", "alice", 0).unwrap();
        let err = fx.ledger().rollback(&fx.web, "Page", 5, None, at(10)).unwrap_err();
        assert!(matches!(err, WikiError::Validation(ref msg) if msg == "Revision 5 not found"));

        let err = fx.ledger().rollback(&fx.web, "Missing", 0, None, at(10)).unwrap_err();
        assert!(matches!(err, WikiError::NotFound(_)));
    }

    #[test]
    fn rollback_to_current_content_is_rejected() {
        let fx = Fixture::new();
        fx.save("Page", "only", "alice", 0).unwrap();
        let err = fx.ledger().rollback(&fx.web, "Page", 0, None, at(10)).unwrap_err();
        assert!(matches!(err, WikiError::Validation(_)));
    }

    #[test]
    fn custom_renderer_references_are_stored() {
        struct Fixed;
        impl Renderer for Fixed {
            fn render(&self, _request: &RenderRequest<'_>) -> Result<Rendered, RenderError> {
                Ok(Rendered {
                    html: String::new(),
                    references: vec![Reference::new("Tagged", LinkKind::Category)],
                })
            }
        }

        let fx = Fixture::new();
        let normalizer = LinkNormalizer::default();
        let ledger = RevisionLedger::new(&fx.store, &Fixed, &normalizer, Duration::minutes(30));
        ledger
            .revise(&fx.web, &PageEdit::new("Page", "x", Author::new(""), at(0)))
            .unwrap();
        assert_eq!(fx.edges("Page"), vec![Reference::new("Tagged", LinkKind::Category)]);
    }
}
