//! Point and graph queries over one web's stored edges
//!
//! Edges are written only by the ledger's commit; everything here reads.
//! Redirects are resolved a single hop: an old name reaches the page that
//! declares it, never the page that later renamed that one again.

use crate::model::{LinkKind, WebId, WebReference};
use crate::storage::{StorageResult, WikiStore};
use std::collections::{BTreeSet, HashSet};

/// Read-only view of the reference edges of a single web
#[derive(Clone, Copy)]
pub struct ReferenceGraph<'a> {
    store: &'a dyn WikiStore,
    web_id: WebId,
}

impl<'a> ReferenceGraph<'a> {
    pub fn new(store: &'a dyn WikiStore, web_id: WebId) -> Self {
        Self { store, web_id }
    }

    pub fn web_id(&self) -> WebId {
        self.web_id
    }

    /// `Linked` when a page has the name or some page redirects for it,
    /// otherwise `Wanted`
    pub fn classify(&self, name: &str) -> StorageResult<LinkKind> {
        if self.store.load_page(self.web_id, name)?.is_some() || self.has_redirect_for(name)? {
            Ok(LinkKind::Linked)
        } else {
            Ok(LinkKind::Wanted)
        }
    }

    /// Pages linking to or including `name`
    pub fn pages_that_reference(&self, name: &str) -> StorageResult<Vec<String>> {
        self.store
            .referencing_page_names(self.web_id, name, &LinkKind::PAGE_USES)
    }

    /// Pages linking to `name`, inclusions excluded
    pub fn pages_that_link_to(&self, name: &str) -> StorageResult<Vec<String>> {
        self.store
            .referencing_page_names(self.web_id, name, &LinkKind::PAGE_LINKS)
    }

    pub fn pages_that_include(&self, name: &str) -> StorageResult<Vec<String>> {
        self.store
            .referencing_page_names(self.web_id, name, &[LinkKind::Included])
    }

    pub fn pages_that_link_to_file(&self, file_name: &str) -> StorageResult<Vec<String>> {
        self.store
            .referencing_page_names(self.web_id, file_name, &[LinkKind::File])
    }

    /// The page that used to be called `old_name`, if any
    pub fn redirect_target(&self, old_name: &str) -> StorageResult<Option<String>> {
        Ok(self
            .store
            .referencing_page_names(self.web_id, old_name, &[LinkKind::Redirected])?
            .into_iter()
            .next())
    }

    pub fn has_redirect_for(&self, old_name: &str) -> StorageResult<bool> {
        Ok(self.redirect_target(old_name)?.is_some())
    }

    /// Old names the page currently called `page_name` answers for
    pub fn redirects_of(&self, page_name: &str) -> StorageResult<Vec<String>> {
        let Some(page) = self.store.load_page(self.web_id, page_name)? else {
            return Ok(Vec::new());
        };
        Ok(self
            .store
            .references_from(page.id)?
            .into_iter()
            .filter(|reference| reference.kind == LinkKind::Redirected)
            .map(|reference| reference.referenced_name)
            .collect())
    }

    /// Pages still referencing an old name of `page_name`
    pub fn pages_redirected_to(&self, page_name: &str) -> StorageResult<Vec<String>> {
        let mut names = BTreeSet::new();
        for old_name in self.redirects_of(page_name)? {
            names.extend(self.pages_that_reference(&old_name)?);
        }
        Ok(names.into_iter().collect())
    }

    /// Names of pages in use: named by a link or inclusion, directly or
    /// through one redirect hop
    pub fn all_referenced_pages(&self) -> StorageResult<BTreeSet<String>> {
        self.referenced_pages(false)
    }

    /// As `all_referenced_pages`, but a page's references to its own names
    /// do not count
    pub fn externally_referenced_pages(&self) -> StorageResult<BTreeSet<String>> {
        self.referenced_pages(true)
    }

    /// Old names that are still referenced somewhere and resolve through a
    /// redirect
    pub fn referenced_redirection_names(&self) -> StorageResult<Vec<String>> {
        let used: HashSet<String> = self
            .uses()?
            .into_iter()
            .map(|reference| reference.referenced_name)
            .collect();
        let names: BTreeSet<String> = self
            .redirections()?
            .into_iter()
            .filter(|redirect| used.contains(&redirect.referenced_name))
            .map(|redirect| redirect.referenced_name)
            .collect();
        Ok(names.into_iter().collect())
    }

    pub fn pages_in_category(&self, category: &str) -> StorageResult<Vec<String>> {
        self.store
            .referencing_page_names(self.web_id, category, &[LinkKind::Category])
    }

    /// Distinct category names used in the web, sorted
    pub fn list_categories(&self) -> StorageResult<Vec<String>> {
        let categories: BTreeSet<String> = self
            .store
            .references_in_web(self.web_id, &[LinkKind::Category])?
            .into_iter()
            .map(|reference| reference.referenced_name)
            .collect();
        Ok(categories.into_iter().collect())
    }

    fn uses(&self) -> StorageResult<Vec<WebReference>> {
        self.store.references_in_web(self.web_id, &LinkKind::PAGE_USES)
    }

    fn redirections(&self) -> StorageResult<Vec<WebReference>> {
        self.store
            .references_in_web(self.web_id, &[LinkKind::Redirected])
    }

    fn referenced_pages(&self, exclude_self: bool) -> StorageResult<BTreeSet<String>> {
        let existing: HashSet<String> = self
            .store
            .list_pages(self.web_id)?
            .into_iter()
            .map(|page| page.name)
            .collect();
        let uses = self.uses()?;

        // Direct hits: the referenced name is a current page name
        let mut referenced: BTreeSet<String> = uses
            .iter()
            .filter(|reference| !exclude_self || reference.page_name != reference.referenced_name)
            .filter(|reference| existing.contains(&reference.referenced_name))
            .map(|reference| reference.referenced_name.clone())
            .collect();

        // One hop: the referenced name is an old name of some page
        for redirect in self.redirections()? {
            let reached = uses.iter().any(|reference| {
                reference.referenced_name == redirect.referenced_name
                    && (!exclude_self || reference.page_name != redirect.page_name)
            });
            if reached {
                referenced.insert(redirect.page_name);
            }
        }
        Ok(referenced)
    }
}
