//! `src/registry/page_registry.rs`
//! ============================================================================
//! # PageRegistry: page id → page factory
//!
//! Populated once by the scanner. The logic pool takes a snapshot with
//! [`PageRegistry::get_all`] every time a panel registers.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{FrameworkError, Result};
use crate::panel::page::{PageFactory, PageId};

/// Registered page: id, implementing type and factory.
#[derive(Clone)]
pub struct PageDescriptor {
    pub page_id: PageId,
    pub type_name: &'static str,
    pub factory: PageFactory,
}

impl fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("page_id", &self.page_id)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct PageRegistry {
    pages: RwLock<BTreeMap<PageId, PageDescriptor>>,
}

impl PageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page factory. An occupied id is a fatal startup error and
    /// leaves the existing factory in place.
    pub fn register_page(
        &self,
        page_id: PageId,
        type_name: &'static str,
        factory: PageFactory,
    ) -> Result<()> {
        let mut pages = self.pages.write();

        if let Some(existing) = pages.get(&page_id) {
            debug!(
                page_id,
                existing = existing.type_name,
                rejected = type_name,
                "Duplicate page id"
            );
            return Err(FrameworkError::DuplicatePageId(page_id));
        }

        pages.insert(
            page_id,
            PageDescriptor {
                page_id,
                type_name,
                factory,
            },
        );
        debug!(page_id, type_name, "Registered page");

        Ok(())
    }

    /// Descriptor for a page id, `None` when unknown.
    #[must_use]
    pub fn get_page(&self, page_id: PageId) -> Option<PageDescriptor> {
        self.pages.read().get(&page_id).cloned()
    }

    /// Snapshot of every registered page, ordered by page id.
    #[must_use]
    pub fn get_all(&self) -> Vec<PageDescriptor> {
        self.pages.read().values().cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.read().contains_key(&page_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }

    pub fn clear(&self) {
        self.pages.write().clear();
    }
}
