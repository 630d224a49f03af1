//! `src/panel/logic_pool.rs`
//! ============================================================================
//! # PanelLogicPool: per-panel page instances
//!
//! Each registered panel owns a [`LogicGroup`]: one instance of every
//! registered page, built from the page registry snapshot taken at
//! registration time. The group's page set never changes after construction;
//! the page instances themselves are mutated by handlers.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::BuildOptions;
use crate::error::{FrameworkError, Result};
use crate::panel::device::{PanelId, PanelRef, SENTINEL_PANEL_ID};
use crate::panel::page::{PageId, PageLogic};
use crate::registry::page_registry::{PageDescriptor, PageRegistry};

/// One page instance, lockable on its own so routing never holds the pool.
pub type PageSlot = Arc<Mutex<Box<dyn PageLogic>>>;

/// A panel and its page instances.
pub struct LogicGroup {
    panel: PanelRef,
    pages: BTreeMap<PageId, PageSlot>,
}

impl LogicGroup {
    fn build(panel: PanelRef, descriptors: &[PageDescriptor]) -> Self {
        let pages: BTreeMap<PageId, PageSlot> = descriptors
            .iter()
            .map(|descriptor: &PageDescriptor| {
                let page: Box<dyn PageLogic> = (descriptor.factory)(panel.clone());
                (descriptor.page_id, Arc::new(Mutex::new(page)))
            })
            .collect();

        Self { panel, pages }
    }

    #[must_use]
    pub fn panel(&self) -> &PanelRef {
        &self.panel
    }

    #[must_use]
    pub fn page(&self, page_id: PageId) -> Option<PageSlot> {
        self.pages.get(&page_id).cloned()
    }

    #[must_use]
    pub fn page_ids(&self) -> Vec<PageId> {
        self.pages.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Run `f` against a page instance of concrete type `P`.
    ///
    /// Returns `None` when the page is absent or of another type.
    pub fn with_page<P: PageLogic, R>(&self, page_id: PageId, f: impl FnOnce(&mut P) -> R) -> Option<R> {
        let slot: &PageSlot = self.pages.get(&page_id)?;
        let mut guard = slot.lock();
        let page: &mut dyn PageLogic = &mut **guard;
        page.downcast_mut::<P>().map(f)
    }

    fn initialize(&self) {
        for slot in self.pages.values() {
            slot.lock().initialize();
        }
    }

    fn set_defaults(&self) {
        for slot in self.pages.values() {
            slot.lock().set_defaults();
        }
    }
}

impl fmt::Debug for LogicGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicGroup")
            .field("panel", &self.panel.id())
            .field("pages", &self.page_ids())
            .finish()
    }
}

/// Panel id → logic group.
pub struct PanelLogicPool {
    pages: Arc<PageRegistry>,
    options: BuildOptions,
    groups: RwLock<HashMap<PanelId, Arc<LogicGroup>, RandomState>>,
}

impl PanelLogicPool {
    #[must_use]
    pub fn new(pages: Arc<PageRegistry>, options: BuildOptions) -> Self {
        Self {
            pages,
            options,
            groups: RwLock::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    /// Build the panel's page instances and initialize them.
    pub fn register_panel(&self, panel: PanelRef) -> Result<Arc<LogicGroup>> {
        let panel_id: PanelId = panel.id();

        if panel_id == SENTINEL_PANEL_ID {
            return Err(FrameworkError::InvalidPanel(panel_id));
        }

        if self.groups.read().contains_key(&panel_id) {
            return Err(FrameworkError::DuplicatePanel(panel_id));
        }

        let descriptors: Vec<PageDescriptor> = self.pages.get_all();
        let group: Arc<LogicGroup> = Arc::new(LogicGroup::build(panel.clone(), &descriptors));

        {
            let mut groups = self.groups.write();
            if groups.contains_key(&panel_id) {
                return Err(FrameworkError::DuplicatePanel(panel_id));
            }
            groups.insert(panel_id, group.clone());
        }

        group.initialize();

        if self.options.auto_register_panels {
            if let Err(e) = panel.register_device() {
                warn!(panel = panel_id, name = panel.name(), "Control system registration failed: {e:#}");
            }
        }

        info!(
            panel = panel_id,
            name = panel.name(),
            pages = group.len(),
            "Panel registered"
        );

        Ok(group)
    }

    /// Drop the panel's logic group. `None` if the panel was not registered.
    pub fn unregister_panel(&self, panel_id: PanelId) -> Option<Arc<LogicGroup>> {
        let removed = self.groups.write().remove(&panel_id);

        match &removed {
            Some(_) => info!(panel = panel_id, "Panel unregistered"),
            None => debug!(panel = panel_id, "Unregister requested for unknown panel"),
        }

        removed
    }

    pub fn get_group(&self, panel_id: PanelId) -> Result<Arc<LogicGroup>> {
        self.groups
            .read()
            .get(&panel_id)
            .cloned()
            .ok_or(FrameworkError::PanelNotFound(panel_id))
    }

    /// Reset every page of the panel to its default UI state.
    pub fn set_defaults(&self, panel_id: PanelId) -> Result<()> {
        let group: Arc<LogicGroup> = self.get_group(panel_id)?;
        group.set_defaults();
        debug!(panel = panel_id, "Panel defaults applied");
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, panel_id: PanelId) -> bool {
        self.groups.read().contains_key(&panel_id)
    }

    /// Registered panel ids, sorted.
    #[must_use]
    pub fn panel_ids(&self) -> Vec<PanelId> {
        let mut ids: Vec<PanelId> = self.groups.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }

    /// Drop every panel. Shutdown only.
    pub fn clear(&self) {
        let count: usize = {
            let mut groups = self.groups.write();
            let count = groups.len();
            groups.clear();
            count
        };
        info!(panels = count, "Panel logic pool cleared");
    }
}

impl fmt::Debug for PanelLogicPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelLogicPool")
            .field("panel_count", &self.len())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_any;
    use crate::panel::virtual_panel::VirtualPanel;
    use crate::registry::page_registry::PageRegistry;

    #[derive(Default)]
    struct Counter {
        count: u32,
        initialized: bool,
    }

    impl PageLogic for Counter {
        fn initialize(&mut self) {
            self.initialized = true;
        }

        fn set_defaults(&mut self) {
            self.count = 0;
        }

        page_any!();
    }

    fn build_pool(options: BuildOptions) -> PanelLogicPool {
        let pages = Arc::new(PageRegistry::new());
        pages
            .register_page(
                1,
                "Counter",
                Arc::new(|_panel: PanelRef| Box::new(Counter::default()) as Box<dyn PageLogic>),
            )
            .unwrap();
        PanelLogicPool::new(pages, options)
    }

    #[test]
    fn test_register_builds_initialized_pages() {
        let pool = build_pool(BuildOptions::default());
        let group = pool.register_panel(VirtualPanel::shared(0x03, "A")).unwrap();

        assert_eq!(group.page_ids(), vec![1]);
        assert_eq!(group.with_page(1, |c: &mut Counter| c.initialized), Some(true));
    }

    #[test]
    fn test_sentinel_and_duplicate_panels_rejected() {
        let pool = build_pool(BuildOptions::default());

        assert!(matches!(
            pool.register_panel(VirtualPanel::shared(0, "Zero")),
            Err(FrameworkError::InvalidPanel(0))
        ));

        pool.register_panel(VirtualPanel::shared(0x05, "A")).unwrap();
        assert!(matches!(
            pool.register_panel(VirtualPanel::shared(0x05, "B")),
            Err(FrameworkError::DuplicatePanel(0x05))
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_panels_have_isolated_state() {
        let pool = build_pool(BuildOptions::default());
        let a = pool.register_panel(VirtualPanel::shared(0x03, "A")).unwrap();
        let b = pool.register_panel(VirtualPanel::shared(0x04, "B")).unwrap();

        a.with_page(1, |c: &mut Counter| c.count += 5);

        assert_eq!(a.with_page(1, |c: &mut Counter| c.count), Some(5));
        assert_eq!(b.with_page(1, |c: &mut Counter| c.count), Some(0));
        assert!(!Arc::ptr_eq(&a.page(1).unwrap(), &b.page(1).unwrap()));
    }

    #[test]
    fn test_set_defaults_only_touches_one_panel() {
        let pool = build_pool(BuildOptions::default());
        let a = pool.register_panel(VirtualPanel::shared(0x03, "A")).unwrap();
        let b = pool.register_panel(VirtualPanel::shared(0x04, "B")).unwrap();
        a.with_page(1, |c: &mut Counter| c.count = 2);
        b.with_page(1, |c: &mut Counter| c.count = 3);

        pool.set_defaults(0x03).unwrap();

        assert_eq!(a.with_page(1, |c: &mut Counter| c.count), Some(0));
        assert_eq!(b.with_page(1, |c: &mut Counter| c.count), Some(3));
        assert!(matches!(pool.set_defaults(0x99), Err(FrameworkError::PanelNotFound(0x99))));
    }

    #[test]
    fn test_unregister_and_clear() {
        let pool = build_pool(BuildOptions::default());
        pool.register_panel(VirtualPanel::shared(0x03, "A")).unwrap();
        pool.register_panel(VirtualPanel::shared(0x04, "B")).unwrap();

        assert!(pool.unregister_panel(0x03).is_some());
        assert!(pool.unregister_panel(0x03).is_none());
        assert!(matches!(pool.get_group(0x03), Err(FrameworkError::PanelNotFound(0x03))));
        assert_eq!(pool.panel_ids(), vec![0x04]);

        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_auto_register_calls_device_hook() {
        let pool = build_pool(BuildOptions {
            auto_register_panels: true,
        });
        let panel = VirtualPanel::shared(0x07, "Auto");
        pool.register_panel(panel.clone()).unwrap();
        assert_eq!(panel.device_registrations(), 1);

        let quiet = build_pool(BuildOptions::default());
        let other = VirtualPanel::shared(0x08, "Manual");
        quiet.register_panel(other.clone()).unwrap();
        assert_eq!(other.device_registrations(), 0);
    }
}
