//! `src/framework.rs`
//! ============================================================================
//! # PanelFramework: composition root
//!
//! Wires every component through a [`ServiceContainer`], runs the
//! auto-registration scan once, and exposes the host-facing surface:
//! panel registration, routing and defaults.
//!
//! ```rust,ignore
//! let framework = PanelFramework::builder()
//!     .config(FrameworkConfig::load()?)
//!     .build()?;
//! framework.register_panel(VirtualPanel::shared(0x03, "Lobby"))?;
//! framework.route(0x03, &SignalEvent::digital(1, true));
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::{BuildOptions, FrameworkConfig, ScanConfig};
use crate::container::service_container::{Constructor, Injectable, Lifetime, ServiceContainer};
use crate::error::Result;
use crate::panel::device::{PanelId, PanelRef};
use crate::panel::logic_pool::{LogicGroup, PanelLogicPool};
use crate::panel::signal::SignalEvent;
use crate::registry::dispatch_table::DispatchTables;
use crate::registry::page_registry::PageRegistry;
use crate::registry::reverse_join::ReverseJoinRegistry;
use crate::registry::signal_kind::SignalKindRegistry;
use crate::router::join_router::{JoinRouter, RouteOutcome};
use crate::scanner::auto_registration::{AutoRegistrationScanner, ManifestSources, ScanReport};
use crate::scanner::manifest::ManifestSource;

impl Injectable for PanelLogicPool {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::with2(
            |pages: Arc<PageRegistry>, options: Arc<BuildOptions>| {
                Self::new(pages, options.as_ref().clone())
            },
        )]
    }
}

#[derive(Default)]
pub struct PanelFrameworkBuilder {
    config: FrameworkConfig,
    sources: Option<ManifestSources>,
}

impl PanelFrameworkBuilder {
    #[must_use]
    pub fn config(mut self, config: FrameworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a manifest source. Without any, every crate that submitted
    /// declarations to `inventory` is scanned.
    #[must_use]
    pub fn source(mut self, source: impl ManifestSource + 'static) -> Self {
        self.sources
            .get_or_insert_with(ManifestSources::default)
            .push(Arc::new(source));
        self
    }

    pub fn build(self) -> Result<PanelFramework> {
        let Self { config, sources } = self;
        let sources: ManifestSources = sources.unwrap_or_else(ManifestSources::discover);

        let mut container = ServiceContainer::new();
        container
            .register_instance(Arc::new(config.build.clone()))
            .register_instance(Arc::new(config.scan.clone()))
            .register_instance(Arc::new(sources))
            .register_instance(Arc::new(config.clone()))
            .register_factory::<SignalKindRegistry, _>(Lifetime::Singleton, |_c: &ServiceContainer| {
                Ok(Arc::new(SignalKindRegistry::new()))
            })
            .register_factory::<PageRegistry, _>(Lifetime::Singleton, |_c: &ServiceContainer| {
                Ok(Arc::new(PageRegistry::new()))
            })
            .register_factory::<ReverseJoinRegistry, _>(
                Lifetime::Singleton,
                |_c: &ServiceContainer| Ok(Arc::new(ReverseJoinRegistry::new())),
            )
            .register_factory::<DispatchTables, _>(Lifetime::Singleton, |_c: &ServiceContainer| {
                Ok(Arc::new(DispatchTables::new()))
            })
            .register_type::<PanelLogicPool>(Lifetime::Singleton)
            .register_type::<JoinRouter>(Lifetime::Singleton)
            .register_type::<AutoRegistrationScanner>(Lifetime::Transient);

        let scanner: Arc<AutoRegistrationScanner> = container.resolve::<AutoRegistrationScanner>()?;
        let scan_report: ScanReport = scanner.run()?;

        let framework = PanelFramework {
            kinds: container.resolve::<SignalKindRegistry>()?,
            pages: container.resolve::<PageRegistry>()?,
            reverse: container.resolve::<ReverseJoinRegistry>()?,
            tables: container.resolve::<DispatchTables>()?,
            pool: container.resolve::<PanelLogicPool>()?,
            router: container.resolve::<JoinRouter>()?,
            config,
            scan_report,
            container,
        };

        info!(
            pages = framework.pages.len(),
            handlers = framework.tables.len(),
            warnings = framework.scan_report.warnings.len(),
            "Panel framework ready"
        );

        Ok(framework)
    }
}

pub struct PanelFramework {
    container: ServiceContainer,
    config: FrameworkConfig,
    scan_report: ScanReport,
    kinds: Arc<SignalKindRegistry>,
    pages: Arc<PageRegistry>,
    reverse: Arc<ReverseJoinRegistry>,
    tables: Arc<DispatchTables>,
    pool: Arc<PanelLogicPool>,
    router: Arc<JoinRouter>,
}

impl PanelFramework {
    #[must_use]
    pub fn builder() -> PanelFrameworkBuilder {
        PanelFrameworkBuilder::default()
    }

    pub fn register_panel(&self, panel: PanelRef) -> Result<Arc<LogicGroup>> {
        self.pool.register_panel(panel)
    }

    pub fn unregister_panel(&self, panel_id: PanelId) -> Option<Arc<LogicGroup>> {
        self.pool.unregister_panel(panel_id)
    }

    pub fn route(&self, panel_id: PanelId, event: &SignalEvent) -> RouteOutcome {
        self.router.route(panel_id, event)
    }

    pub fn set_defaults(&self, panel_id: PanelId) -> Result<()> {
        self.pool.set_defaults(panel_id)
    }

    pub fn logic_group(&self, panel_id: PanelId) -> Result<Arc<LogicGroup>> {
        self.pool.get_group(panel_id)
    }

    #[must_use]
    pub fn scan_report(&self) -> &ScanReport {
        &self.scan_report
    }

    #[must_use]
    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    #[must_use]
    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    #[must_use]
    pub fn kinds(&self) -> &SignalKindRegistry {
        &self.kinds
    }

    #[must_use]
    pub fn pages(&self) -> &PageRegistry {
        &self.pages
    }

    #[must_use]
    pub fn reverse_joins(&self) -> &ReverseJoinRegistry {
        &self.reverse
    }

    #[must_use]
    pub fn dispatch_tables(&self) -> &DispatchTables {
        &self.tables
    }

    #[must_use]
    pub fn router(&self) -> &JoinRouter {
        &self.router
    }

    #[must_use]
    pub fn scan_config(&self) -> &ScanConfig {
        &self.config.scan
    }

    /// Drop every panel and registration. Only valid once signal delivery
    /// has stopped.
    pub fn shutdown(&self) {
        self.pool.clear();
        self.tables.clear();
        self.reverse.clear();
        self.pages.clear();
        self.kinds.clear();
        info!("Panel framework shut down");
    }
}

impl std::fmt::Debug for PanelFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelFramework")
            .field("panels", &self.pool.panel_ids())
            .field("pages", &self.pages.len())
            .field("handlers", &self.tables.len())
            .field("scan_report", &self.scan_report)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_any;
    use crate::panel::page::{Page, PageId, PageLogic};
    use crate::panel::virtual_panel::VirtualPanel;
    use crate::registry::signal_kind::SignalKind;
    use crate::scanner::manifest::{JoinBinding, ManifestBuilder};

    crate::join_enum! {
        enum Room: digital {
            Shades = 40,
        }
    }

    struct ShadesPage {
        panel: PanelRef,
        lowered: bool,
    }

    impl ShadesPage {
        fn on_shades(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
            if event.bool_value() {
                self.lowered = !self.lowered;
                self.panel.set_digital(140, self.lowered);
            }
            Ok(())
        }
    }

    impl PageLogic for ShadesPage {
        fn set_defaults(&mut self) {
            self.lowered = false;
        }

        page_any!();
    }

    impl Page for ShadesPage {
        const PAGE_ID: PageId = 12;

        fn new(panel: PanelRef) -> Self {
            Self {
                panel,
                lowered: false,
            }
        }

        fn bindings() -> Vec<JoinBinding<Self>> {
            vec![JoinBinding::new(Room::Shades, "on_shades", Self::on_shades)]
        }
    }

    fn framework() -> PanelFramework {
        PanelFramework::builder()
            .source(
                ManifestBuilder::new("room")
                    .join_enum::<Room>(SignalKind::Digital)
                    .page::<ShadesPage>(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_wires_components_through_container() {
        let fw = framework();

        assert!(fw.container().is_registered::<JoinRouter>());
        assert!(Arc::ptr_eq(
            &fw.container().resolve::<PanelLogicPool>().unwrap(),
            &fw.pool
        ));
        assert_eq!(fw.scan_report().pages, 1);
        assert_eq!(fw.reverse_joins().lookup(40, SignalKind::Digital), Some(12));
    }

    #[test]
    fn test_route_drives_panel_feedback() {
        let fw = framework();
        let panel = VirtualPanel::shared(0x03, "Boardroom");
        fw.register_panel(panel.clone()).unwrap();

        assert_eq!(fw.route(0x03, &panel.press(Room::Shades)), RouteOutcome::Dispatched);
        assert!(panel.digital_feedback(140));

        fw.set_defaults(0x03).unwrap();
        assert_eq!(
            fw.logic_group(0x03)
                .unwrap()
                .with_page(12, |page: &mut ShadesPage| page.lowered),
            Some(false)
        );
    }

    #[test]
    fn test_shutdown_clears_everything() {
        let fw = framework();
        fw.register_panel(VirtualPanel::shared(0x03, "Boardroom")).unwrap();

        fw.shutdown();

        assert!(fw.pages().is_empty());
        assert!(fw.dispatch_tables().is_empty());
        assert_eq!(fw.route(0x03, &SignalEvent::digital(40, true)), RouteOutcome::PanelNotRegistered);
    }
}
