pub mod error;

pub mod config;

pub mod logging;
pub use logging::LoggerBuilder;

pub mod container {
    pub mod service_container;
    pub use service_container::{Constructor, Dependency, Injectable, Lifetime, ServiceContainer};
}

pub mod registry {
    pub mod signal_kind;
    pub use signal_kind::{JoinEnum, JoinType, SignalKind, SignalKindRegistry};

    pub mod page_registry;
    pub use page_registry::{PageDescriptor, PageRegistry};

    pub mod reverse_join;
    pub use reverse_join::ReverseJoinRegistry;

    pub mod dispatch_table;
    pub use dispatch_table::{BoundHandler, DispatchTable, DispatchTables, HandlerStats};
}

pub mod panel {
    pub mod device;
    pub use device::{Panel, PanelId, PanelRef, SENTINEL_PANEL_ID};

    pub mod signal;
    pub use signal::{SignalEvent, SignalValue};

    pub mod page;
    pub use page::{Page, PageFactory, PageId, PageLogic};

    pub mod virtual_panel;
    pub use virtual_panel::VirtualPanel;

    pub mod logic_pool;
    pub use logic_pool::{LogicGroup, PageSlot, PanelLogicPool};
}

pub mod scanner {
    pub mod manifest;
    pub use manifest::{
        InventoryModule, JoinBinding, JoinRef, Manifest, ManifestBuilder, ManifestSource,
        PageManifest,
    };

    pub mod auto_registration;
    pub use auto_registration::{
        AutoRegistrationScanner, ManifestSources, ScanReport, ScanState, ScanWarning,
    };
}

pub mod router {
    pub mod join_router;
    pub use join_router::{JoinRouter, RouteOutcome, in_handler};
}

pub mod framework;
pub use framework::{PanelFramework, PanelFrameworkBuilder};

pub use config::FrameworkConfig;

pub use error::{FrameworkError, HandlerError};

// Used by `join_enum!` and `register_page!` in downstream crates.
#[doc(hidden)]
pub use inventory;
