//! `src/scanner/auto_registration.rs`
//! ============================================================================
//! # AutoRegistrationScanner: one-shot startup discovery
//!
//! Walks every admitted [`ManifestSource`] and populates the registries:
//! 1. join enums → [`SignalKindRegistry`] (exactly one kind tag required)
//! 2. concrete pages → [`PageRegistry`], then each join binding →
//!    [`ReverseJoinRegistry`] and the matching [`DispatchTables`] entry
//!
//! Enums from all sources are registered before any page so bindings may
//! reference enums declared in another crate. Ownership conflicts are
//! warnings; an enum used by a binding but never tagged aborts the scan.

use std::fmt;
use std::sync::Arc;

use compact_str::CompactString;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::container::service_container::{Constructor, Dependency, Injectable, ResolvedArgs};
use crate::error::{FrameworkError, Result};
use crate::panel::page::{PageId, PageLogic};
use crate::panel::signal::SignalEvent;
use crate::registry::dispatch_table::{BoundHandler, DispatchTables, HandlerFn};
use crate::registry::page_registry::PageRegistry;
use crate::registry::reverse_join::ReverseJoinRegistry;
use crate::registry::signal_kind::{SignalKind, SignalKindRegistry};
use crate::scanner::manifest::{
    ErasedBinding, InventoryModule, JoinEnumDecl, Manifest, ManifestSource, PageManifest,
};

/// Scanner lifecycle. Single pass, no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,

    Scanning,

    Done,
}

impl ScanState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Done => "done",
        }
    }
}

/// The manifest sources a scanner walks, in order.
#[derive(Clone, Default)]
pub struct ManifestSources(Vec<Arc<dyn ManifestSource>>);

impl ManifestSources {
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn ManifestSource>>) -> Self {
        Self(sources)
    }

    /// Every crate that submitted declarations to `inventory`.
    #[must_use]
    pub fn discover() -> Self {
        Self(
            InventoryModule::discover()
                .into_iter()
                .map(|module: InventoryModule| Arc::new(module) as Arc<dyn ManifestSource>)
                .collect(),
        )
    }

    pub fn push(&mut self, source: Arc<dyn ManifestSource>) {
        self.0.push(source);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ManifestSource>> {
        self.0.iter()
    }
}

impl fmt::Debug for ManifestSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|source| source.crate_name()))
            .finish()
    }
}

/// Non-fatal problem found while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWarning {
    SourceFailed {
        source_name: CompactString,
        reason: String,
    },

    MissingKindTag {
        type_name: &'static str,
    },

    AmbiguousKindTag {
        type_name: &'static str,
        kinds: Vec<SignalKind>,
    },

    DuplicateJoinEnum {
        type_name: &'static str,
    },

    InvalidJoinEnum {
        type_name: &'static str,
        reason: String,
    },

    JoinAlreadyOwned {
        page_id: PageId,
        method: &'static str,
        join: u32,
        kind: SignalKind,
        owner: Option<PageId>,
    },

    HandlerAlreadyBound {
        page_id: PageId,
        method: &'static str,
        join: u32,
        kind: SignalKind,
    },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceFailed {
                source_name,
                reason,
            } => write!(f, "source `{source_name}` skipped: {reason}"),
            Self::MissingKindTag { type_name } => {
                write!(f, "join enum `{type_name}` has no signal kind tag")
            }
            Self::AmbiguousKindTag { type_name, kinds } => {
                write!(f, "join enum `{type_name}` has several signal kind tags: {kinds:?}")
            }
            Self::DuplicateJoinEnum { type_name } => {
                write!(f, "join enum `{type_name}` declared more than once")
            }
            Self::InvalidJoinEnum { type_name, reason } => {
                write!(f, "join enum `{type_name}` rejected: {reason}")
            }
            Self::JoinAlreadyOwned {
                page_id,
                method,
                join,
                kind,
                owner,
            } => match owner {
                Some(owner) => write!(
                    f,
                    "{kind} join {join} of page {page_id} (`{method}`) already owned by page {owner}"
                ),
                None => write!(f, "{kind} join {join} of page {page_id} (`{method}`) already owned"),
            },
            Self::HandlerAlreadyBound {
                page_id,
                method,
                join,
                kind,
            } => write!(
                f,
                "{kind} join {join} of page {page_id} (`{method}`) already has a handler"
            ),
        }
    }
}

/// Outcome of a completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub sources_loaded: usize,
    pub sources_filtered: usize,
    pub join_enums: usize,
    pub pages: usize,
    pub abstract_pages: usize,
    pub bindings: usize,
    pub warnings: Vec<ScanWarning>,
}

impl ScanReport {
    fn warn(&mut self, warning: ScanWarning) {
        warn!("Auto-registration: {warning}");
        self.warnings.push(warning);
    }
}

pub struct AutoRegistrationScanner {
    kinds: Arc<SignalKindRegistry>,
    pages: Arc<PageRegistry>,
    reverse: Arc<ReverseJoinRegistry>,
    tables: Arc<DispatchTables>,
    config: ScanConfig,
    sources: ManifestSources,
    state: Mutex<ScanState>,
}

impl AutoRegistrationScanner {
    #[must_use]
    pub fn new(
        kinds: Arc<SignalKindRegistry>,
        pages: Arc<PageRegistry>,
        reverse: Arc<ReverseJoinRegistry>,
        tables: Arc<DispatchTables>,
    ) -> Self {
        Self {
            kinds,
            pages,
            reverse,
            tables,
            config: ScanConfig::default(),
            sources: ManifestSources::default(),
            state: Mutex::new(ScanState::Idle),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_sources(mut self, sources: ManifestSources) -> Self {
        self.sources = sources;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ManifestSource>) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn state(&self) -> ScanState {
        *self.state.lock()
    }

    /// Run the scan. Only valid once, from [`ScanState::Idle`].
    pub fn run(&self) -> Result<ScanReport> {
        {
            let mut state = self.state.lock();
            if *state != ScanState::Idle {
                return Err(FrameworkError::ScannerState {
                    state: state.as_str(),
                });
            }
            *state = ScanState::Scanning;
        }

        let outcome: Result<ScanReport> = self.scan();
        *self.state.lock() = ScanState::Done;

        match &outcome {
            Ok(report) => info!(
                sources = report.sources_loaded,
                join_enums = report.join_enums,
                pages = report.pages,
                bindings = report.bindings,
                warnings = report.warnings.len(),
                "Auto-registration complete"
            ),
            Err(e) => warn!("Auto-registration aborted: {e}"),
        }

        outcome
    }

    fn scan(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        let manifests: Vec<Manifest> = self.load_manifests(&mut report);

        for decl in manifests.iter().flat_map(|m: &Manifest| m.join_enums.iter()) {
            self.register_join_enum(decl, &mut report);
        }

        for page in manifests.iter().flat_map(|m: &Manifest| m.pages.iter()) {
            self.register_page(page, &mut report)?;
        }

        Ok(report)
    }

    fn load_manifests(&self, report: &mut ScanReport) -> Vec<Manifest> {
        let mut manifests: Vec<Manifest> = Vec::with_capacity(self.sources.len());

        for source in self.sources.iter() {
            let crate_name: &str = source.crate_name();

            if !self.config.admits(crate_name) {
                debug!(source = crate_name, "Source filtered out");
                report.sources_filtered += 1;
                continue;
            }

            match source.load() {
                Ok(manifest) => {
                    debug!(
                        source = crate_name,
                        join_enums = manifest.join_enums.len(),
                        pages = manifest.pages.len(),
                        "Source loaded"
                    );
                    report.sources_loaded += 1;
                    manifests.push(manifest);
                }
                Err(e) => report.warn(ScanWarning::SourceFailed {
                    source_name: CompactString::new(crate_name),
                    reason: format!("{e:#}"),
                }),
            }
        }

        manifests
    }

    fn register_join_enum(&self, decl: &JoinEnumDecl, report: &mut ScanReport) {
        let type_name: &'static str = decl.join_type.name();

        let kind: SignalKind = match decl.kinds.as_slice() {
            [kind] => *kind,
            [] => return report.warn(ScanWarning::MissingKindTag { type_name }),
            kinds => {
                return report.warn(ScanWarning::AmbiguousKindTag {
                    type_name,
                    kinds: kinds.to_vec(),
                });
            }
        };

        match self.kinds.register(decl.join_type, kind) {
            Ok(()) => report.join_enums += 1,
            Err(FrameworkError::DuplicateRegistration { .. }) => {
                report.warn(ScanWarning::DuplicateJoinEnum { type_name });
            }
            Err(e) => report.warn(ScanWarning::InvalidJoinEnum {
                type_name,
                reason: e.to_string(),
            }),
        }
    }

    fn register_page(&self, page: &PageManifest, report: &mut ScanReport) -> Result<()> {
        if page.is_abstract {
            debug!(page = page.type_name, "Abstract page skipped");
            report.abstract_pages += 1;
            return Ok(());
        }

        self.pages
            .register_page(page.page_id, page.type_name, page.factory.clone())?;
        report.pages += 1;

        for binding in &page.bindings {
            self.register_binding(page, binding, report)?;
        }

        Ok(())
    }

    fn register_binding(
        &self,
        page: &PageManifest,
        binding: &ErasedBinding,
        report: &mut ScanReport,
    ) -> Result<()> {
        let kind: SignalKind = match self.kinds.get(binding.join.join_type) {
            Ok(kind) => kind,
            Err(FrameworkError::UnknownType { type_name }) => {
                return Err(FrameworkError::UnregisteredJoinSource {
                    type_name,
                    join: binding.join.name,
                    page_id: page.page_id,
                    page_type: page.type_name,
                });
            }
            Err(e) => return Err(e),
        };

        let join: u32 = binding.join.number;

        if !self.reverse.try_register(join, kind, page.page_id) {
            report.warn(ScanWarning::JoinAlreadyOwned {
                page_id: page.page_id,
                method: binding.method,
                join,
                kind,
                owner: self.reverse.lookup(join, kind),
            });
            return Ok(());
        }

        let invoke: Arc<HandlerFn> = binding.invoker();
        let handler = BoundHandler::new(
            page.page_id,
            binding.method,
            move |target: &mut dyn PageLogic, event: &SignalEvent| invoke(target, event),
        );

        if self.tables.try_add(kind, join, handler) {
            report.bindings += 1;
        } else {
            report.warn(ScanWarning::HandlerAlreadyBound {
                page_id: page.page_id,
                method: binding.method,
                join,
                kind,
            });
        }

        Ok(())
    }
}

impl Injectable for AutoRegistrationScanner {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(
            vec![
                Dependency::of::<SignalKindRegistry>(),
                Dependency::of::<PageRegistry>(),
                Dependency::of::<ReverseJoinRegistry>(),
                Dependency::of::<DispatchTables>(),
                Dependency::of::<ScanConfig>(),
                Dependency::of::<ManifestSources>(),
            ],
            |args: &mut ResolvedArgs| {
                let scanner = Self::new(
                    args.take::<SignalKindRegistry>()?,
                    args.take::<PageRegistry>()?,
                    args.take::<ReverseJoinRegistry>()?,
                    args.take::<DispatchTables>()?,
                );
                let config: Arc<ScanConfig> = args.take::<ScanConfig>()?;
                let sources: Arc<ManifestSources> = args.take::<ManifestSources>()?;

                Ok(scanner
                    .with_config(config.as_ref().clone())
                    .with_sources(sources.as_ref().clone()))
            },
        )]
    }
}

impl fmt::Debug for AutoRegistrationScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoRegistrationScanner")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("sources", &self.sources)
            .finish()
    }
}
