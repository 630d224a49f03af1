//! DispatchTables: per-kind join → handler tables
//!
//! One table per signal kind. Handlers are shared by every panel; the page
//! instance they act on is supplied at invocation time.
//! - First binding for a join wins, later ones are rejected
//! - Invocation and failure counts are tracked per handler for diagnostics

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use enum_map::EnumMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::HandlerError;
use crate::panel::page::{PageId, PageLogic};
use crate::panel::signal::SignalEvent;
use crate::registry::signal_kind::SignalKind;

/// Type-erased handler: runs one page method against a page instance.
pub type HandlerFn =
    dyn Fn(&mut dyn PageLogic, &SignalEvent) -> Result<(), HandlerError> + Send + Sync;

/// Handler bound to a join, with its registration metadata.
#[derive(Clone)]
pub struct BoundHandler {
    inner: Arc<HandlerEntry>,
}

struct HandlerEntry {
    page_id: PageId,
    method: &'static str,
    invoke: Box<HandlerFn>,
    invocations: AtomicU64,
    failures: AtomicU64,
}

impl BoundHandler {
    pub fn new<F>(page_id: PageId, method: &'static str, invoke: F) -> Self
    where
        F: Fn(&mut dyn PageLogic, &SignalEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(HandlerEntry {
                page_id,
                method,
                invoke: Box::new(invoke),
                invocations: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn page_id(&self) -> PageId {
        self.inner.page_id
    }

    #[must_use]
    pub fn method(&self) -> &'static str {
        self.inner.method
    }

    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.inner.invocations.load(Ordering::Relaxed)
    }

    /// Invocations that returned an error.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    pub fn invoke(&self, page: &mut dyn PageLogic, event: &SignalEvent) -> Result<(), HandlerError> {
        self.inner.invocations.fetch_add(1, Ordering::Relaxed);
        let result: Result<(), HandlerError> = (self.inner.invoke)(page, event);
        if result.is_err() {
            self.inner.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler")
            .field("page_id", &self.inner.page_id)
            .field("method", &self.inner.method)
            .field("invocations", &self.invocations())
            .field("failures", &self.failures())
            .finish()
    }
}

/// Handler statistics for one join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerStats {
    pub kind: SignalKind,
    pub join: u32,
    pub page_id: PageId,
    pub method: &'static str,
    pub invocations: u64,
    pub failures: u64,
}

/// Join → handler table for a single signal kind.
pub struct DispatchTable {
    kind: SignalKind,
    handlers: RwLock<HashMap<u32, BoundHandler, RandomState>>,
}

impl DispatchTable {
    #[must_use]
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            handlers: RwLock::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Bind `handler` to `join`. Returns `false` if the join already has one.
    pub fn try_add(&self, join: u32, handler: BoundHandler) -> bool {
        let mut handlers = self.handlers.write();

        if let Some(existing) = handlers.get(&join) {
            debug!(
                kind = %self.kind,
                join,
                existing = existing.method(),
                rejected = handler.method(),
                "Join already has a handler"
            );
            return false;
        }

        handlers.insert(join, handler);
        true
    }

    #[must_use]
    pub fn get(&self, join: u32) -> Option<BoundHandler> {
        self.handlers.read().get(&join).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    fn stats(&self) -> Vec<HandlerStats> {
        self.handlers
            .read()
            .iter()
            .map(|(join, handler)| HandlerStats {
                kind: self.kind,
                join: *join,
                page_id: handler.page_id(),
                method: handler.method(),
                invocations: handler.invocations(),
                failures: handler.failures(),
            })
            .collect()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("kind", &self.kind)
            .field("handler_count", &self.len())
            .finish()
    }
}

/// The three per-kind tables.
#[derive(Debug)]
pub struct DispatchTables {
    tables: EnumMap<SignalKind, DispatchTable>,
}

impl DispatchTables {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: EnumMap::from_fn(DispatchTable::new),
        }
    }

    #[must_use]
    pub fn table(&self, kind: SignalKind) -> &DispatchTable {
        &self.tables[kind]
    }

    pub fn try_add(&self, kind: SignalKind, join: u32, handler: BoundHandler) -> bool {
        self.tables[kind].try_add(join, handler)
    }

    #[must_use]
    pub fn get(&self, kind: SignalKind, join: u32) -> Option<BoundHandler> {
        self.tables[kind].get(join)
    }

    /// Total handlers across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.values().map(DispatchTable::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(DispatchTable::is_empty)
    }

    pub fn clear(&self) {
        for table in self.tables.values() {
            table.clear();
        }
        info!("Dispatch tables cleared");
    }

    /// Per-handler statistics, sorted by kind then join.
    #[must_use]
    pub fn handler_stats(&self) -> Vec<HandlerStats> {
        let mut stats: Vec<HandlerStats> = self
            .tables
            .values()
            .flat_map(DispatchTable::stats)
            .collect();
        stats.sort_by_key(|s: &HandlerStats| (s.kind, s.join));
        stats
    }
}

impl Default for DispatchTables {
    fn default() -> Self {
        Self::new()
    }
}
