//! `src/router/join_router.rs`
//! ============================================================================
//! # JoinRouter: hardware signal → page handler
//!
//! Resolution order for one event:
//! 1. reject the sentinel panel and malformed events
//! 2. panel → logic group ([`PanelLogicPool`])
//! 3. (join, kind) → owning page id ([`ReverseJoinRegistry`])
//! 4. page id → page instance (logic group)
//! 5. (kind, join) → handler ([`DispatchTables`])
//! 6. invoke, containing any failure
//!
//! Every miss is a logged no-op. Routing never returns an error and never
//! unwinds into the caller's event loop.

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use enum_map::{Enum, EnumMap};
use tracing::{debug, trace, warn};

use crate::container::service_container::{Constructor, Injectable};
use crate::error::{HandlerError, panic_message};
use crate::panel::device::{PanelId, SENTINEL_PANEL_ID};
use crate::panel::logic_pool::{LogicGroup, PageSlot, PanelLogicPool};
use crate::panel::page::{PageId, PageLogic};
use crate::panel::signal::SignalEvent;
use crate::registry::dispatch_table::{BoundHandler, DispatchTables};
use crate::registry::reverse_join::ReverseJoinRegistry;

/// What a single [`JoinRouter::route`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum RouteOutcome {
    /// Handler ran to completion.
    Dispatched,

    /// Sentinel panel id or malformed event.
    Rejected,

    /// Panel has no logic group.
    PanelNotRegistered,

    /// No page owns the join.
    Unmapped,

    /// Owning page has no instance on this panel.
    PageMissing,

    /// Join is owned but has no handler.
    NoHandler,

    /// Handler returned an error or panicked.
    HandlerFailed,
}

impl RouteOutcome {
    pub const ALL: [Self; 7] = [
        Self::Dispatched,
        Self::Rejected,
        Self::PanelNotRegistered,
        Self::Unmapped,
        Self::PageMissing,
        Self::NoHandler,
        Self::HandlerFailed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Rejected => "rejected",
            Self::PanelNotRegistered => "panel_not_registered",
            Self::Unmapped => "unmapped",
            Self::PageMissing => "page_missing",
            Self::NoHandler => "no_handler",
            Self::HandlerFailed => "handler_failed",
        }
    }

    /// Whether a handler was invoked.
    #[must_use]
    pub const fn invoked_handler(self) -> bool {
        matches!(self, Self::Dispatched | Self::HandlerFailed)
    }
}

impl fmt::Display for RouteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

thread_local! {
    static IN_HANDLER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is running a page handler under
/// [`JoinRouter::route`]. Panics raised there are contained by the router,
/// so panic hooks can use this to stay quiet.
#[must_use]
pub fn in_handler() -> bool {
    IN_HANDLER.with(Cell::get)
}

pub struct JoinRouter {
    pool: Arc<PanelLogicPool>,
    reverse: Arc<ReverseJoinRegistry>,
    tables: Arc<DispatchTables>,
    outcomes: EnumMap<RouteOutcome, AtomicU64>,
}

impl JoinRouter {
    #[must_use]
    pub fn new(
        pool: Arc<PanelLogicPool>,
        reverse: Arc<ReverseJoinRegistry>,
        tables: Arc<DispatchTables>,
    ) -> Self {
        Self {
            pool,
            reverse,
            tables,
            outcomes: EnumMap::default(),
        }
    }

    /// Route one inbound event from `panel_id`.
    pub fn route(&self, panel_id: PanelId, event: &SignalEvent) -> RouteOutcome {
        let outcome: RouteOutcome = self.resolve_and_invoke(panel_id, event);
        self.outcomes[outcome].fetch_add(1, Ordering::Relaxed);
        outcome
    }

    fn resolve_and_invoke(&self, panel_id: PanelId, event: &SignalEvent) -> RouteOutcome {
        if panel_id == SENTINEL_PANEL_ID {
            debug!(%event, "Signal from sentinel panel ignored");
            return RouteOutcome::Rejected;
        }

        if !event.is_well_formed() {
            debug!(panel = panel_id, %event, "Malformed signal ignored");
            return RouteOutcome::Rejected;
        }

        let group: Arc<LogicGroup> = match self.pool.get_group(panel_id) {
            Ok(group) => group,
            Err(_) => {
                debug!(panel = panel_id, %event, "Signal from unregistered panel ignored");
                return RouteOutcome::PanelNotRegistered;
            }
        };

        let Some(page_id) = self.reverse.lookup(event.join, event.kind) else {
            trace!(panel = panel_id, %event, "Join not mapped to any page");
            return RouteOutcome::Unmapped;
        };

        let Some(slot) = group.page(page_id) else {
            debug!(panel = panel_id, page_id, %event, "Owning page has no instance on panel");
            return RouteOutcome::PageMissing;
        };

        let Some(handler) = self.tables.get(event.kind, event.join) else {
            debug!(panel = panel_id, page_id, %event, "No handler bound to join");
            return RouteOutcome::NoHandler;
        };

        Self::invoke(panel_id, page_id, &slot, &handler, event)
    }

    fn invoke(
        panel_id: PanelId,
        page_id: PageId,
        slot: &PageSlot,
        handler: &BoundHandler,
        event: &SignalEvent,
    ) -> RouteOutcome {
        let outer: bool = IN_HANDLER.with(|flag: &Cell<bool>| flag.replace(true));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut guard = slot.lock();
            let page: &mut dyn PageLogic = &mut **guard;
            handler.invoke(page, event)
        }));
        IN_HANDLER.with(|flag: &Cell<bool>| flag.set(outer));

        match outcome {
            Ok(Ok(())) => {
                trace!(panel = panel_id, page_id, method = handler.method(), %event, "Dispatched");
                RouteOutcome::Dispatched
            }
            Ok(Err(e)) => {
                debug!(panel = panel_id, page_id, "Handler failure contained: {e}");
                RouteOutcome::HandlerFailed
            }
            Err(payload) => {
                let e = HandlerError::Panicked {
                    method: handler.method(),
                    join: event.join,
                    kind: event.kind,
                    message: panic_message(payload.as_ref()),
                };
                warn!(panel = panel_id, page_id, "{e}");
                RouteOutcome::HandlerFailed
            }
        }
    }

    /// Number of `route` calls that ended with `outcome`.
    #[must_use]
    pub fn count(&self, outcome: RouteOutcome) -> u64 {
        self.outcomes[outcome].load(Ordering::Relaxed)
    }

    /// Per-outcome route counts.
    #[must_use]
    pub fn stats(&self) -> Vec<(RouteOutcome, u64)> {
        RouteOutcome::ALL
            .iter()
            .map(|outcome: &RouteOutcome| (*outcome, self.count(*outcome)))
            .collect()
    }

    pub fn reset_stats(&self) {
        for counter in self.outcomes.values() {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Injectable for JoinRouter {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::with3(
            |pool: Arc<PanelLogicPool>,
             reverse: Arc<ReverseJoinRegistry>,
             tables: Arc<DispatchTables>| Self::new(pool, reverse, tables),
        )]
    }
}

impl fmt::Debug for JoinRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinRouter")
            .field("panels", &self.pool.len())
            .field("mapped_joins", &self.reverse.len())
            .field("handlers", &self.tables.len())
            .field("stats", &self.stats())
            .finish()
    }
}
