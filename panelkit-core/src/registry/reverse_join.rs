//! Reverse lookup: (join, kind) → owning page.
//!
//! A join number has at most one owning page per signal kind. Ownership
//! conflicts are reported through the return value so scanning can continue
//! past the conflicting binding.

use std::collections::HashMap;

use ahash::RandomState;
use parking_lot::RwLock;
use tracing::debug;

use crate::panel::page::PageId;
use crate::registry::signal_kind::SignalKind;

#[derive(Debug, Default)]
pub struct ReverseJoinRegistry {
    owners: RwLock<HashMap<(u32, SignalKind), PageId, RandomState>>,
}

impl ReverseJoinRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `(join, kind)` for `page_id`. Returns `false` and leaves the
    /// existing owner untouched when the pair is already owned.
    pub fn try_register(&self, join: u32, kind: SignalKind, page_id: PageId) -> bool {
        let mut owners = self.owners.write();

        if let Some(owner) = owners.get(&(join, kind)) {
            debug!(join, %kind, owner, rejected = page_id, "Join already owned");
            return false;
        }

        owners.insert((join, kind), page_id);
        true
    }

    #[must_use]
    pub fn lookup(&self, join: u32, kind: SignalKind) -> Option<PageId> {
        self.owners.read().get(&(join, kind)).copied()
    }

    /// Every join owned by `page_id`, sorted.
    #[must_use]
    pub fn joins_of(&self, page_id: PageId) -> Vec<(SignalKind, u32)> {
        let mut joins: Vec<(SignalKind, u32)> = self
            .owners
            .read()
            .iter()
            .filter(|(_, owner)| **owner == page_id)
            .map(|((join, kind), _)| (*kind, *join))
            .collect();
        joins.sort_unstable();
        joins
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.read().is_empty()
    }

    pub fn clear(&self) {
        self.owners.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_owner_is_rejected() {
        let registry = ReverseJoinRegistry::new();

        assert!(registry.try_register(1, SignalKind::Digital, 10));
        assert!(!registry.try_register(1, SignalKind::Digital, 20));
        assert_eq!(registry.lookup(1, SignalKind::Digital), Some(10));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_keyspaces_are_independent() {
        let registry = ReverseJoinRegistry::new();

        assert!(registry.try_register(5, SignalKind::Digital, 1));
        assert!(registry.try_register(5, SignalKind::Analog, 2));
        assert!(registry.try_register(5, SignalKind::Serial, 3));

        assert_eq!(registry.lookup(5, SignalKind::Analog), Some(2));
        assert_eq!(registry.lookup(6, SignalKind::Analog), None);
        assert_eq!(registry.joins_of(1), vec![(SignalKind::Digital, 5)]);
    }
}
