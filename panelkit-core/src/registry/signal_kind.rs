//! `src/registry/signal_kind.rs`
//! ============================================================================
//! # Signal kinds and the join-enum → kind registry
//!
//! Every join number lives in exactly one of three keyspaces. Join numbers
//! are declared through enums implementing [`JoinEnum`]; the registry maps each
//! such enum type to the keyspace its constants belong to.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use ahash::RandomState;
use enum_map::Enum;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FrameworkError, Result};

/// Data type carried by a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Digital,

    Analog,

    Serial,
}

impl SignalKind {
    pub const ALL: [Self; 3] = [Self::Digital, Self::Analog, Self::Serial];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Digital => "digital",
            Self::Analog => "analog",
            Self::Serial => "serial",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An enum whose constants name join numbers.
pub trait JoinEnum: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Numeric join this constant stands for.
    fn join_number(self) -> u32;

    /// Every constant of the enum.
    fn variants() -> &'static [Self];

    /// Constant name, used in diagnostics.
    fn name(self) -> &'static str;
}

/// Runtime key for a join source type.
#[derive(Debug, Clone, Copy)]
pub struct JoinType {
    id: TypeId,
    name: &'static str,
    variant_count: usize,
    is_enum: bool,
}

impl JoinType {
    /// Key for a [`JoinEnum`].
    #[must_use]
    pub fn of<E: JoinEnum>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
            variant_count: E::variants().len(),
            is_enum: true,
        }
    }

    /// Key for an arbitrary type that is not a join enum. Every registry
    /// operation rejects it.
    #[must_use]
    pub fn opaque<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            variant_count: 0,
            is_enum: false,
        }
    }

    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn variant_count(&self) -> usize {
        self.variant_count
    }

    fn validate(&self) -> Result<()> {
        if !self.is_enum {
            return Err(FrameworkError::invalid_argument(
                self.name,
                "type is not a join enum",
            ));
        }

        if self.variant_count == 0 {
            return Err(FrameworkError::invalid_argument(
                self.name,
                "join enum declares no constants",
            ));
        }

        Ok(())
    }
}

impl PartialEq for JoinType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JoinType {}

impl Hash for JoinType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Maps join enum types to their signal kind.
#[derive(Debug, Default)]
pub struct SignalKindRegistry {
    kinds: RwLock<HashMap<TypeId, (JoinType, SignalKind), RandomState>>,
}

impl SignalKindRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, join_type: JoinType, kind: SignalKind) -> Result<()> {
        join_type.validate()?;

        let mut kinds = self.kinds.write();
        if kinds.contains_key(&join_type.type_id()) {
            return Err(FrameworkError::DuplicateRegistration {
                type_name: join_type.name(),
            });
        }

        kinds.insert(join_type.type_id(), (join_type, kind));
        debug!(join_type = join_type.name(), %kind, "Registered join enum");

        Ok(())
    }

    pub fn get(&self, join_type: JoinType) -> Result<SignalKind> {
        join_type.validate()?;

        self.kinds
            .read()
            .get(&join_type.type_id())
            .map(|(_, kind)| *kind)
            .ok_or(FrameworkError::UnknownType {
                type_name: join_type.name(),
            })
    }

    pub fn is_registered(&self, join_type: JoinType) -> Result<bool> {
        join_type.validate()?;

        Ok(self.kinds.read().contains_key(&join_type.type_id()))
    }

    /// Registered enum types with their kinds, ordered by type name.
    #[must_use]
    pub fn entries(&self) -> Vec<(JoinType, SignalKind)> {
        let mut entries: Vec<(JoinType, SignalKind)> =
            self.kinds.read().values().copied().collect();
        entries.sort_by_key(|(join_type, _)| join_type.name());
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.read().is_empty()
    }

    pub fn clear(&self) {
        self.kinds.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join_enum;

    join_enum! {
        enum Buttons: digital {
            Power = 1,
            Mute = 2,
        }
    }

    join_enum! {
        enum Levels: analog {
            Volume = 1,
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Empty {}

    impl JoinEnum for Empty {
        fn join_number(self) -> u32 {
            match self {}
        }

        fn variants() -> &'static [Self] {
            &[]
        }

        fn name(self) -> &'static str {
            match self {}
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = SignalKindRegistry::new();
        registry
            .register(JoinType::of::<Buttons>(), SignalKind::Digital)
            .unwrap();

        assert_eq!(
            registry.get(JoinType::of::<Buttons>()).unwrap(),
            SignalKind::Digital
        );
        assert!(registry.is_registered(JoinType::of::<Buttons>()).unwrap());
        assert!(!registry.is_registered(JoinType::of::<Levels>()).unwrap());
    }

    #[test]
    fn test_duplicate_registration_keeps_original_kind() {
        let registry = SignalKindRegistry::new();
        registry
            .register(JoinType::of::<Buttons>(), SignalKind::Digital)
            .unwrap();

        let err = registry
            .register(JoinType::of::<Buttons>(), SignalKind::Serial)
            .unwrap_err();

        assert!(matches!(err, FrameworkError::DuplicateRegistration { .. }));
        assert_eq!(
            registry.get(JoinType::of::<Buttons>()).unwrap(),
            SignalKind::Digital
        );
    }

    #[test]
    fn test_unknown_type() {
        let registry = SignalKindRegistry::new();
        let err = registry.get(JoinType::of::<Levels>()).unwrap_err();

        assert!(matches!(err, FrameworkError::UnknownType { type_name } if type_name.ends_with("Levels")));
    }

    #[test]
    fn test_non_enum_types_are_rejected_everywhere() {
        let registry = SignalKindRegistry::new();
        let opaque = JoinType::opaque::<String>();

        assert!(matches!(
            registry.register(opaque, SignalKind::Serial),
            Err(FrameworkError::InvalidArgument { .. })
        ));
        assert!(matches!(
            registry.get(opaque),
            Err(FrameworkError::InvalidArgument { .. })
        ));
        assert!(matches!(
            registry.is_registered(opaque),
            Err(FrameworkError::InvalidArgument { .. })
        ));
        assert!(matches!(
            registry.register(JoinType::of::<Empty>(), SignalKind::Digital),
            Err(FrameworkError::InvalidArgument { .. })
        ));
        assert!(registry.is_empty());
    }
}
