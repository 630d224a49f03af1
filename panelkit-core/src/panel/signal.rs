//! Inbound signal events delivered by a panel.

use std::fmt;

use compact_str::CompactString;

use crate::registry::signal_kind::SignalKind;

/// Value carried on a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalValue {
    Digital(bool),

    Analog(u16),

    Serial(CompactString),
}

impl SignalValue {
    #[must_use]
    pub const fn kind(&self) -> SignalKind {
        match self {
            Self::Digital(_) => SignalKind::Digital,
            Self::Analog(_) => SignalKind::Analog,
            Self::Serial(_) => SignalKind::Serial,
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digital(v) => write!(f, "{v}"),
            Self::Analog(v) => write!(f, "{v}"),
            Self::Serial(v) => write!(f, "{v:?}"),
        }
    }
}

/// A signal-changed notification for one join.
///
/// `kind` is the keyspace the join number belongs to. An event whose value
/// does not match its kind is malformed and is dropped by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    pub join: u32,
    pub kind: SignalKind,
    pub value: SignalValue,
}

impl SignalEvent {
    #[must_use]
    pub const fn digital(join: u32, value: bool) -> Self {
        Self {
            join,
            kind: SignalKind::Digital,
            value: SignalValue::Digital(value),
        }
    }

    #[must_use]
    pub const fn analog(join: u32, value: u16) -> Self {
        Self {
            join,
            kind: SignalKind::Analog,
            value: SignalValue::Analog(value),
        }
    }

    #[must_use]
    pub fn serial(join: u32, value: impl Into<CompactString>) -> Self {
        Self {
            join,
            kind: SignalKind::Serial,
            value: SignalValue::Serial(value.into()),
        }
    }

    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.value.kind() == self.kind
    }

    /// Digital state, `false` for any other kind.
    #[must_use]
    pub const fn bool_value(&self) -> bool {
        matches!(self.value, SignalValue::Digital(true))
    }

    /// Analog level, `0` for any other kind.
    #[must_use]
    pub const fn ushort_value(&self) -> u16 {
        match self.value {
            SignalValue::Analog(v) => v,
            _ => 0,
        }
    }

    /// Serial text, empty for any other kind.
    #[must_use]
    pub fn string_value(&self) -> &str {
        match &self.value {
            SignalValue::Serial(v) => v.as_str(),
            _ => "",
        }
    }
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} join {} = {}", self.kind, self.join, self.value)
    }
}
