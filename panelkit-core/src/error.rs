//! src/error.rs
//! ============================================================================
//! # `FrameworkError`: Unified Error Type for the Panel Framework
//!
//! Startup-time configuration failures (container wiring, page/panel
//! registration, scanning) are reported through [`FrameworkError`]. Runtime
//! faults raised at the handler invocation boundary are reported through
//! [`HandlerError`] and are never propagated past the router.

use std::{io, path::PathBuf};
use thiserror::Error;

use crate::registry::signal_kind::SignalKind;

pub type Result<T> = std::result::Result<T, FrameworkError>;

/// Unified error type for all framework operations.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// No descriptor registered for a required contract.
    #[error("Missing dependency: no service registered for `{type_name}`{}", required_by_suffix(.required_by))]
    MissingDependency {
        type_name: &'static str,
        required_by: Option<&'static str>,
    },

    /// Resolution re-entered a contract that is already being constructed.
    #[error("Cyclic dependency detected: {chain}")]
    CyclicDependency { chain: String },

    /// A constructor or factory ran and reported failure.
    #[error("Failed to construct `{type_name}`: {reason}")]
    ConstructionFailed {
        type_name: &'static str,
        reason: String,
    },

    /// Join enum type registered twice.
    #[error("Type `{type_name}` is already registered")]
    DuplicateRegistration { type_name: &'static str },

    /// Join enum type was never registered.
    #[error("Type `{type_name}` is not registered")]
    UnknownType { type_name: &'static str },

    /// Argument rejected before touching any registry.
    #[error("Invalid argument: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    /// Page id already owned by another page type.
    #[error("Page id {0} is already registered")]
    DuplicatePageId(u16),

    /// Panel id is the zero sentinel.
    #[error("Invalid panel: IPID {0:#04x} is not a valid panel id")]
    InvalidPanel(u32),

    /// Panel registered twice.
    #[error("Panel with IPID {0:#04x} is already registered")]
    DuplicatePanel(u32),

    /// Panel lookup for an id that has no logic group.
    #[error("No logic group registered for panel IPID {0:#04x}")]
    PanelNotFound(u32),

    /// A join binding references an enum type that was never tagged with a
    /// signal kind.
    #[error(
        "Join `{join}` on page {page_id} (`{page_type}`) uses enum `{type_name}` which has no registered signal kind"
    )]
    UnregisteredJoinSource {
        type_name: &'static str,
        join: &'static str,
        page_id: u16,
        page_type: &'static str,
    },

    /// Scanner invoked outside its `Idle` state.
    #[error("Scanner cannot run: already {state}")]
    ScannerState { state: &'static str },

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// TOML config serialization error.
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Config file I/O error with path.
    #[error("Failed to access config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(String),
}

fn required_by_suffix(required_by: &Option<&'static str>) -> String {
    match required_by {
        Some(parent) => format!(" (required by `{parent}`)"),
        None => String::new(),
    }
}

impl FrameworkError {
    #[must_use]
    /// Attach extra context to an error.
    pub fn with_context<S: Into<String>>(self, ctx: S) -> Self {
        Self::Other(format!("{}: {}", ctx.into(), self))
    }

    /// Create a missing dependency error
    pub fn missing_dependency(type_name: &'static str, required_by: Option<&'static str>) -> Self {
        Self::MissingDependency {
            type_name,
            required_by,
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a construction failure error
    pub fn construction_failed<S: Into<String>>(type_name: &'static str, reason: S) -> Self {
        Self::ConstructionFailed {
            type_name,
            reason: reason.into(),
        }
    }

    /// Create a config I/O error
    pub fn config_io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error belongs to the fatal startup taxonomy.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingDependency { .. }
                | Self::CyclicDependency { .. }
                | Self::ConstructionFailed { .. }
                | Self::DuplicatePageId(_)
                | Self::InvalidPanel(_)
                | Self::DuplicatePanel(_)
                | Self::UnregisteredJoinSource { .. }
        )
    }
}

// Allow conversion from `anyhow::Error` as fallback.
impl From<anyhow::Error> for FrameworkError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e.to_string())
    }
}

/// Fault raised at the handler invocation boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler method returned an error.
    #[error("Handler `{method}` for {kind} join {join} failed: {source}")]
    Failed {
        method: &'static str,
        join: u32,
        kind: SignalKind,
        #[source]
        source: anyhow::Error,
    },

    /// Handler method panicked; the panic payload is captured as text.
    #[error("Handler `{method}` for {kind} join {join} panicked: {message}")]
    Panicked {
        method: &'static str,
        join: u32,
        kind: SignalKind,
        message: String,
    },

    /// Page instance handed to the handler is not the type it was bound for.
    #[error("Handler `{method}` expected page `{expected}`")]
    PageTypeMismatch {
        method: &'static str,
        expected: &'static str,
    },
}

/// Render a `catch_unwind` payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dependency_names_type() {
        let err = FrameworkError::missing_dependency("app::Clock", Some("app::Scheduler"));
        let msg = err.to_string();

        assert!(msg.contains("app::Clock"));
        assert!(msg.contains("required by `app::Scheduler`"));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_panel_ids_render_as_hex() {
        assert_eq!(
            FrameworkError::DuplicatePanel(0x03).to_string(),
            "Panel with IPID 0x03 is already registered"
        );
        assert!(!FrameworkError::PanelNotFound(0x10).is_configuration_error());
    }

    #[test]
    fn test_panic_message_extracts_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
