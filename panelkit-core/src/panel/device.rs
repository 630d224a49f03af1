//! Panel capability consumed by the framework.
//!
//! The physical transport lives behind this trait. Page logic holds a
//! [`PanelRef`] to drive feedback joins on its own panel.

use std::fmt::Debug;
use std::sync::Arc;

/// Panel identifier within the control system (IPID). `0` is the sentinel.
pub type PanelId = u32;

pub const SENTINEL_PANEL_ID: PanelId = 0;

pub type PanelRef = Arc<dyn Panel>;

pub trait Panel: Send + Sync + Debug {
    fn id(&self) -> PanelId;

    fn name(&self) -> &str;

    fn is_online(&self) -> bool;

    fn set_digital(&self, join: u32, value: bool);

    fn set_analog(&self, join: u32, value: u16);

    fn set_serial(&self, join: u32, value: &str);

    /// Register the device with the underlying control system. Called on
    /// panel registration when auto-registration is enabled.
    fn register_device(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
