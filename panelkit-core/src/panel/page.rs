//! Page logic capability.
//!
//! A page is one screen's worth of UI logic. The framework builds one
//! instance of every page per registered panel, so page fields are per-panel
//! state while handler code and join bindings are shared.

use std::any::Any;
use std::sync::Arc;

use crate::panel::device::PanelRef;
use crate::scanner::manifest::JoinBinding;

pub type PageId = u16;

/// Builds a page instance for the owning panel.
pub type PageFactory = Arc<dyn Fn(PanelRef) -> Box<dyn PageLogic> + Send + Sync>;

/// Object-safe lifecycle surface of a page instance.
pub trait PageLogic: Any + Send {
    /// Called once, right after every page of the panel has been built.
    fn initialize(&mut self) {}

    /// Reset the panel UI state owned by this page.
    fn set_defaults(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A page type the scanner can register.
pub trait Page: PageLogic + Sized {
    const PAGE_ID: PageId;

    fn new(panel: PanelRef) -> Self;

    /// Join bindings declared by this page's handler methods.
    fn bindings() -> Vec<JoinBinding<Self>>;
}

impl dyn PageLogic {
    #[must_use]
    pub fn downcast_ref<P: PageLogic>(&self) -> Option<&P> {
        self.as_any().downcast_ref::<P>()
    }

    #[must_use]
    pub fn downcast_mut<P: PageLogic>(&mut self) -> Option<&mut P> {
        self.as_any_mut().downcast_mut::<P>()
    }
}

/// Implements the `Any` plumbing of [`PageLogic`] inside an `impl` block.
#[macro_export]
macro_rules! page_any {
    () => {
        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
}
