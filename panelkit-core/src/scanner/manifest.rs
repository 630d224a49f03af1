//! Declarative page manifests.
//!
//! A page type declares its id, its factory and its join bindings; join enums
//! declare the signal kind of their constants. Declarations reach the scanner
//! through [`ManifestSource`]s:
//! - [`InventoryModule`]: link-time `inventory` submissions made by
//!   [`join_enum!`](crate::join_enum) and [`register_page!`](crate::register_page),
//!   grouped by the crate that submitted them
//! - [`ManifestBuilder`]: explicit registration, one call per type

use std::any::type_name;
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use compact_str::CompactString;
use smallvec::SmallVec;
use tracing::warn;

use crate::error::{HandlerError, panic_message};
use crate::panel::device::PanelRef;
use crate::panel::page::{Page, PageFactory, PageId, PageLogic};
use crate::panel::signal::SignalEvent;
use crate::registry::dispatch_table::HandlerFn;
use crate::registry::signal_kind::{JoinEnum, JoinType, SignalKind};

/// Handler method signature on a page type.
pub type PageMethod<P> = fn(&mut P, &SignalEvent) -> anyhow::Result<()>;

/// One join enum constant, erased.
#[derive(Debug, Clone, Copy)]
pub struct JoinRef {
    pub join_type: JoinType,
    pub number: u32,
    pub name: &'static str,
}

impl JoinRef {
    pub fn of<E: JoinEnum>(join: E) -> Self {
        Self {
            join_type: JoinType::of::<E>(),
            number: join.join_number(),
            name: join.name(),
        }
    }
}

impl fmt::Display for JoinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.number)
    }
}

/// A page method bound to a join constant.
pub struct JoinBinding<P> {
    pub join: JoinRef,
    pub method: &'static str,
    pub handler: PageMethod<P>,
}

impl<P: PageLogic> JoinBinding<P> {
    pub fn new<E: JoinEnum>(join: E, method: &'static str, handler: PageMethod<P>) -> Self {
        Self {
            join: JoinRef::of(join),
            method,
            handler,
        }
    }

    /// Bind one method to several joins.
    pub fn many<E: JoinEnum>(
        joins: &[E],
        method: &'static str,
        handler: PageMethod<P>,
    ) -> Vec<Self> {
        joins
            .iter()
            .map(|join: &E| Self::new(*join, method, handler))
            .collect()
    }
}

/// Type-erased join binding, ready to become a dispatch table entry.
#[derive(Clone)]
pub struct ErasedBinding {
    pub join: JoinRef,
    pub method: &'static str,
    invoke: Arc<HandlerFn>,
}

impl ErasedBinding {
    /// Wrap a page method. The resulting delegate downcasts the page, runs
    /// the method and converts an error return or a panic into a logged
    /// [`HandlerError`].
    fn erase<P: PageLogic>(binding: JoinBinding<P>) -> Self {
        let JoinBinding {
            join,
            method,
            handler,
        } = binding;

        let invoke = move |page: &mut dyn PageLogic, event: &SignalEvent| -> Result<(), HandlerError> {
            let Some(page) = page.downcast_mut::<P>() else {
                return Err(HandlerError::PageTypeMismatch {
                    method,
                    expected: type_name::<P>(),
                });
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(page, event)));

            let error: HandlerError = match outcome {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(source)) => HandlerError::Failed {
                    method,
                    join: event.join,
                    kind: event.kind,
                    source,
                },
                Err(payload) => HandlerError::Panicked {
                    method,
                    join: event.join,
                    kind: event.kind,
                    message: panic_message(payload.as_ref()),
                },
            };

            warn!(page = type_name::<P>(), join = %join, "{error:#}");
            Err(error)
        };

        Self {
            join,
            method,
            invoke: Arc::new(invoke),
        }
    }

    #[must_use]
    pub fn invoker(&self) -> Arc<HandlerFn> {
        self.invoke.clone()
    }
}

impl fmt::Debug for ErasedBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedBinding")
            .field("join", &self.join)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Everything the scanner needs to know about one page type.
#[derive(Clone)]
pub struct PageManifest {
    pub page_id: PageId,
    pub type_name: &'static str,
    pub is_abstract: bool,
    pub factory: PageFactory,
    pub bindings: Vec<ErasedBinding>,
}

impl PageManifest {
    pub fn of<P: Page>() -> Self {
        let factory: PageFactory =
            Arc::new(|panel: PanelRef| Box::new(P::new(panel)) as Box<dyn PageLogic>);

        Self {
            page_id: P::PAGE_ID,
            type_name: type_name::<P>(),
            is_abstract: false,
            factory,
            bindings: P::bindings().into_iter().map(ErasedBinding::erase).collect(),
        }
    }

    /// Manifest of a base page that is never instantiated on its own.
    pub fn abstract_of<P: Page>() -> Self {
        Self {
            is_abstract: true,
            ..Self::of::<P>()
        }
    }
}

impl fmt::Debug for PageManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageManifest")
            .field("page_id", &self.page_id)
            .field("type_name", &self.type_name)
            .field("is_abstract", &self.is_abstract)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

/// A join enum type together with its signal-kind tags.
///
/// Exactly one tag is required for the scanner to register the type.
#[derive(Debug, Clone)]
pub struct JoinEnumDecl {
    pub join_type: JoinType,
    pub kinds: SmallVec<[SignalKind; 1]>,
}

/// All declarations contributed by one crate.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub join_enums: Vec<JoinEnumDecl>,
    pub pages: Vec<PageManifest>,
}

/// A unit of code that may contribute declarations.
pub trait ManifestSource: Send + Sync {
    /// Name of the crate the declarations come from.
    fn crate_name(&self) -> &str;

    fn load(&self) -> anyhow::Result<Manifest>;
}

/// `inventory` entry for a join enum.
pub struct JoinEnumReg {
    pub join_type: fn() -> JoinType,
    pub kinds: &'static [SignalKind],
    pub crate_name: &'static str,
}

inventory::collect!(JoinEnumReg);

/// `inventory` entry for a page type.
pub struct PageReg {
    pub build: fn() -> PageManifest,
    pub is_abstract: bool,
    pub crate_name: &'static str,
}

inventory::collect!(PageReg);

/// Declarations submitted to `inventory` by a single crate.
#[derive(Debug, Clone)]
pub struct InventoryModule {
    crate_name: CompactString,
}

impl InventoryModule {
    /// Every crate linked into this binary that submitted declarations,
    /// sorted by name.
    #[must_use]
    pub fn discover() -> Vec<Self> {
        let crates: BTreeSet<&'static str> = inventory::iter::<JoinEnumReg>
            .into_iter()
            .map(|reg: &JoinEnumReg| reg.crate_name)
            .chain(
                inventory::iter::<PageReg>
                    .into_iter()
                    .map(|reg: &PageReg| reg.crate_name),
            )
            .collect();

        crates
            .into_iter()
            .map(|crate_name| Self {
                crate_name: CompactString::new(crate_name),
            })
            .collect()
    }
}

impl ManifestSource for InventoryModule {
    fn crate_name(&self) -> &str {
        &self.crate_name
    }

    fn load(&self) -> anyhow::Result<Manifest> {
        let join_enums: Vec<JoinEnumDecl> = inventory::iter::<JoinEnumReg>
            .into_iter()
            .filter(|reg: &&JoinEnumReg| self.crate_name == reg.crate_name)
            .map(|reg: &JoinEnumReg| JoinEnumDecl {
                join_type: (reg.join_type)(),
                kinds: SmallVec::from_slice(reg.kinds),
            })
            .collect();

        let mut pages: Vec<PageManifest> = inventory::iter::<PageReg>
            .into_iter()
            .filter(|reg: &&PageReg| self.crate_name == reg.crate_name)
            .map(|reg: &PageReg| PageManifest {
                is_abstract: reg.is_abstract,
                ..(reg.build)()
            })
            .collect();

        // Link order is unspecified; join ownership goes to the lowest page id.
        pages.sort_by_key(|page: &PageManifest| page.page_id);

        Ok(Manifest { join_enums, pages })
    }
}

/// Explicit, builder-style declaration of join enums and pages.
#[derive(Clone)]
pub struct ManifestBuilder {
    crate_name: CompactString,
    join_enums: Vec<(fn() -> JoinType, SmallVec<[SignalKind; 1]>)>,
    pages: Vec<(fn() -> PageManifest, bool)>,
}

impl ManifestBuilder {
    #[must_use]
    pub fn new(crate_name: impl Into<CompactString>) -> Self {
        Self {
            crate_name: crate_name.into(),
            join_enums: Vec::new(),
            pages: Vec::new(),
        }
    }

    /// Declare a join enum with a single signal-kind tag.
    #[must_use]
    pub fn join_enum<E: JoinEnum>(self, kind: SignalKind) -> Self {
        self.join_enum_tagged::<E>(&[kind])
    }

    /// Declare a join enum with an arbitrary tag list.
    #[must_use]
    pub fn join_enum_tagged<E: JoinEnum>(mut self, kinds: &[SignalKind]) -> Self {
        self.join_enums
            .push((JoinType::of::<E>, SmallVec::from_slice(kinds)));
        self
    }

    #[must_use]
    pub fn page<P: Page>(mut self) -> Self {
        self.pages.push((PageManifest::of::<P>, false));
        self
    }

    #[must_use]
    pub fn abstract_page<P: Page>(mut self) -> Self {
        self.pages.push((PageManifest::abstract_of::<P>, true));
        self
    }

    #[must_use]
    pub fn build(&self) -> Manifest {
        Manifest {
            join_enums: self
                .join_enums
                .iter()
                .map(|(join_type, kinds)| JoinEnumDecl {
                    join_type: join_type(),
                    kinds: kinds.clone(),
                })
                .collect(),
            pages: self
                .pages
                .iter()
                .map(|(build, is_abstract)| PageManifest {
                    is_abstract: *is_abstract,
                    ..build()
                })
                .collect(),
        }
    }
}

impl ManifestSource for ManifestBuilder {
    fn crate_name(&self) -> &str {
        &self.crate_name
    }

    fn load(&self) -> anyhow::Result<Manifest> {
        Ok(self.build())
    }
}

impl fmt::Debug for ManifestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestBuilder")
            .field("crate_name", &self.crate_name)
            .field("join_enums", &self.join_enums.len())
            .field("pages", &self.pages.len())
            .finish()
    }
}

#[macro_export]
#[doc(hidden)]
macro_rules! __signal_kind {
    (digital) => {
        $crate::registry::signal_kind::SignalKind::Digital
    };
    (analog) => {
        $crate::registry::signal_kind::SignalKind::Analog
    };
    (serial) => {
        $crate::registry::signal_kind::SignalKind::Serial
    };
}

/// Declares a join enum tagged with one signal kind and submits it to
/// `inventory`.
///
/// ```rust,ignore
/// join_enum! {
///     pub enum LobbyButtons: digital {
///         Power = 1,
///         Mute = 2,
///     }
/// }
/// ```
#[macro_export]
macro_rules! join_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $kind:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $number:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $crate::registry::signal_kind::JoinEnum for $name {
            fn join_number(self) -> u32 {
                match self {
                    $( Self::$variant => $number ),+
                }
            }

            fn variants() -> &'static [Self] {
                &[ $( Self::$variant ),+ ]
            }

            fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => stringify!($variant) ),+
                }
            }
        }

        $crate::inventory::submit! {
            $crate::scanner::manifest::JoinEnumReg {
                join_type: $crate::registry::signal_kind::JoinType::of::<$name>,
                kinds: &[$crate::__signal_kind!($kind)],
                crate_name: env!("CARGO_PKG_NAME"),
            }
        }
    };
}

/// Submits a [`Page`] type to `inventory`.
#[macro_export]
macro_rules! register_page {
    (abstract $page:ty) => {
        $crate::inventory::submit! {
            $crate::scanner::manifest::PageReg {
                build: $crate::scanner::manifest::PageManifest::of::<$page>,
                is_abstract: true,
                crate_name: env!("CARGO_PKG_NAME"),
            }
        }
    };
    ($page:ty) => {
        $crate::inventory::submit! {
            $crate::scanner::manifest::PageReg {
                build: $crate::scanner::manifest::PageManifest::of::<$page>,
                is_abstract: false,
                crate_name: env!("CARGO_PKG_NAME"),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_any;
    use crate::panel::virtual_panel::VirtualPanel;
    use anyhow::bail;

    crate::join_enum! {
        enum Keys: digital {
            Enter = 10,
            Cancel = 11,
        }
    }

    struct Keypad {
        presses: u32,
    }

    impl Keypad {
        fn on_enter(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
            if event.bool_value() {
                self.presses += 1;
            }
            Ok(())
        }

        fn on_cancel(&mut self, _event: &SignalEvent) -> anyhow::Result<()> {
            bail!("cancel is not wired")
        }
    }

    impl PageLogic for Keypad {
        page_any!();
    }

    impl Page for Keypad {
        const PAGE_ID: PageId = 7;

        fn new(_panel: PanelRef) -> Self {
            Self { presses: 0 }
        }

        fn bindings() -> Vec<JoinBinding<Self>> {
            vec![
                JoinBinding::new(Keys::Enter, "on_enter", Self::on_enter),
                JoinBinding::new(Keys::Cancel, "on_cancel", Self::on_cancel),
            ]
        }
    }

    struct Other;

    impl PageLogic for Other {
        page_any!();
    }

    #[test]
    fn test_manifest_of_page() {
        let manifest = PageManifest::of::<Keypad>();

        assert_eq!(manifest.page_id, 7);
        assert!(manifest.type_name.ends_with("Keypad"));
        assert!(!manifest.is_abstract);
        assert_eq!(manifest.bindings.len(), 2);
        assert_eq!(manifest.bindings[0].join.number, 10);
        assert_eq!(manifest.bindings[0].join.name, "Enter");
        assert_eq!(manifest.bindings[1].method, "on_cancel");
    }

    #[test]
    fn test_erased_binding_runs_method() {
        let manifest = PageManifest::of::<Keypad>();
        let panel: PanelRef = VirtualPanel::shared(0x03, "A");
        let mut page = (manifest.factory)(panel);

        let invoke = manifest.bindings[0].invoker();
        invoke(page.as_mut(), &SignalEvent::digital(10, true)).unwrap();

        assert_eq!(page.downcast_ref::<Keypad>().map(|k| k.presses), Some(1));
    }

    #[test]
    fn test_erased_binding_reports_failures() {
        let manifest = PageManifest::of::<Keypad>();
        let panel: PanelRef = VirtualPanel::shared(0x03, "A");
        let mut page = (manifest.factory)(panel);

        let err = manifest.bindings[1].invoker()(page.as_mut(), &SignalEvent::digital(11, true))
            .unwrap_err();
        assert!(matches!(err, HandlerError::Failed { method: "on_cancel", .. }));

        let mut other: Box<dyn PageLogic> = Box::new(Other);
        let err = manifest.bindings[0].invoker()(other.as_mut(), &SignalEvent::digital(10, true))
            .unwrap_err();
        assert!(matches!(err, HandlerError::PageTypeMismatch { .. }));
    }

    #[test]
    fn test_builder_marks_abstract_pages() {
        let manifest = ManifestBuilder::new("demo")
            .join_enum::<Keys>(SignalKind::Digital)
            .abstract_page::<Keypad>()
            .build();

        assert_eq!(manifest.join_enums.len(), 1);
        assert_eq!(manifest.join_enums[0].kinds.as_slice(), &[SignalKind::Digital]);
        assert!(manifest.pages[0].is_abstract);
    }

    #[test]
    fn test_inventory_module_sees_macro_submissions() {
        let module = InventoryModule::discover()
            .into_iter()
            .find(|m| m.crate_name() == env!("CARGO_PKG_NAME"))
            .unwrap();

        let manifest = module.load().unwrap();
        assert!(
            manifest
                .join_enums
                .iter()
                .any(|decl| decl.join_type == JoinType::of::<Keys>())
        );
    }
}
