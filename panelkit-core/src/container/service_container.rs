//! `src/container/service_container.rs`
//! ============================================================================
//! # ServiceContainer: minimal dependency injection
//!
//! Contracts are Rust types (sized or `dyn Trait`), keyed by `TypeId`. Each
//! contract has one descriptor: a ready instance, a factory, or an
//! [`Injectable`] implementation whose constructors declare their parameter
//! contracts. Instances are handed out as `Arc<T>`.
//!
//! ## Resolution
//! - factory registered: call it with the container
//! - otherwise pick the constructor with the most parameters (first declared
//!   wins ties), resolve every parameter depth-first, then build
//! - singletons are cached only after the whole construction succeeded
//! - re-entering a contract that is still being constructed is a
//!   [`FrameworkError::CyclicDependency`]

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use ahash::RandomState;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{FrameworkError, Result};

/// Type-erased instance. The concrete value is always an `Arc<T>` of the
/// contract type, so unsized contracts survive the round trip.
type Instance = Arc<dyn Any + Send + Sync>;

type ErasedFactory = Arc<dyn Fn(&ServiceContainer) -> Result<Instance> + Send + Sync>;

type ErasedBuild = Arc<dyn Fn(&mut ResolvedArgs) -> Result<Instance> + Send + Sync>;

/// Instance lifetime of a registered contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Created at most once, cached for the lifetime of the container.
    Singleton,

    /// Created anew for every resolution.
    Transient,
}

/// A contract type a constructor depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    type_id: TypeId,
    type_name: &'static str,
}

impl Dependency {
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Resolved constructor arguments, consumed in declaration order.
pub struct ResolvedArgs {
    values: VecDeque<(Dependency, Instance)>,
}

impl ResolvedArgs {
    /// Take the next argument as an `Arc<T>`.
    pub fn take<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let expected: Dependency = Dependency::of::<T>();
        let (dependency, instance) = self.values.pop_front().ok_or_else(|| {
            FrameworkError::construction_failed(
                expected.type_name,
                "constructor requested more arguments than it declared",
            )
        })?;

        if dependency != expected {
            return Err(FrameworkError::construction_failed(
                expected.type_name,
                format!(
                    "constructor argument order mismatch: declared `{}`",
                    dependency.type_name
                ),
            ));
        }

        downcast_instance::<T>(&instance)
    }
}

/// One way of building `T` from resolved dependencies.
pub struct Constructor<T> {
    params: Vec<Dependency>,
    build: Box<dyn Fn(&mut ResolvedArgs) -> Result<T> + Send + Sync>,
}

impl<T: Send + Sync + 'static> Constructor<T> {
    /// Constructor with an explicit parameter list. `build` must `take` the
    /// arguments in the same order.
    pub fn new<F>(params: Vec<Dependency>, build: F) -> Self
    where
        F: Fn(&mut ResolvedArgs) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            params,
            build: Box::new(build),
        }
    }

    pub fn with0<F>(build: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(Vec::new(), move |_args: &mut ResolvedArgs| Ok(build()))
    }

    pub fn with1<A, F>(build: F) -> Self
    where
        A: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<A>) -> T + Send + Sync + 'static,
    {
        Self::new(vec![Dependency::of::<A>()], move |args: &mut ResolvedArgs| {
            Ok(build(args.take::<A>()?))
        })
    }

    pub fn with2<A, B, F>(build: F) -> Self
    where
        A: ?Sized + Send + Sync + 'static,
        B: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<A>, Arc<B>) -> T + Send + Sync + 'static,
    {
        Self::new(
            vec![Dependency::of::<A>(), Dependency::of::<B>()],
            move |args: &mut ResolvedArgs| Ok(build(args.take::<A>()?, args.take::<B>()?)),
        )
    }

    pub fn with3<A, B, C, F>(build: F) -> Self
    where
        A: ?Sized + Send + Sync + 'static,
        B: ?Sized + Send + Sync + 'static,
        C: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<A>, Arc<B>, Arc<C>) -> T + Send + Sync + 'static,
    {
        Self::new(
            vec![
                Dependency::of::<A>(),
                Dependency::of::<B>(),
                Dependency::of::<C>(),
            ],
            move |args: &mut ResolvedArgs| {
                Ok(build(
                    args.take::<A>()?,
                    args.take::<B>()?,
                    args.take::<C>()?,
                ))
            },
        )
    }

    pub fn with4<A, B, C, D, F>(build: F) -> Self
    where
        A: ?Sized + Send + Sync + 'static,
        B: ?Sized + Send + Sync + 'static,
        C: ?Sized + Send + Sync + 'static,
        D: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<A>, Arc<B>, Arc<C>, Arc<D>) -> T + Send + Sync + 'static,
    {
        Self::new(
            vec![
                Dependency::of::<A>(),
                Dependency::of::<B>(),
                Dependency::of::<C>(),
                Dependency::of::<D>(),
            ],
            move |args: &mut ResolvedArgs| {
                Ok(build(
                    args.take::<A>()?,
                    args.take::<B>()?,
                    args.take::<C>()?,
                    args.take::<D>()?,
                ))
            },
        )
    }

    #[must_use]
    pub fn params(&self) -> &[Dependency] {
        &self.params
    }

    fn erase<C, U>(self, upcast: U) -> ErasedConstructor
    where
        C: ?Sized + Send + Sync + 'static,
        U: Fn(Arc<T>) -> Arc<C> + Send + Sync + 'static,
    {
        let Self { params, build } = self;
        ErasedConstructor {
            params,
            build: Arc::new(move |args: &mut ResolvedArgs| {
                let value: T = build(args)?;
                let contract: Arc<C> = upcast(Arc::new(value));
                Ok(Arc::new(contract) as Instance)
            }),
        }
    }
}

/// A type the container can build from its registered contracts.
pub trait Injectable: Sized + Send + Sync + 'static {
    fn constructors() -> Vec<Constructor<Self>>;
}

#[derive(Clone)]
struct ErasedConstructor {
    params: Vec<Dependency>,
    build: ErasedBuild,
}

#[derive(Clone)]
enum Activator {
    Instance(Instance),
    Factory(ErasedFactory),
    Constructors {
        implementation: &'static str,
        constructors: Vec<ErasedConstructor>,
    },
}

/// Registered contract.
#[derive(Clone)]
struct ServiceDescriptor {
    contract: Dependency,
    lifetime: Lifetime,
    activator: Activator,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let implementation: &str = match &self.activator {
            Activator::Instance(_) => "<instance>",
            Activator::Factory(_) => "<factory>",
            Activator::Constructors { implementation, .. } => implementation,
        };

        f.debug_struct("ServiceDescriptor")
            .field("contract", &self.contract.type_name)
            .field("lifetime", &self.lifetime)
            .field("implementation", &implementation)
            .finish()
    }
}

pub struct ServiceContainer {
    descriptors: HashMap<TypeId, ServiceDescriptor, RandomState>,
    singletons: Mutex<HashMap<TypeId, Instance, RandomState>>,
    /// Contracts under construction, per resolving thread.
    resolving: Mutex<HashMap<ThreadId, Vec<Dependency>, RandomState>>,
}

impl ServiceContainer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::with_hasher(RandomState::new()),
            singletons: Mutex::new(HashMap::with_hasher(RandomState::new())),
            resolving: Mutex::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    /// Register a ready instance. Always behaves as a singleton.
    pub fn register_instance<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(ServiceDescriptor {
            contract: Dependency::of::<T>(),
            lifetime: Lifetime::Singleton,
            activator: Activator::Instance(Arc::new(instance)),
        })
    }

    /// Register a factory invoked with the container on activation.
    pub fn register_factory<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceContainer) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let erased: ErasedFactory = Arc::new(move |container: &ServiceContainer| {
            factory(container).map(|instance: Arc<T>| Arc::new(instance) as Instance)
        });

        self.insert(ServiceDescriptor {
            contract: Dependency::of::<T>(),
            lifetime,
            activator: Activator::Factory(erased),
        })
    }

    /// Register `T` as its own contract.
    pub fn register_type<T: Injectable>(&mut self, lifetime: Lifetime) -> &mut Self {
        self.register_type_as::<T, T, _>(lifetime, |instance: Arc<T>| instance)
    }

    /// Register implementation `T` for contract `C`. `upcast` is usually
    /// `|t| t` with the target type inferred, e.g. `Arc<dyn Panel>`.
    pub fn register_type_as<C, T, U>(&mut self, lifetime: Lifetime, upcast: U) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        T: Injectable,
        U: Fn(Arc<T>) -> Arc<C> + Send + Sync + Clone + 'static,
    {
        let constructors: Vec<ErasedConstructor> = T::constructors()
            .into_iter()
            .map(|constructor: Constructor<T>| constructor.erase::<C, U>(upcast.clone()))
            .collect();

        self.insert(ServiceDescriptor {
            contract: Dependency::of::<C>(),
            lifetime,
            activator: Activator::Constructors {
                implementation: std::any::type_name::<T>(),
                constructors,
            },
        })
    }

    fn insert(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        let type_id: TypeId = descriptor.contract.type_id;

        if self.descriptors.contains_key(&type_id) {
            debug!(
                contract = descriptor.contract.type_name,
                "Replacing service registration"
            );
            self.singletons.get_mut().remove(&type_id);
        }

        trace!(?descriptor, "Service registered");
        self.descriptors.insert(type_id, descriptor);
        self
    }

    #[must_use]
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.descriptors.contains_key(&TypeId::of::<T>())
    }

    #[must_use]
    pub fn lifetime_of<T: ?Sized + 'static>(&self) -> Option<Lifetime> {
        self.descriptors
            .get(&TypeId::of::<T>())
            .map(|descriptor: &ServiceDescriptor| descriptor.lifetime)
    }

    /// Registered contract names, sorted.
    #[must_use]
    pub fn contracts(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .descriptors
            .values()
            .map(|descriptor: &ServiceDescriptor| descriptor.contract.type_name)
            .collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Resolve an instance of contract `T`.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let instance: Instance = self.resolve_dependency(Dependency::of::<T>())?;
        downcast_instance::<T>(&instance)
    }

    fn resolve_dependency(&self, dependency: Dependency) -> Result<Instance> {
        let descriptor: ServiceDescriptor = match self.descriptors.get(&dependency.type_id) {
            Some(descriptor) => descriptor.clone(),
            None => {
                let required_by: Option<&'static str> = self
                    .resolving
                    .lock()
                    .get(&thread::current().id())
                    .and_then(|stack: &Vec<Dependency>| stack.last())
                    .map(|parent: &Dependency| parent.type_name);
                return Err(FrameworkError::missing_dependency(
                    dependency.type_name,
                    required_by,
                ));
            }
        };

        if descriptor.lifetime == Lifetime::Singleton {
            if let Some(cached) = self.singletons.lock().get(&dependency.type_id) {
                return Ok(cached.clone());
            }
        }

        let instance: Instance = {
            let _frame: ResolutionFrame<'_> = ResolutionFrame::enter(self, dependency)?;
            self.activate(&descriptor)?
        };

        if descriptor.lifetime == Lifetime::Singleton {
            let cached: Instance = self
                .singletons
                .lock()
                .entry(dependency.type_id)
                .or_insert(instance)
                .clone();
            debug!(contract = dependency.type_name, "Singleton created");
            return Ok(cached);
        }

        Ok(instance)
    }

    fn activate(&self, descriptor: &ServiceDescriptor) -> Result<Instance> {
        match &descriptor.activator {
            Activator::Instance(instance) => Ok(instance.clone()),

            Activator::Factory(factory) => factory(self),

            Activator::Constructors {
                implementation,
                constructors,
            } => {
                let constructor: &ErasedConstructor = select_constructor(constructors)
                    .ok_or_else(|| {
                        FrameworkError::construction_failed(
                            implementation,
                            "type declares no constructors",
                        )
                    })?;

                let mut values: VecDeque<(Dependency, Instance)> =
                    VecDeque::with_capacity(constructor.params.len());
                for param in &constructor.params {
                    values.push_back((*param, self.resolve_dependency(*param)?));
                }

                (constructor.build)(&mut ResolvedArgs { values })
            }
        }
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("contracts", &self.contracts())
            .field("singletons_created", &self.singletons.lock().len())
            .finish()
    }
}

/// Marks a contract as under construction on the current thread for the
/// duration of one activation. Factories that resolve through the container
/// stay on the same stack.
struct ResolutionFrame<'a> {
    container: &'a ServiceContainer,
    thread: ThreadId,
}

impl<'a> ResolutionFrame<'a> {
    fn enter(container: &'a ServiceContainer, dependency: Dependency) -> Result<Self> {
        let thread: ThreadId = thread::current().id();
        let mut resolving = container.resolving.lock();
        let stack: &mut Vec<Dependency> = resolving.entry(thread).or_default();

        if let Some(start) = stack.iter().position(|d: &Dependency| *d == dependency) {
            let chain: String = stack[start..]
                .iter()
                .map(|d: &Dependency| d.type_name)
                .chain(std::iter::once(dependency.type_name))
                .collect::<Vec<&str>>()
                .join(" -> ");
            return Err(FrameworkError::CyclicDependency { chain });
        }

        stack.push(dependency);
        Ok(Self { container, thread })
    }
}

impl Drop for ResolutionFrame<'_> {
    fn drop(&mut self) {
        let mut resolving = self.container.resolving.lock();
        if let Some(stack) = resolving.get_mut(&self.thread) {
            stack.pop();
            if stack.is_empty() {
                resolving.remove(&self.thread);
            }
        }
    }
}

/// Constructor with the most parameters; the first declared wins ties.
fn select_constructor(constructors: &[ErasedConstructor]) -> Option<&ErasedConstructor> {
    constructors.iter().fold(None, |best: Option<&ErasedConstructor>, candidate| {
        match best {
            Some(current) if current.params.len() >= candidate.params.len() => Some(current),
            _ => Some(candidate),
        }
    })
}

fn downcast_instance<T: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Result<Arc<T>> {
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| {
            FrameworkError::construction_failed(
                std::any::type_name::<T>(),
                "registered instance does not match its contract",
            )
        })
}
