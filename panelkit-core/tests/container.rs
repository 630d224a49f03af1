use std::sync::Arc;

use panelkit_core::{
    FrameworkError,
    config::BuildOptions,
    container::{Constructor, Injectable, Lifetime, ServiceContainer},
    panel::{Panel, PanelLogicPool, SignalEvent, VirtualPanel},
    registry::{DispatchTables, PageRegistry, ReverseJoinRegistry},
    router::{JoinRouter, RouteOutcome},
};

struct Diagnostics {
    router: Arc<JoinRouter>,
    panel: Arc<dyn Panel>,
}

impl Injectable for Diagnostics {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::with2(|router: Arc<JoinRouter>, panel: Arc<dyn Panel>| Diagnostics {
            router,
            panel,
        })]
    }
}

fn wired() -> ServiceContainer {
    let mut container = ServiceContainer::new();
    container
        .register_instance(Arc::new(PageRegistry::new()))
        .register_instance(Arc::new(ReverseJoinRegistry::new()))
        .register_instance(Arc::new(DispatchTables::new()))
        .register_instance(Arc::new(BuildOptions::default()))
        .register_factory::<PanelLogicPool, _>(Lifetime::Singleton, |c: &ServiceContainer| {
            let options: Arc<BuildOptions> = c.resolve::<BuildOptions>()?;
            Ok(Arc::new(PanelLogicPool::new(
                c.resolve::<PageRegistry>()?,
                options.as_ref().clone(),
            )))
        })
        .register_type::<JoinRouter>(Lifetime::Singleton)
        .register_type::<Diagnostics>(Lifetime::Transient);
    container
}

#[test]
fn missing_dependency_names_the_type_then_resolves() {
    let mut container = wired();

    let Err(err) = container.resolve::<Diagnostics>() else {
        panic!("resolved without a panel registered");
    };
    assert!(matches!(err, FrameworkError::MissingDependency { .. }));
    assert!(err.to_string().contains("panel::device::Panel"), "{err}");
    assert!(err.is_configuration_error());

    container.register_instance::<dyn Panel>(VirtualPanel::shared(0x03, "Lobby"));

    let diagnostics = container.resolve::<Diagnostics>().unwrap();
    assert_eq!(diagnostics.panel.id(), 0x03);
    assert_eq!(
        diagnostics.router.route(0x03, &SignalEvent::digital(1, true)),
        RouteOutcome::PanelNotRegistered
    );
}

#[test]
fn singletons_are_shared_between_dependents() {
    let mut container = wired();
    container.register_instance::<dyn Panel>(VirtualPanel::shared(0x04, "Office"));

    let first = container.resolve::<Diagnostics>().unwrap();
    let second = container.resolve::<Diagnostics>().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.router, &second.router));
    assert!(Arc::ptr_eq(
        &container.resolve::<PanelLogicPool>().unwrap(),
        &container.resolve::<PanelLogicPool>().unwrap()
    ));
}
