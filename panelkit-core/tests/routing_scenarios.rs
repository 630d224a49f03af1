use std::sync::Arc;

use panelkit_core::{
    PanelFramework, page_any,
    panel::{Page, PageId, PageLogic, PanelId, PanelRef, SignalEvent, VirtualPanel},
    registry::SignalKind,
    router::RouteOutcome,
    scanner::{JoinBinding, ManifestBuilder, ScanWarning},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Deck {
    Button1,
}

impl panelkit_core::registry::JoinEnum for Deck {
    fn join_number(self) -> u32 {
        1
    }

    fn variants() -> &'static [Self] {
        &[Self::Button1]
    }

    fn name(self) -> &'static str {
        "Button1"
    }
}

struct PageA {
    presses: u32,
}

impl PageA {
    fn on_button1(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
        if event.bool_value() {
            self.presses += 1;
        }
        Ok(())
    }
}

impl PageLogic for PageA {
    fn set_defaults(&mut self) {
        self.presses = 0;
    }

    page_any!();
}

impl Page for PageA {
    const PAGE_ID: PageId = 1;

    fn new(_panel: PanelRef) -> Self {
        Self { presses: 0 }
    }

    fn bindings() -> Vec<JoinBinding<Self>> {
        vec![JoinBinding::new(Deck::Button1, "on_button1", Self::on_button1)]
    }
}

struct PageB {
    presses: u32,
}

impl PageB {
    fn on_button1(&mut self, _event: &SignalEvent) -> anyhow::Result<()> {
        self.presses += 1;
        Ok(())
    }
}

impl PageLogic for PageB {
    page_any!();
}

impl Page for PageB {
    const PAGE_ID: PageId = 2;

    fn new(_panel: PanelRef) -> Self {
        Self { presses: 0 }
    }

    fn bindings() -> Vec<JoinBinding<Self>> {
        vec![JoinBinding::new(Deck::Button1, "on_button1", Self::on_button1)]
    }
}

fn framework() -> PanelFramework {
    PanelFramework::builder()
        .source(
            ManifestBuilder::new("deck")
                .join_enum::<Deck>(SignalKind::Digital)
                .page::<PageA>()
                .page::<PageB>(),
        )
        .build()
        .unwrap()
}

fn presses<P: PageLogic>(
    fw: &PanelFramework,
    panel_id: PanelId,
    page_id: PageId,
    read: impl FnOnce(&mut P) -> u32,
) -> u32 {
    fw.logic_group(panel_id)
        .unwrap()
        .with_page(page_id, read)
        .unwrap()
}

#[test]
fn duplicate_join_is_owned_by_first_page() {
    let fw = framework();
    fw.register_panel(VirtualPanel::shared(0x03, "Lobby")).unwrap();

    assert_eq!(fw.reverse_joins().lookup(1, SignalKind::Digital), Some(1));
    assert!(!fw.reverse_joins().try_register(1, SignalKind::Digital, 2));
    assert!(fw.scan_report().warnings.iter().any(|w| matches!(
        w,
        ScanWarning::JoinAlreadyOwned { page_id: 2, join: 1, .. }
    )));

    assert_eq!(fw.route(0x03, &SignalEvent::digital(1, true)), RouteOutcome::Dispatched);

    assert_eq!(presses(&fw, 0x03, 1, |a: &mut PageA| a.presses), 1);
    assert_eq!(presses(&fw, 0x03, 2, |b: &mut PageB| b.presses), 0);
}

#[test]
fn panels_keep_isolated_page_state() {
    let fw = framework();
    let ids: Vec<PanelId> = (0x03..=0xFE).collect();
    assert_eq!(ids.len(), 252);

    for id in &ids {
        fw.register_panel(VirtualPanel::shared(*id, format!("Panel {id:#04x}")))
            .unwrap();
    }

    for id in &ids {
        assert_eq!(fw.route(*id, &SignalEvent::digital(1, true)), RouteOutcome::Dispatched);
        assert_eq!(presses(&fw, *id, 1, |a: &mut PageA| a.presses), 1);
    }

    for id in &ids {
        assert_eq!(presses(&fw, *id, 1, |a: &mut PageA| a.presses), 1);
    }

    fw.set_defaults(0x80).unwrap();

    for id in &ids {
        let expected: u32 = if *id == 0x80 { 0 } else { 1 };
        assert_eq!(presses(&fw, *id, 1, |a: &mut PageA| a.presses), expected);
    }
}

#[test]
fn unregistered_panel_is_a_quiet_no_op() {
    let fw = framework();
    fw.register_panel(VirtualPanel::shared(0x03, "Lobby")).unwrap();

    let outcome = fw.route(0x09, &SignalEvent::digital(1, true));

    assert_eq!(outcome, RouteOutcome::PanelNotRegistered);
    assert_eq!(fw.dispatch_tables().get(SignalKind::Digital, 1).unwrap().invocations(), 0);
    assert_eq!(presses(&fw, 0x03, 1, |a: &mut PageA| a.presses), 0);
}

#[test]
fn each_route_invokes_the_handler_exactly_once() {
    let fw = framework();
    let panel: Arc<VirtualPanel> = VirtualPanel::shared(0x03, "Lobby");
    fw.register_panel(panel.clone()).unwrap();
    let event = SignalEvent::digital(1, true);

    for expected in 1..=5 {
        fw.route(0x03, &event);
        assert_eq!(presses(&fw, 0x03, 1, |a: &mut PageA| a.presses), expected);
    }

    assert_eq!(fw.router().count(RouteOutcome::Dispatched), 5);
}

#[test]
fn unregistering_a_panel_stops_routing() {
    let fw = framework();
    fw.register_panel(VirtualPanel::shared(0x03, "Lobby")).unwrap();

    assert!(fw.unregister_panel(0x03).is_some());
    assert_eq!(fw.route(0x03, &SignalEvent::digital(1, true)), RouteOutcome::PanelNotRegistered);

    // The id can be reused and starts from fresh page state.
    fw.register_panel(VirtualPanel::shared(0x03, "Lobby")).unwrap();
    assert_eq!(presses(&fw, 0x03, 1, |a: &mut PageA| a.presses), 0);
}
