//! Link-time declarations picked up without any explicit source.

use panelkit_core::{
    PanelFramework, join_enum, page_any,
    panel::{Page, PageId, PageLogic, PanelRef, SignalEvent, VirtualPanel},
    register_page,
    registry::{JoinType, SignalKind},
    router::RouteOutcome,
    scanner::{InventoryModule, JoinBinding, ManifestSource},
};

join_enum! {
    enum Climate: analog {
        Setpoint = 5,
    }
}

join_enum! {
    enum ClimateModes: digital {
        Heat = 6,
        Cool = 7,
    }
}

// Never instantiated; its bindings must not claim joins.
struct ClimateBase;

impl ClimateBase {
    fn on_setpoint(&mut self, _event: &SignalEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

impl PageLogic for ClimateBase {
    page_any!();
}

impl Page for ClimateBase {
    const PAGE_ID: PageId = 30;

    fn new(_panel: PanelRef) -> Self {
        Self
    }

    fn bindings() -> Vec<JoinBinding<Self>> {
        vec![JoinBinding::new(Climate::Setpoint, "on_setpoint", Self::on_setpoint)]
    }
}

register_page!(abstract ClimateBase);

struct ClimatePage {
    panel: PanelRef,
    setpoint: u16,
    mode: &'static str,
}

impl ClimatePage {
    fn on_setpoint(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
        self.setpoint = event.ushort_value();
        self.panel.set_analog(105, self.setpoint);
        Ok(())
    }

    fn on_mode(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
        self.mode = if event.join == 6 { "heat" } else { "cool" };
        self.panel.set_serial(106, self.mode);
        Ok(())
    }
}

impl PageLogic for ClimatePage {
    page_any!();
}

impl Page for ClimatePage {
    const PAGE_ID: PageId = 31;

    fn new(panel: PanelRef) -> Self {
        Self {
            panel,
            setpoint: 0,
            mode: "off",
        }
    }

    fn bindings() -> Vec<JoinBinding<Self>> {
        let mut bindings = vec![JoinBinding::new(Climate::Setpoint, "on_setpoint", Self::on_setpoint)];
        bindings.extend(JoinBinding::many(
            &[ClimateModes::Heat, ClimateModes::Cool],
            "on_mode",
            Self::on_mode,
        ));
        bindings
    }
}

register_page!(ClimatePage);

#[test]
fn inventory_module_lists_this_crate() {
    let module = InventoryModule::discover()
        .into_iter()
        .find(|m| m.crate_name() == env!("CARGO_PKG_NAME"))
        .unwrap();

    let manifest = module.load().unwrap();

    assert_eq!(manifest.join_enums.len(), 2);
    let ids: Vec<PageId> = manifest.pages.iter().map(|p| p.page_id).collect();
    assert_eq!(ids, vec![30, 31]);
    assert!(manifest.pages[0].is_abstract);
}

#[test]
fn framework_boots_from_inventory() {
    let fw = PanelFramework::builder().build().unwrap();

    assert_eq!(fw.kinds().get(JoinType::of::<Climate>()).unwrap(), SignalKind::Analog);
    assert!(fw.pages().get_page(30).is_none());
    assert_eq!(fw.reverse_joins().lookup(5, SignalKind::Analog), Some(31));

    let panel = VirtualPanel::shared(0x21, "Climate");
    fw.register_panel(panel.clone()).unwrap();

    assert_eq!(fw.route(0x21, &panel.analog(Climate::Setpoint, 215)), RouteOutcome::Dispatched);
    assert_eq!(fw.route(0x21, &panel.press(ClimateModes::Cool)), RouteOutcome::Dispatched);

    assert_eq!(panel.analog_feedback(105), 215);
    assert_eq!(panel.serial_feedback(106), "cool");
}
