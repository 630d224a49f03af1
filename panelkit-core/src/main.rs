//! src/main.rs
//! ============================================================================
//! # panelkit-sim: virtual touch-panel host
//!
//! Boots the framework from the pages linked into this binary, registers the
//! configured virtual panels and routes signal events typed on stdin:
//!
//! ```text
//! <ipid> <d|a|s> <join> <value>   route a signal from a panel
//! defaults <ipid>                 reset a panel's pages
//! quit
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, info, warn};

use panelkit_core::{
    FrameworkConfig, PanelFramework,
    config::PanelConfig,
    join_enum, page_any,
    panel::{Page, PageId, PageLogic, Panel, PanelId, PanelRef, SignalEvent, VirtualPanel},
    register_page,
    registry::JoinEnum,
    logging::init_logging_with_config,
    router::{RouteOutcome, in_handler},
    scanner::JoinBinding,
};

join_enum! {
    /// Lobby page push buttons.
    enum LobbyButtons: digital {
        Power = 1,
        Mute = 2,
    }
}

join_enum! {
    enum LobbyLevels: analog {
        Volume = 1,
    }
}

join_enum! {
    enum LobbyText: serial {
        Greeting = 1,
    }
}

join_enum! {
    enum SourceButtons: digital {
        NextSource = 10,
        PreviousSource = 11,
    }
}

const FEEDBACK_OFFSET: u32 = 100;
const SOURCES: [&str; 3] = ["Laptop", "Camera", "Signage"];

struct LobbyPage {
    panel: PanelRef,
    powered: bool,
    muted: bool,
    volume: u16,
}

impl LobbyPage {
    fn on_power(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
        if event.bool_value() {
            self.powered = !self.powered;
            self.panel.set_digital(FEEDBACK_OFFSET + 1, self.powered);
        }
        Ok(())
    }

    fn on_mute(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
        if !event.bool_value() {
            return Ok(());
        }
        if !self.powered {
            bail!("system is off");
        }
        self.muted = !self.muted;
        self.panel.set_digital(FEEDBACK_OFFSET + 2, self.muted);
        Ok(())
    }

    fn on_volume(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
        self.volume = event.ushort_value();
        self.panel.set_analog(FEEDBACK_OFFSET + 1, self.volume);
        Ok(())
    }

    fn on_greeting(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
        let greeting: String = format!("{}: {}", self.panel.name(), event.string_value());
        self.panel.set_serial(FEEDBACK_OFFSET + 1, &greeting);
        Ok(())
    }
}

impl PageLogic for LobbyPage {
    fn initialize(&mut self) {
        self.panel.set_serial(FEEDBACK_OFFSET + 1, "Welcome");
    }

    fn set_defaults(&mut self) {
        self.powered = false;
        self.muted = false;
        self.volume = 0;
        self.panel.set_digital(FEEDBACK_OFFSET + 1, false);
        self.panel.set_digital(FEEDBACK_OFFSET + 2, false);
        self.panel.set_analog(FEEDBACK_OFFSET + 1, 0);
    }

    page_any!();
}

impl Page for LobbyPage {
    const PAGE_ID: PageId = 1;

    fn new(panel: PanelRef) -> Self {
        Self {
            panel,
            powered: false,
            muted: false,
            volume: 0,
        }
    }

    fn bindings() -> Vec<JoinBinding<Self>> {
        vec![
            JoinBinding::new(LobbyButtons::Power, "on_power", Self::on_power),
            JoinBinding::new(LobbyButtons::Mute, "on_mute", Self::on_mute),
            JoinBinding::new(LobbyLevels::Volume, "on_volume", Self::on_volume),
            JoinBinding::new(LobbyText::Greeting, "on_greeting", Self::on_greeting),
        ]
    }
}

register_page!(LobbyPage);

struct SourcePage {
    panel: PanelRef,
    selected: usize,
}

impl SourcePage {
    fn on_step(&mut self, event: &SignalEvent) -> anyhow::Result<()> {
        if !event.bool_value() {
            return Ok(());
        }

        self.selected = if event.join == SourceButtons::NextSource.join_number() {
            (self.selected + 1) % SOURCES.len()
        } else {
            (self.selected + SOURCES.len() - 1) % SOURCES.len()
        };
        self.show();
        Ok(())
    }

    fn show(&self) {
        self.panel
            .set_serial(FEEDBACK_OFFSET + 10, SOURCES[self.selected]);
    }
}

impl PageLogic for SourcePage {
    fn initialize(&mut self) {
        self.show();
    }

    fn set_defaults(&mut self) {
        self.selected = 0;
        self.show();
    }

    page_any!();
}

impl Page for SourcePage {
    const PAGE_ID: PageId = 2;

    fn new(panel: PanelRef) -> Self {
        Self { panel, selected: 0 }
    }

    fn bindings() -> Vec<JoinBinding<Self>> {
        JoinBinding::many(
            &[SourceButtons::NextSource, SourceButtons::PreviousSource],
            "on_step",
            Self::on_step,
        )
    }
}

register_page!(SourcePage);

fn main() -> Result<()> {
    setup_panic_handler();

    let config: FrameworkConfig = load_config()?;

    let _log_guard =
        init_logging_with_config(config.logging.clone()).context("Failed to initialize logging")?;

    info!("Starting panelkit simulator");

    let framework: PanelFramework = PanelFramework::builder()
        .config(config)
        .build()
        .context("Failed to build panel framework")?;

    let panels: Vec<Arc<VirtualPanel>> = register_panels(&framework)?;

    run(&framework, &panels)?;

    framework.shutdown();
    info!("Simulator exited cleanly");
    Ok(())
}

fn load_config() -> Result<FrameworkConfig> {
    match std::env::args().nth(1) {
        Some(path) => FrameworkConfig::load_from(&path)
            .with_context(|| format!("Failed to load config from {path}")),
        None => Ok(FrameworkConfig::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {e}");
            FrameworkConfig::default()
        })),
    }
}

fn register_panels(framework: &PanelFramework) -> Result<Vec<Arc<VirtualPanel>>> {
    let mut configured: Vec<PanelConfig> = framework.config().panels.clone();
    if configured.is_empty() {
        configured = vec![
            PanelConfig {
                ipid: 0x03,
                name: "Lobby".to_string(),
            },
            PanelConfig {
                ipid: 0x04,
                name: "Boardroom".to_string(),
            },
        ];
    }

    configured
        .into_iter()
        .map(|panel: PanelConfig| -> Result<Arc<VirtualPanel>> {
            let virtual_panel: Arc<VirtualPanel> = VirtualPanel::shared(panel.ipid, panel.name);
            framework
                .register_panel(virtual_panel.clone())
                .with_context(|| format!("Failed to register panel {:#04x}", panel.ipid))?;
            Ok(virtual_panel)
        })
        .collect()
}

fn run(framework: &PanelFramework, panels: &[Arc<VirtualPanel>]) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line: String = line.context("Failed to read stdin")?;
        let words: Vec<&str> = line.split_whitespace().collect();

        match words.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            ["defaults", ipid] => match parse_ipid(ipid).and_then(|id| Ok(framework.set_defaults(id)?)) {
                Ok(()) => writeln!(stdout, "defaults applied")?,
                Err(e) => writeln!(stdout, "error: {e:#}")?,
            },
            [ipid, kind, join, value @ ..] => match parse_event(kind, join, value) {
                Ok(event) => {
                    let panel_id: PanelId = match parse_ipid(ipid) {
                        Ok(id) => id,
                        Err(e) => {
                            writeln!(stdout, "error: {e:#}")?;
                            continue;
                        }
                    };
                    let outcome: RouteOutcome = framework.route(panel_id, &event);
                    writeln!(stdout, "{event} -> {outcome}")?;
                    print_feedback(&mut stdout, panels, panel_id)?;
                }
                Err(e) => writeln!(stdout, "error: {e:#}")?,
            },
            _ => writeln!(stdout, "usage: <ipid> <d|a|s> <join> <value> | defaults <ipid> | quit")?,
        }
    }

    Ok(())
}

fn parse_ipid(text: &str) -> Result<PanelId> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => PanelId::from_str_radix(hex, 16),
        None => text.parse::<PanelId>(),
    };
    parsed.with_context(|| format!("invalid IPID `{text}`"))
}

fn parse_event(kind: &str, join: &str, value: &[&str]) -> Result<SignalEvent> {
    let join: u32 = join
        .parse()
        .with_context(|| format!("invalid join number `{join}`"))?;

    match (kind, value) {
        ("d", [value]) => Ok(SignalEvent::digital(join, matches!(*value, "1" | "true" | "on"))),
        ("a", [value]) => Ok(SignalEvent::analog(
            join,
            value
                .parse()
                .with_context(|| format!("invalid analog value `{value}`"))?,
        )),
        ("s", words) => Ok(SignalEvent::serial(join, words.join(" "))),
        (other, _) => Err(anyhow!("unknown signal kind `{other}`")),
    }
}

fn print_feedback(out: &mut impl Write, panels: &[Arc<VirtualPanel>], panel_id: PanelId) -> Result<()> {
    let Some(panel) = panels.iter().find(|p: &&Arc<VirtualPanel>| p.id() == panel_id) else {
        return Ok(());
    };

    for (kind, join, value) in panel.feedback_snapshot() {
        writeln!(out, "  {kind} {join} = {value}")?;
    }
    Ok(())
}

fn setup_panic_handler() {
    let original_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        // The router contains handler panics and reports them itself.
        if in_handler() {
            debug!("Page handler panicked: {}", panic_info);
            return;
        }

        error!("Simulator panicked: {}", panic_info);
        original_hook(panic_info);
    }));
}
