//! src/config.rs
//! ============================================================================
//! # FrameworkConfig: framework configuration loader and saver
//!
//! Settings are stored as TOML. [`FrameworkConfig::load`] uses the
//! platform config directory from [`directories::ProjectDirs`] and writes
//! defaults on first run; [`FrameworkConfig::load_from`] reads an explicit path.
//!
//! ## Example
//! ```rust,ignore
//! let config = FrameworkConfig::load_from("panelkit.toml")?;
//! let framework = PanelFramework::builder().config(config).build()?;
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FrameworkError, Result};
use crate::logging::LoggerConfig;
use crate::panel::device::PanelId;

const CONFIG_FILE: &str = "config.toml";

/// Panel build behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Register each panel with the control system after its pages are built.
    pub auto_register_panels: bool,
}

/// Which manifest sources the scanner walks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Only these crates, when non-empty.
    pub include_crates: Vec<String>,

    pub exclude_crates: Vec<String>,
}

impl ScanConfig {
    #[must_use]
    pub fn admits(&self, crate_name: &str) -> bool {
        let included: bool = self.include_crates.is_empty()
            || self.include_crates.iter().any(|name: &String| name == crate_name);

        included && !self.exclude_crates.iter().any(|name: &String| name == crate_name)
    }
}

/// A panel the host should register at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub ipid: PanelId,

    pub name: String,
}

/// Main configuration struct for the framework.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    pub build: BuildOptions,

    pub scan: ScanConfig,

    pub logging: LoggerConfig,

    pub panels: Vec<PanelConfig>,
}

impl FrameworkConfig {
    /// Loads config from the platform config dir, or writes and returns
    /// defaults when no file exists yet.
    pub fn load() -> Result<Self> {
        let path: PathBuf = Self::config_path()?;

        if path.exists() {
            return Self::load_from(&path);
        }

        info!(
            "No config file found at {}, using default configuration. Creating it now.",
            path.display()
        );

        let default_config = Self::default();
        default_config.save_to(&path)?;

        Ok(default_config)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path: &Path = path.as_ref();
        info!("Loading config from {}", path.display());

        let text: String =
            fs::read_to_string(path).map_err(|e| FrameworkError::config_io(path, e))?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_path()?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path: &Path = path.as_ref();
        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FrameworkError::config_io(parent, e))?;
        }

        let toml_str: String = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).map_err(|e| FrameworkError::config_io(path, e))?;

        Ok(())
    }

    /// Panel ids must be non-zero and unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen: Vec<PanelId> = Vec::with_capacity(self.panels.len());

        for panel in &self.panels {
            if panel.ipid == 0 {
                return Err(FrameworkError::invalid_argument(
                    "panels.ipid",
                    format!("panel `{}` uses the reserved IPID 0", panel.name),
                ));
            }

            if seen.contains(&panel.ipid) {
                return Err(FrameworkError::invalid_argument(
                    "panels.ipid",
                    format!("IPID {:#04x} listed more than once", panel.ipid),
                ));
            }

            seen.push(panel.ipid);
        }

        Ok(())
    }

    /// Canonical config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "panelkit", "PanelKit").ok_or_else(|| {
            FrameworkError::Other("Could not determine config directory.".to_string())
        })?;

        Ok(proj_dirs.config_dir().to_path_buf())
    }
}
