//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then the optional TOML file
//! under the user's config directory, then `PLOG_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Directory name used under the platform config and data directories.
pub const APP_DIR: &str = "personal-logistics";

const CONFIG_FILE: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"# Personal logistics settings

# Reclaim litter into the logistics network when a station stocks the item.
send_litter_to_logistics_network = true
# Stop requesting and recycling items without losing the desired inventory.
inventory_management_paused = false
show_incoming_item_progress = true
show_nearest_build_ghost_indicator = true

# Intervals are measured in simulation ticks (60 per second).
sync_interval_ticks = 300
maintenance_interval_ticks = 205
load_state_interval_ticks = 100
shipment_travel_ticks = 600

# Wall-clock pause between background network index rebuilds.
index_rebuild_interval_ms = 1000
"#;

/// Settings consumed by the logistics session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for persisted blobs.
    pub data_root: PathBuf,
    /// Whether litter is reclaimed into the network.
    pub send_litter_to_logistics_network: bool,
    /// Suspends reconciliation and HUD output.
    pub inventory_management_paused: bool,
    /// Show the incoming-item timer.
    pub show_incoming_item_progress: bool,
    /// Show the nearest construction ghost hint.
    pub show_nearest_build_ghost_indicator: bool,
    /// Ticks between desired-inventory reconciliation passes.
    pub sync_interval_ticks: u64,
    /// Ticks between trash and shipment processing.
    pub maintenance_interval_ticks: u64,
    /// Ticks between inbound load-state reports.
    pub load_state_interval_ticks: u64,
    /// Ticks a shipment spends in transit.
    pub shipment_travel_ticks: u64,
    /// Milliseconds between background index rebuilds.
    pub index_rebuild_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            send_litter_to_logistics_network: true,
            inventory_management_paused: false,
            show_incoming_item_progress: true,
            show_nearest_build_ghost_indicator: true,
            sync_interval_ticks: 300,
            maintenance_interval_ticks: 205,
            load_state_interval_ticks: 100,
            shipment_travel_ticks: 600,
            index_rebuild_interval_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location and environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration from `path` (optional) layered over defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("PLOG").try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        // A zero interval would fire every tick.
        self.sync_interval_ticks = self.sync_interval_ticks.max(1);
        self.maintenance_interval_ticks = self.maintenance_interval_ticks.max(1);
        self.load_state_interval_ticks = self.load_state_interval_ticks.max(1);
        self.index_rebuild_interval_ms = self.index_rebuild_interval_ms.max(50);
    }
}

/// Default location of the configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Default directory for persisted state.
pub fn default_data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Write the commented default configuration when no file exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_file_matches_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join(CONFIG_FILE);
        write_default_config(&path)?;
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path)?;
        let defaults = AppConfig::default();
        assert_eq!(loaded.sync_interval_ticks, defaults.sync_interval_ticks);
        assert_eq!(
            loaded.maintenance_interval_ticks,
            defaults.maintenance_interval_ticks
        );
        assert!(loaded.send_litter_to_logistics_network);
        assert!(!loaded.inventory_management_paused);
        Ok(())
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "inventory_management_paused = true\nsync_interval_ticks = 0\nshipment_travel_ticks = 30\n",
        )?;

        let loaded = AppConfig::load_from(&path)?;
        assert!(loaded.inventory_management_paused);
        assert_eq!(loaded.sync_interval_ticks, 1);
        assert_eq!(loaded.shipment_travel_ticks, 30);
        assert_eq!(loaded.load_state_interval_ticks, 100);
        Ok(())
    }

    #[test]
    fn missing_file_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let loaded = AppConfig::load_from(dir.path().join("absent.toml"))?;
        assert_eq!(loaded.shipment_travel_ticks, 600);
        Ok(())
    }
}
