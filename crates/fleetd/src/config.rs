//! fleetd.toml configuration parser.

use std::path::{Path, PathBuf};

use anyhow::bail;
use fleetgrid_autoscale::{AutoscaleSettings, DemandRule};
use fleetgrid_placement::SCALESET_MAX_SIZE;
use serde::{Deserialize, Serialize};

/// Daemon configuration. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    /// Directory holding the state database.
    pub data_dir: PathBuf,
    /// Seconds between autoscale cycles.
    pub autoscale_interval_secs: u64,
    /// Instance ceiling per scale set (1..=1000).
    pub scaleset_max_size: u32,
    /// Region for new scale sets when a pool config names none.
    pub base_region: Option<String>,
    /// How bucket demand is aggregated.
    pub demand: DemandRule,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/fleetgrid"),
            autoscale_interval_secs: 30,
            scaleset_max_size: SCALESET_MAX_SIZE,
            base_region: None,
            demand: DemandRule::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FleetConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scaleset_max_size == 0 || self.scaleset_max_size > SCALESET_MAX_SIZE {
            bail!(
                "scaleset_max_size must be between 1 and {SCALESET_MAX_SIZE}, got {}",
                self.scaleset_max_size
            );
        }
        if self.autoscale_interval_secs == 0 {
            bail!("autoscale_interval_secs must be positive");
        }
        Ok(())
    }

    /// Path of the redb state database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("fleetgrid.redb")
    }

    pub fn autoscale_settings(&self) -> AutoscaleSettings {
        AutoscaleSettings {
            scaleset_max_size: self.scaleset_max_size,
            base_region: self.base_region.clone(),
        }
    }
}
