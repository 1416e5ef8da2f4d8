use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

use crate::scheduler::Allocator;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub chargers: ChargersConfig,

    #[serde(default)]
    #[validate(nested)]
    pub dispatch: DispatchConfig,
}

/// Scheduling-core configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SchedulerConfig {
    /// Slot length of the scheduling grid, in minutes.
    #[serde(default = "default_interval_minutes")]
    #[validate(range(min = 1, max = 60))]
    pub interval_minutes: i64,

    /// Which allocation strategy places vehicle windows on the grid.
    #[serde(default)]
    pub allocation: AllocationKind,

    /// How far (in slots) the offset strategies may shift a requested window.
    #[serde(default = "default_window_offset")]
    #[validate(range(min = 0, max = 96))]
    pub window_offset: i64,

    /// Slack allowed when locking one lexicographic objective before solving
    /// the next.
    #[serde(default = "default_objective_tolerance")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub objective_tolerance: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AllocationKind {
    #[default]
    FirstChoice,
    MostRenewables,
    CheapestPricing,
}

/// Station hardware: charger id is the index into the rate table.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_chargers_config"))]
pub struct ChargersConfig {
    #[serde(default = "default_charger_rates")]
    #[validate(length(min = 1))]
    pub rates_kw: Vec<f64>,
}

/// Dispatch loop and demo-session configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DispatchConfig {
    /// Number of synthetic requests the demo session generates.
    #[serde(default = "default_demo_vehicles")]
    #[validate(range(min = 1, max = 64))]
    pub demo_vehicles: u32,

    /// Upper bound on a demo request's window length, in slots.
    #[serde(default = "default_horizon_slots")]
    #[validate(range(min = 2, max = 192))]
    pub horizon_slots: usize,
}

fn default_interval_minutes() -> i64 {
    15
}
fn default_window_offset() -> i64 {
    10
}
fn default_objective_tolerance() -> f64 {
    1e-6
}
fn default_charger_rates() -> Vec<f64> {
    vec![50.0, 50.0, 22.0]
}
fn default_demo_vehicles() -> u32 {
    4
}
fn default_horizon_slots() -> usize {
    16
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            allocation: AllocationKind::default(),
            window_offset: default_window_offset(),
            objective_tolerance: default_objective_tolerance(),
        }
    }
}

impl Default for ChargersConfig {
    fn default() -> Self {
        Self {
            rates_kw: default_charger_rates(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            demo_vehicles: default_demo_vehicles(),
            horizon_slots: default_horizon_slots(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            chargers: ChargersConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Every charger needs a usable positive rate.
fn validate_chargers_config(config: &ChargersConfig) -> Result<(), validator::ValidationError> {
    if config.rates_kw.iter().any(|&rate| rate <= 0.0) {
        return Err(validator::ValidationError::new(
            "charger rates must be positive",
        ));
    }
    Ok(())
}

impl SchedulerConfig {
    pub fn allocator(&self) -> Allocator {
        match self.allocation {
            AllocationKind::FirstChoice => Allocator::FirstChoice,
            AllocationKind::MostRenewables => Allocator::MostRenewables {
                offset: self.window_offset,
            },
            AllocationKind::CheapestPricing => Allocator::CheapestPricing {
                offset: self.window_offset,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML files and environment variables
    ///
    /// Configuration is loaded in this order (later overrides earlier):
    /// 1. config/default.toml (base configuration)
    /// 2. environment variables with GCS__ prefix
    ///    (GCS__SCHEDULER__INTERVAL_MINUTES -> scheduler.interval_minutes)
    pub fn load() -> Result<Self> {
        Self::load_from(Figment::new().merge(Toml::file("config/default.toml")))
    }

    fn load_from(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment
            .merge(Env::prefixed("GCS__").split("__"))
            .extract()
            .context("Failed to parse configuration")?;

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }
}
