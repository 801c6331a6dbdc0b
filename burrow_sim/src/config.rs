// Data-driven simulation configuration.
//
// All tunable parameters live in `SimConfig`, loaded from JSON. The sim never
// uses magic numbers; it reads from the config. Every struct is
// `#[serde(default)]`, so a JSON file only has to name the values it changes.
//
// Parameters are grouped by the subsystem that reads them:
// - `NavConfig`: search budgets for `path.rs` and the probe budget for
//   `nav.rs`. The open-set limits bound the work a single path query can do
//   in one tick.
// - `SchedulerConfig`: backlog capacity and reassignment period for
//   `scheduler.rs`.
// - `CapabilityTable`: work ranges per `WorkKind` (see `capability.rs`).
//
// `SimConfig::from_json` validates after parsing, so a loaded config is
// always usable.
//
// See also: `sim.rs` which owns the `SimConfig` as part of `SimState`.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic. Identical configs give identical runs.

use crate::capability::CapabilityTable;
use crate::types::LocomotionKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from loading or validating a `SimConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Path search budgets and tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Max open-set size of the component-level search.
    pub coarse_open_limit: usize,
    /// Max open-set size of each voxel-level segment search.
    pub fine_open_limit: usize,
    /// Destinations whose spread is below this are targeted at their
    /// centroid instead of the nearest one.
    pub cluster_stddev: f32,
    /// Max voxels visited by a speculative component probe.
    pub probe_limit: usize,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            coarse_open_limit: 700,
            fine_open_limit: 300,
            cluster_stddev: 1.5,
            probe_limit: 64,
        }
    }
}

/// Task distribution tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Max tasks per tier in the Unassigned bucket; the rest wait in the
    /// backlog.
    pub buildup_limit: usize,
    /// Seconds between reassignment passes.
    pub reassign_interval: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buildup_limit: 20,
            reassign_interval: 0.8,
        }
    }
}

/// Top-level configuration. Loaded from JSON, never mutated at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// World dimensions in voxels (x, y, z).
    pub world_size: (u32, u32, u32),
    /// Locomotions that get a nav map at startup.
    pub locomotions: Vec<LocomotionKind>,
    pub nav: NavConfig,
    pub scheduler: SchedulerConfig,
    pub capabilities: CapabilityTable,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_size: (64, 32, 64),
            locomotions: vec![
                LocomotionKind::Walker,
                LocomotionKind::Climber,
                LocomotionKind::Flyer,
            ],
            nav: NavConfig::default(),
            scheduler: SchedulerConfig::default(),
            capabilities: CapabilityTable::default(),
        }
    }
}

impl SimConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject values the sim can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (x, y, z) = self.world_size;
        if x == 0 || y == 0 || z == 0 {
            return Err(invalid("world_size", format!("{x}x{y}x{z} has no voxels")));
        }
        if self.nav.coarse_open_limit == 0 {
            return Err(invalid("nav.coarse_open_limit", "must be positive".into()));
        }
        if self.nav.fine_open_limit == 0 {
            return Err(invalid("nav.fine_open_limit", "must be positive".into()));
        }
        let stddev = self.nav.cluster_stddev;
        if stddev.is_nan() || stddev < 0.0 {
            return Err(invalid(
                "nav.cluster_stddev",
                format!("{stddev} is not a non-negative number"),
            ));
        }
        let interval = self.scheduler.reassign_interval;
        if !(interval.is_finite() && interval > 0.0) {
            return Err(invalid(
                "scheduler.reassign_interval",
                format!("{interval} is not a positive number of seconds"),
            ));
        }
        for (kind, range) in &self.capabilities.ranges {
            if range.work_units.is_nan() || range.work_units < 0.0 {
                return Err(invalid(
                    "capabilities",
                    format!("{kind:?} has {} work units", range.work_units),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
