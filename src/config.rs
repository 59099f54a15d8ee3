//! Configuration management for the arbiter
//!
//! Configuration is read from a YAML file. Every section has defaults that
//! reproduce the thresholds the arbitration heuristics were tuned against, so a
//! minimal file only needs to describe the household's consumptions.

use crate::actuator::SwitchAddress;
use crate::error::{ArbiterError, Result};
use crate::virtuals::ActuatorEvent;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interval between control cycles in seconds
    pub tick_interval_seconds: u64,

    /// Timezone used to decide which forecast sensor is "tomorrow"
    pub timezone: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Telemetry entity ids
    pub sensors: SensorsConfig,

    /// Arbitration thresholds
    pub limits: LimitsConfig,

    /// Staged consumptions, in declaration order
    pub consumption: ConsumptionMap,

    /// Virtual actuators and their event actions
    pub virtuals: BTreeMap<String, VirtualConfig>,

    /// Shiftable loads driven by a plain switch
    pub consumers: Vec<ConsumerConfig>,

    /// Grid charging of the home battery
    pub ac_charging: AcChargingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files); empty disables file logging
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to the console (stderr)
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Telemetry entity ids read by the arbiter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    /// Instantaneous solar production (W)
    pub solar_production: String,
    /// Solar power flowing into the battery (W)
    pub solar_to_battery: String,
    /// Power exported to the grid (W)
    pub exported_power: String,
    /// Power imported from the grid (W)
    pub imported_power: String,
    /// Battery state of charge (percent)
    pub battery_soc: String,
    /// Battery nominal size (Wh)
    pub battery_size_max: String,
    /// Energy moved from PV into the battery today (kWh)
    pub pv_to_battery_daily: String,
    /// Energy moved from the grid into the battery today (kWh)
    pub grid_to_battery_daily: String,
    /// Production forecast for the current day (kWh)
    pub forecast_today: String,
    /// Production forecast for the next day (kWh)
    pub forecast_tomorrow: String,
}

/// Arbitration thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Current capacity of a single phase bucket
    pub phase_capacity: f64,
    /// Number of phases; the hard ceiling is `phase_capacity * phase_count`
    pub phase_count: u32,
    /// Budget granted while the battery is above `battery_budget_min_percent`
    pub battery_allowance: f64,
    /// Battery charge (percent) above which the battery allowance applies
    pub battery_budget_min_percent: f64,
    /// PV overproduction (W) required before it counts towards the budget
    pub pv_overproduction_min_w: f64,
    /// Voltage used to turn PV overproduction into a current equivalent
    pub nominal_voltage: f64,
    /// Exported power (W) above which staged consumptions may grow
    pub export_threshold_w: f64,
    /// Real usage (W) above which an active consumption preempts lower priorities
    pub preempt_real_usage_w: f64,
    /// Battery fraction that must never be discharged
    pub battery_min_charge_fraction: f64,
    /// Usable battery charge (kWh) required for the consume-more trigger
    pub consume_more_battery_kwh: f64,
    /// PV-over-grid battery energy advantage (kWh) required for the consume-more trigger
    pub consume_more_pv_advantage_kwh: f64,
    /// History window for consumption-rate trackers (minutes)
    pub tracker_window_minutes: u32,
    /// Local hour before which "tomorrow" still means the current day's forecast
    pub forecast_rollover_hour: u32,
    /// Local hour that ends the early-morning grid charging window
    pub ac_charge_until_hour: u32,
    /// Household draw (W) assumed between the end of that window and sunrise
    pub ac_charge_assumed_draw_w: f64,
    /// Charge limit (W) written when charging from the grid
    pub ac_charge_limit_w: f64,
    /// Free battery capacity (kWh) required for charging under the manual override
    pub ac_charge_override_min_kwh: f64,
}

/// Storage inverter entities used for grid charging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcChargingConfig {
    /// Whether the storage inverter is driven at all
    pub enabled: bool,
    /// Manual override switch (`on` enables grid charging outside the early morning)
    pub override_switch: String,
    /// Next sunrise as an RFC 3339 timestamp
    pub sunrise: String,
    /// Remote command mode select
    pub command_mode: String,
    /// Remote charge limit number (W)
    pub charge_limit: String,
    /// AC charge policy select
    pub charge_policy: String,
    /// Storage control mode select
    pub control_mode: String,
}

/// One discrete power level of a staged consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Power threshold of this stage (W)
    pub usage: f64,
    /// Switch address; `virtual.<name>` routes to a virtual actuator
    pub switch: String,
}

/// Read-only definition of a staged consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionDefinition {
    /// Lower value means served first
    pub priority: i32,
    /// Stages in declaration order
    pub stages: Vec<Stage>,
    /// Whether the reduction pass may switch this consumption off entirely
    #[serde(default = "default_true")]
    pub can_be_turned_off: bool,
    /// Energy counter or power sensor used to measure real usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ConsumptionDefinition {
    /// The stage with the globally lowest usage
    pub fn lowest_stage(&self) -> Option<(usize, &Stage)> {
        self.stages
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.usage.total_cmp(&b.1.usage))
    }

    /// The smallest stage strictly above `usage`
    pub fn next_stage_above(&self, usage: f64) -> Option<(usize, &Stage)> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, s)| s.usage > usage)
            .min_by(|a, b| a.1.usage.total_cmp(&b.1.usage))
    }

    /// The largest positive stage strictly below `usage`
    pub fn next_stage_below(&self, usage: f64) -> Option<(usize, &Stage)> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, s)| s.usage < usage && s.usage > 0.0)
            .max_by(|a, b| a.1.usage.total_cmp(&b.1.usage))
    }
}

/// Consumption definitions keyed by name, preserving declaration order.
///
/// Declaration order decides which consumption gets a chance first within a
/// cycle, so a plain hash map would change behavior.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumptionMap(Vec<(String, ConsumptionDefinition)>);

impl ConsumptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its original position
    pub fn insert(&mut self, key: impl Into<String>, definition: ConsumptionDefinition) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = definition;
        } else {
            self.0.push((key, definition));
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConsumptionDefinition> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, d)| d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConsumptionDefinition)> {
        self.0.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ConsumptionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for ConsumptionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ConsumptionMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of consumption definitions")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut map = ConsumptionMap::new();
                while let Some((key, value)) =
                    access.next_entry::<String, ConsumptionDefinition>()?
                {
                    map.insert(key, value);
                }
                Ok(map)
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(ConsumptionMap::new())
            }
        }

        deserializer.deserialize_any(OrderedVisitor)
    }
}

/// A virtual actuator and the action bound to each of its events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    pub events: BTreeMap<ActuatorEvent, VirtualAction>,
}

/// Action executed when a virtual actuator event fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VirtualAction {
    /// Log the event value
    Log {
        #[serde(default)]
        label: Option<String>,
    },
    /// Forward the event value (booleans as 1/0) to a physical entity
    Forward {
        entity: String,
        #[serde(default = "default_scale")]
        scale: f64,
    },
}

fn default_scale() -> f64 {
    1.0
}

/// A shiftable load switched through a plain physical switch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub group: String,
    pub name: String,
    /// Phase label; empty when the load is not phase-constrained
    #[serde(default)]
    pub phase: String,
    /// Rated current draw
    pub current: f64,
    /// Physical switch entity
    pub switch: String,
    /// Whether activation may be postponed
    #[serde(default)]
    pub can_be_delayed: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "surplus_arbiter.yaml",
            "/data/surplus_arbiter.yaml",
            "/etc/surplus-arbiter/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| ArbiterError::validation("timezone".to_string(), e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(ArbiterError::validation(
                "tick_interval_seconds",
                "Must be greater than 0",
            ));
        }

        self.tz()?;

        if self.limits.phase_capacity.is_nan() || self.limits.phase_capacity <= 0.0 {
            return Err(ArbiterError::validation(
                "limits.phase_capacity",
                "Must be positive",
            ));
        }

        if self.limits.nominal_voltage <= 0.0 {
            return Err(ArbiterError::validation(
                "limits.nominal_voltage",
                "Must be positive",
            ));
        }

        if self.limits.ac_charge_until_hour > 23 {
            return Err(ArbiterError::validation(
                "limits.ac_charge_until_hour".to_string(),
                format!("Must be a local hour, got {}", self.limits.ac_charge_until_hour),
            ));
        }

        for (key, definition) in self.consumption.iter() {
            let field = format!("consumption.{}", key);
            if definition.stages.is_empty() {
                return Err(ArbiterError::validation(
                    field,
                    "At least one stage is required".to_string(),
                ));
            }
            for stage in &definition.stages {
                if stage.usage.is_nan() || stage.usage < 0.0 {
                    return Err(ArbiterError::validation(
                        field,
                        format!("Stage usage must be non-negative, got {}", stage.usage),
                    ));
                }
                if stage.switch.trim().is_empty() {
                    return Err(ArbiterError::validation(
                        field,
                        "Stage switch cannot be empty".to_string(),
                    ));
                }
                if let SwitchAddress::Virtual(name) = SwitchAddress::parse(&stage.switch)
                    && !self.virtuals.contains_key(name)
                {
                    return Err(ArbiterError::validation(
                        field,
                        format!("Unknown virtual actuator '{}'", name),
                    ));
                }
            }
        }

        for consumer in &self.consumers {
            if consumer.name.is_empty() || consumer.group.is_empty() {
                return Err(ArbiterError::validation(
                    "consumers",
                    "Consumer group and name cannot be empty",
                ));
            }
            if matches!(
                SwitchAddress::parse(&consumer.switch),
                SwitchAddress::Virtual(_)
            ) {
                return Err(ArbiterError::validation(
                    format!("consumers.{}", consumer.name),
                    "Consumer switches must be physical entities".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
