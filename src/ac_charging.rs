//! Grid charging of the home battery
//!
//! Before dawn the battery is topped up from the grid when tomorrow's sun will
//! not refill it and the charge on board will not carry the house until the
//! panels take over. Outside that window a manual override switch enables
//! grid charging while the battery has room. Otherwise the inverter maximizes
//! self consumption.

use crate::actuator::ActuatorAdapter;
use crate::battery::{BatteryModel, ForecastLookup};
use crate::config::{AcChargingConfig, Config, LimitsConfig};
use crate::error::{ArbiterError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::telemetry::{Clock, TelemetryProvider};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

mod enforcer;

pub use enforcer::StateEnforcer;

const CHARGE_POLICY_ALWAYS: &str = "Always Allowed";
const CONTROL_MODE_REMOTE: &str = "Remote Control";

/// Remote command mode of the storage inverter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    MaximizeSelfConsumption,
    ChargeFromPvAndAc,
    Off,
}

impl StorageMode {
    /// Option label of the command mode select
    pub fn as_option(&self) -> &'static str {
        match self {
            StorageMode::MaximizeSelfConsumption => "Maximize self consumption",
            StorageMode::ChargeFromPvAndAc => "Charge from PV and AC",
            StorageMode::Off => "Off",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_option())
    }
}

pub struct AcChargingManager {
    entities: AcChargingConfig,
    until_hour: u32,
    assumed_draw_w: f64,
    charge_limit_w: f64,
    override_min_kwh: f64,
    timezone: Tz,
    battery: BatteryModel,
    forecast: ForecastLookup,
    enforcer: StateEnforcer,
    telemetry: Arc<dyn TelemetryProvider>,
    actuator: Arc<dyn ActuatorAdapter>,
    clock: Arc<dyn Clock>,
    logger: StructuredLogger,
}

impl AcChargingManager {
    pub fn new(
        config: &Config,
        telemetry: Arc<dyn TelemetryProvider>,
        actuator: Arc<dyn ActuatorAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let timezone = config.tz()?;
        let LimitsConfig {
            ac_charge_until_hour,
            ac_charge_assumed_draw_w,
            ac_charge_limit_w,
            ac_charge_override_min_kwh,
            ..
        } = config.limits;

        Ok(Self {
            entities: config.ac_charging.clone(),
            until_hour: ac_charge_until_hour,
            assumed_draw_w: ac_charge_assumed_draw_w,
            charge_limit_w: ac_charge_limit_w,
            override_min_kwh: ac_charge_override_min_kwh,
            timezone,
            battery: BatteryModel::new(&config.sensors, &config.limits),
            forecast: ForecastLookup::new(&config.sensors, &config.limits, timezone),
            enforcer: StateEnforcer::new(actuator.clone()),
            telemetry,
            actuator,
            clock,
            logger: get_logger("ac_charging"),
        })
    }

    /// Put the inverter under remote control with grid charging permitted
    pub fn start(&mut self) {
        self.logger.info("Taking remote control of the storage inverter");
        self.enforcer
            .ensure(&self.entities.charge_policy, CHARGE_POLICY_ALWAYS);
        self.enforcer
            .ensure(&self.entities.control_mode, CONTROL_MODE_REMOTE);
        self.enforcer.ensure(
            &self.entities.command_mode,
            StorageMode::MaximizeSelfConsumption.as_option(),
        );
    }

    /// Decide this cycle's storage mode and push it to the inverter
    pub fn manage(&mut self) -> Result<StorageMode> {
        let mode = self.decide()?;
        self.enforcer
            .ensure(&self.entities.command_mode, mode.as_option());
        if mode == StorageMode::ChargeFromPvAndAc
            && let Err(e) = self
                .actuator
                .set_value(&self.entities.charge_limit, self.charge_limit_w)
        {
            self.logger.error(&format!(
                "Failed to set charge limit {}: {}",
                self.entities.charge_limit, e
            ));
        }
        Ok(mode)
    }

    pub fn decide(&self) -> Result<StorageMode> {
        let telemetry = self.telemetry.as_ref();
        let now = self.clock.now();
        let local = now.with_timezone(&self.timezone);
        let current = self.battery.current_capacity_kwh(telemetry);
        let remaining = self.battery.remaining_capacity_kwh(telemetry);

        if local.hour() < self.until_hour {
            let tomorrow = self.forecast.estimated_production_tomorrow(telemetry, now);
            let needed = self.needed_until_sunrise(local)?;
            self.logger.info(&format!(
                "Early morning: remaining {:.3} kWh, current {:.3} kWh, needed {:.3} kWh, tomorrow {:.3} kWh",
                remaining, current, needed, tomorrow
            ));
            // Half of tomorrow's sun would not refill the battery
            if tomorrow / 2.0 < remaining {
                if current < needed {
                    return Ok(StorageMode::ChargeFromPvAndAc);
                }
                return Ok(StorageMode::Off);
            }
            return Ok(StorageMode::MaximizeSelfConsumption);
        }

        if self.override_enabled() {
            self.logger.info(&format!(
                "Manual override on, remaining {:.3} kWh",
                remaining
            ));
            if remaining > self.override_min_kwh {
                return Ok(StorageMode::ChargeFromPvAndAc);
            }
        }
        Ok(StorageMode::MaximizeSelfConsumption)
    }

    /// Correct a drifted inverter entity; false when the entity is not enforced
    pub fn reconcile(&self, entity: &str, observed: &Value) -> bool {
        self.enforcer.reconcile(entity, observed)
    }

    pub fn enforcer(&self) -> &StateEnforcer {
        &self.enforcer
    }

    fn override_enabled(&self) -> bool {
        matches!(
            self.telemetry.state(&self.entities.override_switch),
            Ok(Value::String(ref s)) if s == "on"
        )
    }

    /// Energy (kWh) the house draws between the end of the window and sunrise
    fn needed_until_sunrise(&self, local: DateTime<Tz>) -> Result<f64> {
        let sunrise = self.sunrise()?;
        let stop = self
            .timezone
            .with_ymd_and_hms(local.year(), local.month(), local.day(), self.until_hour, 0, 0)
            .earliest()
            .ok_or_else(|| {
                ArbiterError::generic(format!(
                    "{:02}:00 does not exist on {} in {}",
                    self.until_hour,
                    local.date_naive(),
                    self.timezone
                ))
            })?;
        let minutes = (sunrise - stop.with_timezone(&Utc))
            .num_seconds()
            .div_euclid(60);
        Ok(minutes as f64 * self.assumed_draw_w / 60.0 / 1000.0)
    }

    fn sunrise(&self) -> Result<DateTime<Utc>> {
        let sensor = &self.entities.sunrise;
        let raw = self.telemetry.state(sensor)?;
        let text = raw.as_str().ok_or_else(|| {
            ArbiterError::telemetry(format!("non-text state for {}: {}", sensor, raw))
        })?;
        DateTime::parse_from_rfc3339(text.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                ArbiterError::telemetry(format!("invalid timestamp for {}: {}", sensor, e))
            })
    }
}
