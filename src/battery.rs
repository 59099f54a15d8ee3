//! Home battery and production forecast readings

use crate::config::{LimitsConfig, SensorsConfig};
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::telemetry::TelemetryProvider;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Battery state derived from its charge and size sensors
#[derive(Debug, Clone)]
pub struct BatteryModel {
    soc_sensor: String,
    size_sensor: String,
    min_charge_fraction: f64,
    logger: StructuredLogger,
}

impl BatteryModel {
    pub fn new(sensors: &SensorsConfig, limits: &LimitsConfig) -> Self {
        Self {
            soc_sensor: sensors.battery_soc.clone(),
            size_sensor: sensors.battery_size_max.clone(),
            min_charge_fraction: limits.battery_min_charge_fraction,
            logger: get_logger("battery"),
        }
    }

    /// State of charge in percent
    pub fn try_charge_percent(&self, telemetry: &dyn TelemetryProvider) -> Result<f64> {
        telemetry.instant(&self.soc_sensor)
    }

    /// Capacity left to fill, in kWh
    pub fn try_remaining_capacity_kwh(&self, telemetry: &dyn TelemetryProvider) -> Result<f64> {
        let (max_kwh, used_kwh) = self.read(telemetry)?;
        Ok(max_kwh - used_kwh)
    }

    /// Charge above the protected minimum, in kWh
    pub fn try_current_capacity_kwh(&self, telemetry: &dyn TelemetryProvider) -> Result<f64> {
        let (max_kwh, used_kwh) = self.read(telemetry)?;
        Ok(used_kwh - max_kwh * self.min_charge_fraction)
    }

    pub fn charge_percent(&self, telemetry: &dyn TelemetryProvider) -> f64 {
        self.or_zero("charge_percent", self.try_charge_percent(telemetry))
    }

    pub fn remaining_capacity_kwh(&self, telemetry: &dyn TelemetryProvider) -> f64 {
        self.or_zero(
            "remaining_capacity_kwh",
            self.try_remaining_capacity_kwh(telemetry),
        )
    }

    pub fn current_capacity_kwh(&self, telemetry: &dyn TelemetryProvider) -> f64 {
        self.or_zero(
            "current_capacity_kwh",
            self.try_current_capacity_kwh(telemetry),
        )
    }

    fn read(&self, telemetry: &dyn TelemetryProvider) -> Result<(f64, f64)> {
        // Size is reported in Wh, charge in whole percent
        let max_kwh = telemetry.instant(&self.size_sensor)? / 1000.0;
        let charge = telemetry.instant(&self.soc_sensor)? / 100.0;
        self.logger.trace(&format!(
            "Battery max {:.3} kWh, charge {:.1}%",
            max_kwh,
            charge * 100.0
        ));
        Ok((max_kwh, max_kwh * charge))
    }

    fn or_zero(&self, what: &str, result: Result<f64>) -> f64 {
        result.unwrap_or_else(|e| {
            self.logger.error(&format!("Failed to read battery {}: {}", what, e));
            0.0
        })
    }
}

/// Picks the forecast sensor that describes the next production day
#[derive(Debug, Clone)]
pub struct ForecastLookup {
    today_sensor: String,
    tomorrow_sensor: String,
    timezone: Tz,
    rollover_hour: u32,
    logger: StructuredLogger,
}

impl ForecastLookup {
    pub fn new(sensors: &SensorsConfig, limits: &LimitsConfig, timezone: Tz) -> Self {
        Self {
            today_sensor: sensors.forecast_today.clone(),
            tomorrow_sensor: sensors.forecast_tomorrow.clone(),
            timezone,
            rollover_hour: limits.forecast_rollover_hour,
            logger: get_logger("forecast"),
        }
    }

    /// Expected production of the next solar day in kWh.
    ///
    /// Shortly after midnight the "today" forecast still describes the
    /// upcoming daylight, so it is used until the rollover hour.
    pub fn try_estimated_production_tomorrow(
        &self,
        telemetry: &dyn TelemetryProvider,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        let local_hour = now.with_timezone(&self.timezone).hour();
        let sensor = if local_hour < self.rollover_hour {
            &self.today_sensor
        } else {
            &self.tomorrow_sensor
        };
        let value = telemetry.instant(sensor)?;
        self.logger.debug(&format!(
            "Forecast from {} at local hour {}: {:.2} kWh",
            sensor, local_hour, value
        ));
        Ok(value)
    }

    pub fn estimated_production_tomorrow(
        &self,
        telemetry: &dyn TelemetryProvider,
        now: DateTime<Utc>,
    ) -> f64 {
        self.try_estimated_production_tomorrow(telemetry, now)
            .unwrap_or_else(|e| {
                self.logger
                    .error(&format!("Failed to read production forecast: {}", e));
                0.0
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryStore;
    use chrono::TimeZone;

    fn setup(soc: f64) -> (BatteryModel, TelemetryStore) {
        let sensors = SensorsConfig::default();
        let store = TelemetryStore::new();
        store.set(&sensors.battery_soc, soc);
        store.set(&sensors.battery_size_max, 10000.0);
        (BatteryModel::new(&sensors, &LimitsConfig::default()), store)
    }

    #[test]
    fn capacities_follow_charge() {
        let (battery, store) = setup(60.0);
        assert_eq!(battery.charge_percent(&store), 60.0);
        assert!((battery.remaining_capacity_kwh(&store) - 4.0).abs() < 1e-9);
        // 6 kWh stored, 1 kWh protected
        assert!((battery.current_capacity_kwh(&store) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn missing_sensors_read_as_zero() {
        let battery = BatteryModel::new(&SensorsConfig::default(), &LimitsConfig::default());
        let store = TelemetryStore::new();
        assert_eq!(battery.charge_percent(&store), 0.0);
        assert_eq!(battery.remaining_capacity_kwh(&store), 0.0);
        assert!(battery.try_current_capacity_kwh(&store).is_err());
    }

    #[test]
    fn forecast_switches_sensor_at_rollover_hour() {
        let sensors = SensorsConfig::default();
        let store = TelemetryStore::new();
        store.set(&sensors.forecast_today, 12.0);
        store.set(&sensors.forecast_tomorrow, 30.0);
        let tz: Tz = "Europe/Amsterdam".parse().unwrap();
        let lookup = ForecastLookup::new(&sensors, &LimitsConfig::default(), tz);

        // 23:30 UTC is 01:30 local in summer
        let early = Utc.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap();
        assert_eq!(lookup.estimated_production_tomorrow(&store, early), 12.0);

        let later = Utc.with_ymd_and_hms(2024, 6, 2, 1, 0, 0).unwrap();
        assert_eq!(lookup.estimated_production_tomorrow(&store, later), 30.0);
    }
}
