use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/surplus-arbiter.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            solar_production: "sensor.solar_panel_production_w".to_string(),
            solar_to_battery: "sensor.solar_panel_to_battery_w".to_string(),
            exported_power: "sensor.solar_exported_power_w".to_string(),
            imported_power: "sensor.solar_imported_power_w".to_string(),
            battery_soc: "sensor.pv_battery1_state_of_charge".to_string(),
            battery_size_max: "sensor.pv_battery1_size_max".to_string(),
            pv_to_battery_daily: "sensor.solar_panel_to_battery_daily".to_string(),
            grid_to_battery_daily: "sensor.solar_grid_to_battery_daily".to_string(),
            forecast_today: "sensor.solcast_pv_forecast_prognose_heute".to_string(),
            forecast_tomorrow: "sensor.solcast_pv_forecast_prognose_morgen".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            phase_capacity: 15500.0,
            phase_count: 3,
            battery_allowance: 21000.0,
            battery_budget_min_percent: 15.0,
            pv_overproduction_min_w: 100.0,
            nominal_voltage: 230.0,
            export_threshold_w: 300.0,
            preempt_real_usage_w: 50.0,
            battery_min_charge_fraction: 0.1,
            consume_more_battery_kwh: 8.5,
            consume_more_pv_advantage_kwh: 0.5,
            tracker_window_minutes: 10,
            forecast_rollover_hour: 2,
            ac_charge_until_hour: 6,
            ac_charge_assumed_draw_w: 500.0,
            ac_charge_limit_w: 5000.0,
            ac_charge_override_min_kwh: 2.0,
        }
    }
}

impl Default for AcChargingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            override_switch: "input_boolean.charge_solar_battery_override".to_string(),
            sunrise: "sensor.sun_next_rising".to_string(),
            command_mode: "select.pv_storage_remote_command_mode".to_string(),
            charge_limit: "number.pv_storage_remote_charge_limit".to_string(),
            charge_policy: "select.pv_storage_ac_charge_policy".to_string(),
            control_mode: "select.pv_storage_control_mode".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
            timezone: "UTC".to_string(),
            logging: LoggingConfig::default(),
            sensors: SensorsConfig::default(),
            limits: LimitsConfig::default(),
            consumption: ConsumptionMap::default(),
            virtuals: BTreeMap::new(),
            consumers: Vec::new(),
            ac_charging: AcChargingConfig::default(),
        }
    }
}
