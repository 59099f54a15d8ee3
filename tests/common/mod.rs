#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use surplus_arbiter::actuator::{ActuatorCommand, ChannelActuator};
use surplus_arbiter::config::Config;
use surplus_arbiter::manager::EnergyManager;
use surplus_arbiter::telemetry::{FixedClock, TelemetryStore};
use tokio::sync::mpsc;

pub struct Setup {
    pub manager: EnergyManager,
    pub telemetry: Arc<TelemetryStore>,
    pub commands: mpsc::UnboundedReceiver<ActuatorCommand>,
}

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn setup(config: Config) -> Setup {
    let telemetry = Arc::new(TelemetryStore::new());
    let (tx, commands) = mpsc::unbounded_channel();
    let manager = EnergyManager::new(
        config,
        telemetry.clone(),
        Arc::new(ChannelActuator::new(tx)),
        Arc::new(FixedClock(noon())),
    )
    .unwrap();
    Setup {
        manager,
        telemetry,
        commands,
    }
}

pub fn setup_yaml(yaml: &str) -> Setup {
    setup(serde_yaml::from_str(yaml).unwrap())
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<ActuatorCommand>) -> Vec<ActuatorCommand> {
    let mut out = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        out.push(cmd);
    }
    out
}

pub fn on(entity: &str) -> ActuatorCommand {
    ActuatorCommand::TurnOn {
        entity: entity.to_string(),
    }
}

pub fn off(entity: &str) -> ActuatorCommand {
    ActuatorCommand::TurnOff {
        entity: entity.to_string(),
    }
}

/// Battery of 10 kWh at `soc` percent plus the two PV power readings
pub fn set_budget_sensors(setup: &Setup, soc: f64, production: f64, to_battery: f64) {
    let sensors = &setup.manager.config().sensors;
    setup.telemetry.set(&sensors.battery_soc, soc);
    setup.telemetry.set(&sensors.battery_size_max, 10000.0);
    setup.telemetry.set(&sensors.solar_production, production);
    setup.telemetry.set(&sensors.solar_to_battery, to_battery);
}
