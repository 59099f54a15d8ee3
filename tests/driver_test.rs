mod common;

use common::{drain, noon, on, setup_yaml};
use serde_json::json;
use surplus_arbiter::StagedChange;
use surplus_arbiter::driver::{DriverCommand, DriverState, EnergyDriver};
use surplus_arbiter::telemetry::TelemetryProvider;
use tokio::sync::mpsc;

const CONFIG: &str = r#"
tick_interval_seconds: 3600
consumption:
  heater:
    priority: 1
    stages:
      - usage: 600
        switch: switch.heater
consumers:
  - group: garage
    name: wallbox
    phase: L1
    current: 11000
    switch: switch.wallbox
"#;

fn reading(entity: &str, value: serde_json::Value) -> DriverCommand {
    DriverCommand::Reading {
        entity: entity.to_string(),
        value,
        unit: None,
        timestamp: Some(noon()),
    }
}

#[tokio::test]
async fn readings_feed_the_next_cycle() {
    let mut s = setup_yaml(CONFIG);
    let exported = s.manager.config().sensors.exported_power.clone();
    let (_tx, rx) = mpsc::unbounded_channel();
    let driver = EnergyDriver::new(s.manager, s.telemetry.clone(), rx);
    let mut reports = driver.subscribe_reports();

    driver.handle_command(reading(&exported, json!("800"))).await;
    driver.handle_command(reading(&exported, json!(1200))).await;
    assert_eq!(s.telemetry.instant(&exported).unwrap(), 1200.0);

    let report = driver.run_cycle().await;
    assert_eq!(report.exported_watt, 1000.0);
    assert!(matches!(report.change, Some(StagedChange::Activated { .. })));
    assert_eq!(drain(&mut s.commands), vec![on("switch.heater")]);

    assert!(reports.has_changed().unwrap());
    assert_eq!(*reports.borrow_and_update(), Some(report));
}

#[tokio::test]
async fn consumer_requests_resolve_by_reference() {
    let s = setup_yaml(CONFIG);
    let sensors = s.manager.config().sensors.clone();
    let (_tx, rx) = mpsc::unbounded_channel();
    let driver = EnergyDriver::new(s.manager, s.telemetry.clone(), rx);

    for (entity, value) in [
        (&sensors.battery_soc, 80.0),
        (&sensors.battery_size_max, 10000.0),
        (&sensors.solar_production, 0.0),
        (&sensors.solar_to_battery, 0.0),
    ] {
        driver.handle_command(reading(entity, json!(value))).await;
    }

    driver
        .handle_command(DriverCommand::RequestOn {
            consumer: "garage/wallbox".to_string(),
        })
        .await;
    driver
        .handle_command(DriverCommand::RequestOn {
            consumer: "garage/unknown".to_string(),
        })
        .await;

    let manager = driver.manager();
    {
        let manager = manager.lock().await;
        let id = manager.find_consumer("garage/wallbox").unwrap();
        assert!(manager.arbiter().is_on(id));
        assert_eq!(manager.arbiter().phases().phase_load("garage", "L1"), 11000.0);
    }

    driver
        .handle_command(DriverCommand::RaiseCurrent {
            consumer: "garage/wallbox".to_string(),
            current: 13000.0,
        })
        .await;
    assert_eq!(
        manager.lock().await.arbiter().phases().phase_load("garage", "L1"),
        13000.0
    );

    driver
        .handle_command(DriverCommand::RequestOff {
            consumer: "garage/wallbox".to_string(),
        })
        .await;
    assert!(manager.lock().await.arbiter().phases().is_empty());
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let s = setup_yaml(CONFIG);
    let (tx, rx) = mpsc::unbounded_channel();
    let mut driver = EnergyDriver::new(s.manager, s.telemetry.clone(), rx);
    let state = driver.subscribe_state();
    assert_eq!(*state.borrow(), DriverState::Initializing);

    tx.send(DriverCommand::Shutdown).unwrap();
    driver.run().await.unwrap();

    assert_eq!(*state.borrow(), DriverState::ShuttingDown);
}

#[tokio::test]
async fn run_stops_when_all_senders_are_gone() {
    let s = setup_yaml(CONFIG);
    let (tx, rx) = mpsc::unbounded_channel::<DriverCommand>();
    let mut driver = EnergyDriver::new(s.manager, s.telemetry.clone(), rx);
    drop(tx);
    driver.run().await.unwrap();
    assert_eq!(*driver.subscribe_state().borrow(), DriverState::ShuttingDown);
}
