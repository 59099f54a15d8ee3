use super::*;

const SAMPLE: &str = r#"
tick_interval_seconds: 30
timezone: Europe/Berlin
consumption:
  water_heater:
    priority: 2
    tracker: sensor.water_heater_energy
    stages:
      - usage: 600
        switch: virtual.water_heater
      - usage: 2000
        switch: switch.water_heater_full
  pool_pump:
    priority: 1
    can_be_turned_off: false
    stages:
      - usage: 300
        switch: switch.pool_pump
virtuals:
  water_heater:
    events:
      usage_change:
        action: forward
        entity: number.water_heater_power
      switched:
        action: log
"#;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.tick_interval_seconds, 60);
    assert_eq!(config.limits.phase_capacity, 15500.0);
    assert_eq!(config.limits.phase_count, 3);
    assert_eq!(config.limits.battery_allowance, 21000.0);
    assert!(config.consumption.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_consumption_keeps_declaration_order() {
    let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
    let keys: Vec<&str> = config.consumption.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["water_heater", "pool_pump"]);

    let pump = config.consumption.get("pool_pump").unwrap();
    assert!(!pump.can_be_turned_off);
    assert!(pump.tracker.is_none());

    let heater = config.consumption.get("water_heater").unwrap();
    assert!(heater.can_be_turned_off);
    assert_eq!(heater.tracker.as_deref(), Some("sensor.water_heater_energy"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_virtual_actions_parse() {
    let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
    let events = &config.virtuals["water_heater"].events;
    assert_eq!(
        events[&ActuatorEvent::UsageChange],
        VirtualAction::Forward {
            entity: "number.water_heater_power".to_string(),
            scale: 1.0
        }
    );
    assert_eq!(
        events[&ActuatorEvent::Switched],
        VirtualAction::Log { label: None }
    );
}

#[test]
fn test_config_serialization_keeps_order() {
    let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
    let yaml = serde_yaml::to_string(&config).unwrap();
    let reparsed: Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(reparsed.consumption, config.consumption);
    assert_eq!(reparsed.timezone, "Europe/Berlin");
}

#[test]
fn test_stage_selection_helpers() {
    let definition = ConsumptionDefinition {
        priority: 1,
        stages: vec![
            Stage { usage: 300.0, switch: "switch.b".to_string() },
            Stage { usage: 100.0, switch: "switch.a".to_string() },
            Stage { usage: 600.0, switch: "switch.c".to_string() },
        ],
        can_be_turned_off: true,
        tracker: None,
    };
    assert_eq!(definition.lowest_stage().map(|(i, _)| i), Some(1));
    assert_eq!(definition.next_stage_above(100.0).map(|(i, _)| i), Some(0));
    assert_eq!(definition.next_stage_above(600.0).map(|(i, _)| i), None);
    assert_eq!(definition.next_stage_below(600.0).map(|(i, _)| i), Some(0));
    assert_eq!(definition.next_stage_below(100.0).map(|(i, _)| i), None);
}

#[test]
fn test_config_validation() {
    let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
    assert!(config.validate().is_ok());

    config.tick_interval_seconds = 0;
    assert!(config.validate().is_err());

    let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
    config.timezone = "Mars/Olympus".to_string();
    assert!(config.validate().is_err());

    // Virtual switch without a declared actuator
    let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
    config.virtuals.clear();
    let err = config.validate().unwrap_err();
    assert!(format!("{}", err).contains("consumption.water_heater"));

    let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
    config.consumption.insert(
        "empty",
        ConsumptionDefinition {
            priority: 3,
            stages: vec![],
            can_be_turned_off: true,
            tracker: None,
        },
    );
    assert!(config.validate().is_err());
}

#[test]
fn test_consumer_switch_must_be_physical() {
    let mut config = Config::default();
    config.consumers.push(ConsumerConfig {
        group: "garage".to_string(),
        name: "wallbox".to_string(),
        phase: "L1".to_string(),
        current: 11000.0,
        switch: "virtual.wallbox".to_string(),
        can_be_delayed: true,
    });
    assert!(config.validate().is_err());

    config.consumers[0].switch = "switch.wallbox".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_ac_charging_is_opt_in() {
    let config = Config::default();
    assert!(!config.ac_charging.enabled);
    assert_eq!(config.limits.ac_charge_until_hour, 6);
    assert_eq!(config.limits.ac_charge_limit_w, 5000.0);

    let mut config: Config = serde_yaml::from_str(
        r#"
ac_charging:
  enabled: true
  sunrise: sensor.sunrise_today
limits:
  ac_charge_until_hour: 5
"#,
    )
    .unwrap();
    assert!(config.ac_charging.enabled);
    assert_eq!(config.ac_charging.sunrise, "sensor.sunrise_today");
    assert_eq!(
        config.ac_charging.command_mode,
        "select.pv_storage_remote_command_mode"
    );
    assert_eq!(config.limits.ac_charge_until_hour, 5);
    assert!(config.validate().is_ok());

    config.limits.ac_charge_until_hour = 24;
    let err = config.validate().unwrap_err();
    assert!(format!("{}", err).contains("limits.ac_charge_until_hour"));
}
