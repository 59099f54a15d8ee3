use surplus_arbiter::actuator::ActuatorCommand;
use surplus_arbiter::driver::DriverCommand;
use surplus_arbiter::driver::bridge::{forward_lines, write_commands};
use tokio::sync::mpsc;

#[tokio::test]
async fn forwards_valid_lines_and_skips_the_rest() {
    let input = br#"{"type":"reading","entity":"sensor.solar_exported_power_w","value":"450","unit":"W"}

this is not json
{"type":"request_on","consumer":"garage/wallbox"}
{"type":"unknown"}
{"type":"request_off","consumer":"garage/wallbox"}
"#;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let forwarded = forward_lines(&input[..], &tx).await.unwrap();
    assert_eq!(forwarded, 3);

    match rx.recv().await.unwrap() {
        DriverCommand::Reading {
            entity,
            value,
            unit,
            timestamp,
        } => {
            assert_eq!(entity, "sensor.solar_exported_power_w");
            assert_eq!(value, serde_json::json!("450"));
            assert_eq!(unit.as_deref(), Some("W"));
            assert!(timestamp.is_none());
        }
        other => panic!("unexpected command {:?}", other),
    }
    assert_eq!(
        rx.recv().await.unwrap(),
        DriverCommand::RequestOn {
            consumer: "garage/wallbox".to_string()
        }
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        DriverCommand::RequestOff {
            consumer: "garage/wallbox".to_string()
        }
    );
}

#[tokio::test]
async fn stops_forwarding_once_driver_is_gone() {
    let input = b"{\"type\":\"request_on\",\"consumer\":\"a/b\"}\n";
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    assert_eq!(forward_lines(&input[..], &tx).await.unwrap(), 0);
}

#[tokio::test]
async fn commands_are_written_as_json_lines() {
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(ActuatorCommand::TurnOn {
        entity: "switch.heater".to_string(),
    })
    .unwrap();
    tx.send(ActuatorCommand::SetValue {
        entity: "number.wallbox_current".to_string(),
        value: 16.0,
    })
    .unwrap();
    drop(tx);

    let mut out = Vec::new();
    write_commands(&mut out, rx).await.unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            r#"{"action":"turn_on","entity":"switch.heater"}"#,
            r#"{"action":"set_value","entity":"number.wallbox_current","value":16.0}"#,
        ]
    );
}
