use surplus_arbiter::error::ArbiterError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        ArbiterError::config("x"),
        ArbiterError::Config { .. }
    ));
    assert!(matches!(
        ArbiterError::telemetry("x"),
        ArbiterError::Telemetry { .. }
    ));
    assert!(matches!(
        ArbiterError::actuator("x"),
        ArbiterError::Actuator { .. }
    ));
    assert!(matches!(
        ArbiterError::handler("x"),
        ArbiterError::Handler { .. }
    ));
}

#[test]
fn error_constructors_group_2() {
    let ser = ArbiterError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, ArbiterError::Serialization { .. }));
    assert!(matches!(ArbiterError::io("x"), ArbiterError::Io { .. }));
    assert!(matches!(
        ArbiterError::admission("x"),
        ArbiterError::Admission { .. }
    ));
    assert!(matches!(
        ArbiterError::validation("f", "m"),
        ArbiterError::Validation { .. }
    ));
    assert!(matches!(
        ArbiterError::generic("x"),
        ArbiterError::Generic { .. }
    ));
}

#[test]
fn display_messages() {
    let e = ArbiterError::validation("field", "bad");
    let s = format!("{}", e);
    assert!(s.contains("Validation error"));

    let e = ArbiterError::telemetry("no state for sensor.x");
    assert_eq!(e.to_string(), "Telemetry error: no state for sensor.x");
}

#[test]
fn json_errors_convert_to_serialization() {
    let err: ArbiterError = serde_json::from_str::<serde_json::Value>("{")
        .unwrap_err()
        .into();
    assert!(matches!(err, ArbiterError::Serialization { .. }));
}
