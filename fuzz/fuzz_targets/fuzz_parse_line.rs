#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Bridge input is text; arbitrary bytes are decoded lossily
    let line = String::from_utf8_lossy(data);
    if let Ok(Some(msg)) = surplus_arbiter::driver::bridge::parse_line(&line) {
        let _: surplus_arbiter::driver::DriverCommand = msg.into();
    }

    // Whatever the bridge accepts must also coerce without panicking
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) {
        let _ = surplus_arbiter::telemetry::coerce_sample(&value);
    }
});
