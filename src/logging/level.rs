use crate::error::{ArbiterError, Result};
use tracing::Level;

/// Parse a level name; `WARNING` and `CRITICAL` are accepted as aliases
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    let name = match level_str.trim().to_uppercase().as_str() {
        "WARNING" => "WARN".to_string(),
        "CRITICAL" => "ERROR".to_string(),
        other => other.to_string(),
    };
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(ArbiterError::config(format!(
            "Invalid log level: {}",
            level_str
        )));
    }
    name.parse::<Level>()
        .map_err(|_| ArbiterError::config(format!("Invalid log level: {}", level_str)))
}

/// The more verbose of two levels
pub fn min_level(a: Level, b: Level) -> Level {
    // tracing orders more verbose levels as greater
    a.max(b)
}
