use crate::actuator::ActuatorAdapter;
use crate::error::{ArbiterError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::telemetry::coerce_sample;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Keeps externally owned entities at the value last asked for.
///
/// Every `ensure` applies the value right away and remembers it. A later
/// reading of the entity that disagrees is answered by applying it again.
pub struct StateEnforcer {
    desired: BTreeMap<String, String>,
    actuator: Arc<dyn ActuatorAdapter>,
    logger: StructuredLogger,
}

impl StateEnforcer {
    pub fn new(actuator: Arc<dyn ActuatorAdapter>) -> Self {
        Self {
            desired: BTreeMap::new(),
            actuator,
            logger: get_logger("state_enforcer"),
        }
    }

    pub fn ensure(&mut self, entity: &str, value: &str) {
        self.desired.insert(entity.to_string(), value.to_string());
        match self.apply(entity, value) {
            Ok(()) => self
                .logger
                .debug(&format!("Applied {} to {}", value, entity)),
            Err(e) => self
                .logger
                .error(&format!("Failed to apply {} to {}: {}", value, entity, e)),
        }
    }

    /// Re-apply the desired value when a reading disagrees with it.
    ///
    /// Returns whether a correction was sent.
    pub fn reconcile(&self, entity: &str, observed: &Value) -> bool {
        let Some(desired) = self.desired.get(entity) else {
            return false;
        };
        if state_matches(observed, desired) {
            return false;
        }

        self.logger.warn(&format!(
            "{} reports {}, correcting to {}",
            entity, observed, desired
        ));
        if let Err(e) = self.apply(entity, desired) {
            self.logger
                .error(&format!("Failed to correct {}: {}", entity, e));
        }
        true
    }

    pub fn desired(&self, entity: &str) -> Option<&str> {
        self.desired.get(entity).map(String::as_str)
    }

    fn apply(&self, entity: &str, value: &str) -> Result<()> {
        if entity.starts_with("select.") {
            return self.actuator.select_option(entity, value);
        }
        match value.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => self.actuator.set_value(entity, number),
            _ => Err(ArbiterError::actuator(format!(
                "{} takes numbers only, cannot set {}",
                entity, value
            ))),
        }
    }
}

fn state_matches(observed: &Value, desired: &str) -> bool {
    if observed.as_str() == Some(desired) {
        return true;
    }
    match (coerce_sample(observed), desired.trim().parse::<f64>()) {
        (Some(a), Ok(b)) => a == b,
        _ => false,
    }
}
