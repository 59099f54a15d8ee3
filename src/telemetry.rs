//! Telemetry boundary
//!
//! Readings arrive as loosely typed states (numbers, numeric strings, or
//! placeholders such as `"unavailable"`). Anything non-numeric is a telemetry
//! error at this boundary and callers coerce it to zero.

use crate::error::{ArbiterError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// Upper bound of retained history points per entity
const MAX_HISTORY_POINTS: usize = 720;

/// One historical reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Source of instantaneous readings and short history
pub trait TelemetryProvider: Send + Sync {
    /// Current numeric state of an entity
    fn instant(&self, entity: &str) -> Result<f64>;

    /// Current raw state of an entity, numeric or not
    fn state(&self, entity: &str) -> Result<Value>;

    /// Unit of measurement, if the entity reports one
    fn unit(&self, entity: &str) -> Option<String>;

    /// Readings since `since`, oldest first
    fn series(&self, entity: &str, since: DateTime<Utc>) -> Result<Vec<Sample>>;
}

/// Wall clock used for history windows and forecast selection
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Interpret a raw state as a finite number
pub fn coerce_sample(raw: &Value) -> Option<f64> {
    let v = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}

#[derive(Debug, Default)]
struct EntityState {
    raw: Value,
    unit: Option<String>,
    history: VecDeque<Sample>,
}

/// In-memory telemetry fed by pushed readings
#[derive(Debug, Default)]
pub struct TelemetryStore {
    entities: RwLock<HashMap<String, EntityState>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading; numeric readings also extend the entity's history
    pub fn update(&self, entity: &str, raw: Value, unit: Option<String>, timestamp: DateTime<Utc>) {
        let mut entities = self
            .entities
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let state = entities.entry(entity.to_string()).or_default();
        if let Some(value) = coerce_sample(&raw) {
            state.history.push_back(Sample { timestamp, value });
            while state.history.len() > MAX_HISTORY_POINTS {
                state.history.pop_front();
            }
        }
        state.raw = raw;
        if unit.is_some() {
            state.unit = unit;
        }
    }

    /// Shorthand for a numeric reading taken now
    pub fn set(&self, entity: &str, value: f64) {
        self.update(entity, Value::from(value), None, Utc::now());
    }
}

impl TelemetryProvider for TelemetryStore {
    fn instant(&self, entity: &str) -> Result<f64> {
        let entities = self
            .entities
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let state = entities
            .get(entity)
            .ok_or_else(|| ArbiterError::telemetry(format!("no state for {}", entity)))?;
        coerce_sample(&state.raw).ok_or_else(|| {
            ArbiterError::telemetry(format!("non-numeric state for {}: {}", entity, state.raw))
        })
    }

    fn state(&self, entity: &str) -> Result<Value> {
        let entities = self
            .entities
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entities
            .get(entity)
            .map(|s| s.raw.clone())
            .ok_or_else(|| ArbiterError::telemetry(format!("no state for {}", entity)))
    }

    fn unit(&self, entity: &str) -> Option<String> {
        let entities = self
            .entities
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entities.get(entity).and_then(|s| s.unit.clone())
    }

    fn series(&self, entity: &str, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        let entities = self
            .entities
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entities
            .get(entity)
            .map(|s| {
                s.history
                    .iter()
                    .filter(|p| p.timestamp >= since)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Measured draw of a tracker in watts.
///
/// Power sensors (`W`, `kW`) are read directly. Energy counters are
/// differentiated over `window`: the current value against the oldest point
/// in the window, scaled to an hourly rate. An empty window yields 0.
pub fn consumption_rate(
    telemetry: &dyn TelemetryProvider,
    tracker: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<f64> {
    let current = telemetry.instant(tracker)?;

    match telemetry.unit(tracker).as_deref() {
        Some("W") => return Ok(current),
        Some("kW") => return Ok(current * 1000.0),
        _ => {}
    }

    let series = telemetry.series(tracker, now - window)?;
    let Some(first) = series.first() else {
        return Ok(0.0);
    };

    let elapsed = (now - first.timestamp).num_seconds();
    if elapsed <= 0 {
        return Err(ArbiterError::telemetry(format!(
            "no elapsed time in history of {}",
            tracker
        )));
    }

    Ok((current - first.value) / elapsed as f64 * 3600.0)
}
