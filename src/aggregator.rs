//! Surplus telemetry averaging
//!
//! Samples stream in between control cycles; each cycle drains one average per
//! quantity. Non-numeric samples count as 0 so a flaky sensor pulls the
//! average down instead of stalling the cycle.

use crate::logging::{StructuredLogger, get_logger};
use crate::telemetry::coerce_sample;
use serde_json::Value;
use std::sync::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: u32,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn drain(&mut self) -> f64 {
        let average = if self.count == 0 {
            0.0
        } else {
            self.sum / f64::from(self.count)
        };
        *self = Accumulator::default();
        average
    }
}

/// Running averages of production, export and import
#[derive(Debug)]
pub struct PowerSampleAggregator {
    production: Mutex<Accumulator>,
    exported: Mutex<Accumulator>,
    imported: Mutex<Accumulator>,
    logger: StructuredLogger,
}

impl Default for PowerSampleAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSampleAggregator {
    pub fn new() -> Self {
        Self {
            production: Mutex::new(Accumulator::default()),
            exported: Mutex::new(Accumulator::default()),
            imported: Mutex::new(Accumulator::default()),
            logger: get_logger("aggregator"),
        }
    }

    /// Record a solar production sample; returns the value that was counted
    pub fn record_production(&self, sample: &Value) -> f64 {
        self.record(&self.production, "production", sample)
    }

    /// Record an exported power sample; returns the value that was counted
    pub fn record_exported(&self, sample: &Value) -> f64 {
        self.record(&self.exported, "exported", sample)
    }

    /// Record an imported power sample; returns the value that was counted
    pub fn record_imported(&self, sample: &Value) -> f64 {
        self.record(&self.imported, "imported", sample)
    }

    pub fn drain_average_production(&self) -> f64 {
        Self::drain(&self.production)
    }

    pub fn drain_average_exported(&self) -> f64 {
        Self::drain(&self.exported)
    }

    pub fn drain_average_imported(&self) -> f64 {
        Self::drain(&self.imported)
    }

    fn record(&self, slot: &Mutex<Accumulator>, quantity: &str, sample: &Value) -> f64 {
        let value = coerce_sample(sample).unwrap_or_else(|| {
            self.logger.warn(&format!(
                "Non-numeric {} sample {}, counting as 0",
                quantity, sample
            ));
            0.0
        });
        slot.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(value);
        value
    }

    fn drain(slot: &Mutex<Accumulator>) -> f64 {
        slot.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain()
    }
}
