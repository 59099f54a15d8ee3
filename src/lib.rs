//! # Surplus Arbiter - household solar surplus load arbitration
//!
//! Decides every tick which electrical loads may run on solar surplus: staged
//! consumptions (heaters, boilers) are leveled up while power flows to the
//! grid and leveled down when the panels stop covering them, and shiftable
//! loads (car chargers, appliances) are admitted against the battery budget
//! and per-phase current limits. Optionally the storage inverter is told
//! when to charge the battery from the grid.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: Structured logging and tracing
//! - `telemetry`: Sensor samples, clock and consumption rates
//! - `actuator`: Physical switch boundary
//! - `aggregator`: Per-cycle averaging of power samples
//! - `model`: Consumers and active consumption bookkeeping
//! - `phase`: Per-phase current ledger
//! - `virtuals`: Event-driven virtual actuators
//! - `battery`: Battery state and production forecast
//! - `ac_charging`: Grid charging of the home battery
//! - `consumer`: Consumer control hooks
//! - `arbiter`: Admission budget and staged consumption passes
//! - `manager`: Per-cycle orchestration
//! - `driver`: Tick loop and the stdin/stdout bridge

pub mod ac_charging;
pub mod actuator;
pub mod aggregator;
pub mod arbiter;
pub mod battery;
pub mod config;
pub mod consumer;
pub mod driver;
pub mod error;
pub mod logging;
pub mod manager;
pub mod model;
pub mod phase;
pub mod telemetry;
pub mod virtuals;

// Re-export commonly used types
pub use arbiter::{ConsumptionArbiter, StagedChange};
pub use config::Config;
pub use driver::EnergyDriver;
pub use error::{ArbiterError, Result};
pub use manager::{CycleReport, EnergyManager};
