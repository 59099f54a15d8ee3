//! Tick driver for the energy manager
//!
//! The driver owns the manager behind one async mutex. Every tick locks it
//! once and runs a whole control cycle, so cycles never interleave with
//! consumer requests. External inputs arrive as [`DriverCommand`]s.

use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::manager::{CycleReport, EnergyManager};
use crate::telemetry::TelemetryStore;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Duration, MissedTickBehavior, interval};

pub mod bridge;

/// Main driver state
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    /// Driver is initializing
    Initializing,
    /// Driver is running normally
    Running,
    /// Driver is shutting down
    ShuttingDown,
}

/// Commands accepted by the driver from external components
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    /// A telemetry reading
    Reading {
        entity: String,
        value: Value,
        unit: Option<String>,
        timestamp: Option<DateTime<Utc>>,
    },
    /// Ask for a shiftable load (`group/name`) to be switched on
    RequestOn { consumer: String },
    /// Switch a shiftable load off
    RequestOff { consumer: String },
    /// Raise the rated current of a shiftable load
    RaiseCurrent { consumer: String, current: f64 },
    /// Stop the driver loop
    Shutdown,
}

pub struct EnergyDriver {
    manager: Arc<Mutex<EnergyManager>>,
    telemetry: Arc<TelemetryStore>,
    state: watch::Sender<DriverState>,
    reports: watch::Sender<Option<CycleReport>>,
    commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
    tick: Duration,
    logger: StructuredLogger,
}

impl EnergyDriver {
    pub fn new(
        manager: EnergyManager,
        telemetry: Arc<TelemetryStore>,
        commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
    ) -> Self {
        let tick = Duration::from_secs(manager.config().tick_interval_seconds);
        let (state, _) = watch::channel(DriverState::Initializing);
        let (reports, _) = watch::channel(None);
        Self {
            manager: Arc::new(Mutex::new(manager)),
            telemetry,
            state,
            reports,
            commands_rx,
            tick,
            logger: get_logger("driver"),
        }
    }

    /// Shared handle to the manager
    pub fn manager(&self) -> Arc<Mutex<EnergyManager>> {
        self.manager.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Latest cycle report
    pub fn subscribe_reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.subscribe()
    }

    /// Run the driver main loop until shutdown is requested
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Starting driver loop, tick every {} s",
            self.tick.as_secs()
        ));
        self.manager.lock().await.start();
        self.state.send_replace(DriverState::Running);

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                cmd = self.commands_rx.recv() => match cmd {
                    Some(DriverCommand::Shutdown) | None => {
                        self.logger.info("Shutdown requested");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                }
            }
        }

        self.state.send_replace(DriverState::ShuttingDown);
        Ok(())
    }

    /// Run one control cycle under the manager lock
    pub async fn run_cycle(&self) -> CycleReport {
        let report = self.manager.lock().await.update();
        self.reports.send_replace(Some(report.clone()));
        report
    }

    pub async fn handle_command(&self, cmd: DriverCommand) {
        match cmd {
            DriverCommand::Reading {
                entity,
                value,
                unit,
                timestamp,
            } => {
                self.telemetry.update(
                    &entity,
                    value.clone(),
                    unit,
                    timestamp.unwrap_or_else(Utc::now),
                );
                self.manager.lock().await.ingest_reading(&entity, &value);
            }
            DriverCommand::RequestOn { consumer } => {
                let mut manager = self.manager.lock().await;
                match manager.find_consumer(&consumer) {
                    Some(id) => {
                        let switched = manager.turn_on_consumer(id);
                        self.logger
                            .debug(&format!("Request on for {}: {}", consumer, switched));
                    }
                    None => self.unknown_consumer(&consumer),
                }
            }
            DriverCommand::RequestOff { consumer } => {
                let mut manager = self.manager.lock().await;
                match manager.find_consumer(&consumer) {
                    Some(id) => manager.turn_off_consumer(id),
                    None => self.unknown_consumer(&consumer),
                }
            }
            DriverCommand::RaiseCurrent { consumer, current } => {
                let mut manager = self.manager.lock().await;
                match manager.find_consumer(&consumer) {
                    Some(id) => {
                        manager.raise_consumer_current(id, current);
                    }
                    None => self.unknown_consumer(&consumer),
                }
            }
            DriverCommand::Shutdown => {
                self.logger.debug("Shutdown is handled by the run loop");
            }
        }
    }

    fn unknown_consumer(&self, consumer: &str) {
        self.logger
            .warn(&format!("Request for unknown consumer '{}'", consumer));
    }
}
