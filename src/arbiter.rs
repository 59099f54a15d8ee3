//! Consumption arbitration
//!
//! Two independent admission paths share one arbiter:
//!
//! - shiftable big loads ask to be switched on and are admitted against the
//!   battery/PV budget and their circuit's phase capacity (`budget.rs`);
//! - staged consumptions from the configuration are grown while power is
//!   exported and shrunk when the house draws more than the panels deliver
//!   (`staged.rs`).
//!
//! All methods are synchronous and expected to run inside one serialized
//! control cycle.

use crate::actuator::ActuatorAdapter;
use crate::battery::{BatteryModel, ForecastLookup};
use crate::config::{Config, LimitsConfig, SensorsConfig};
use crate::consumer::ConsumerControl;
use crate::error::{ArbiterError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::model::{ConsumerId, ConsumptionStore, EnergyConsumer};
use crate::phase::PhaseCapacityGuard;
use crate::telemetry::{Clock, TelemetryProvider};
use crate::virtuals::VirtualActuatorRegistry;
use std::collections::BTreeSet;
use std::sync::Arc;

mod budget;
mod staged;

pub use staged::StagedChange;

pub struct ConsumptionArbiter {
    limits: LimitsConfig,
    sensors: SensorsConfig,

    /// Registered shiftable loads, indexed by `ConsumerId`
    consumers: Vec<EnergyConsumer>,
    turned_on: BTreeSet<ConsumerId>,
    phases: PhaseCapacityGuard,

    /// Active staged consumptions
    consumptions: ConsumptionStore,
    virtuals: VirtualActuatorRegistry,

    telemetry: Arc<dyn TelemetryProvider>,
    actuator: Arc<dyn ActuatorAdapter>,
    battery: BatteryModel,
    forecast: ForecastLookup,
    clock: Arc<dyn Clock>,
    logger: StructuredLogger,
}

impl ConsumptionArbiter {
    pub fn new(
        config: &Config,
        telemetry: Arc<dyn TelemetryProvider>,
        actuator: Arc<dyn ActuatorAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let timezone = config.tz()?;
        Ok(Self {
            limits: config.limits.clone(),
            sensors: config.sensors.clone(),
            consumers: Vec::new(),
            turned_on: BTreeSet::new(),
            phases: PhaseCapacityGuard::new(config.limits.phase_capacity),
            consumptions: ConsumptionStore::new(),
            virtuals: VirtualActuatorRegistry::from_config(&config.virtuals, actuator.clone()),
            battery: BatteryModel::new(&config.sensors, &config.limits),
            forecast: ForecastLookup::new(&config.sensors, &config.limits, timezone),
            telemetry,
            actuator,
            clock,
            logger: get_logger("arbiter"),
        })
    }

    /// Register a shiftable load; `(group, name)` must be unique
    pub fn register_consumer(
        &mut self,
        group: &str,
        name: &str,
        phase: &str,
        current: f64,
        control: impl ConsumerControl + 'static,
    ) -> Result<ConsumerId> {
        if self.find_consumer(group, name).is_some() {
            return Err(ArbiterError::validation(
                "consumer".to_string(),
                format!("{}/{} is already registered", group, name),
            ));
        }

        let id = ConsumerId(self.consumers.len());
        let consumer = EnergyConsumer::new(group, name, phase, current, control);
        self.logger
            .info(&format!("Registered consumer {} as {}", consumer, id));
        self.consumers.push(consumer);
        Ok(id)
    }

    /// Admit and switch on a shiftable load.
    ///
    /// Returns whether this call switched it on. An already running consumer
    /// is left alone.
    pub fn turn_on_consumer(&mut self, id: ConsumerId) -> bool {
        let Some(consumer) = self.consumers.get(id.0) else {
            self.logger.error(&format!("Unknown consumer {}", id));
            return false;
        };

        if self.turned_on.contains(&id) {
            self.logger
                .debug(&format!("Consumer {} already turned on, skipping", consumer));
            return false;
        }

        if consumer.is_phase_constrained() && !self.phases.check(consumer) {
            self.logger
                .info(&format!("Phase check failed for {}", consumer));
            return false;
        }

        if !self.allowed_to_consume(id) {
            self.logger
                .info(&format!("Not allowed to consume for {}", consumer));
            return false;
        }

        if consumer.is_phase_constrained() {
            self.phases.add(consumer);
        }
        if let Err(e) = consumer.control().turn_on() {
            self.logger
                .error(&format!("Failed to turn on {}: {}", consumer, e));
        }
        self.turned_on.insert(id);
        self.logger.info(&format!("Turned on {}", consumer));
        true
    }

    /// Switch a shiftable load off and release its budget
    pub fn turn_off_consumer(&mut self, id: ConsumerId) {
        let Some(consumer) = self.consumers.get(id.0) else {
            self.logger.error(&format!("Unknown consumer {}", id));
            return;
        };

        if let Err(e) = consumer.control().turn_off() {
            self.logger
                .error(&format!("Failed to turn off {}: {}", consumer, e));
        }

        if !self.turned_on.remove(&id) {
            self.logger.debug(&format!(
                "Consumer {} was not turned on, nothing to release",
                consumer
            ));
            return;
        }
        if consumer.is_phase_constrained() {
            self.phases.remove(consumer);
        }
        self.logger.info(&format!("Turned off {}", consumer));
    }

    /// Raise the rated current of a consumer; returns whether it changed.
    ///
    /// A running phase-constrained consumer has its ledger entry updated too,
    /// even when that pushes its bucket past capacity.
    pub fn raise_consumer_current(&mut self, id: ConsumerId, current: f64) -> bool {
        let Some(consumer) = self.consumers.get_mut(id.0) else {
            self.logger.error(&format!("Unknown consumer {}", id));
            return false;
        };
        if !consumer.raise_current(current) {
            return false;
        }
        if self.turned_on.contains(&id) && consumer.is_phase_constrained() {
            self.phases.add(consumer);
            if self.phases.is_overloaded(consumer.group(), consumer.phase()) {
                self.logger.warn(&format!(
                    "Phase {}/{} carries {} after raising {}, above capacity {}",
                    consumer.group(),
                    consumer.phase(),
                    self.phases.phase_load(consumer.group(), consumer.phase()),
                    consumer,
                    self.phases.capacity()
                ));
            }
        }
        self.logger
            .info(&format!("Raised current of {} to {}", consumer, current));
        true
    }

    pub fn find_consumer(&self, group: &str, name: &str) -> Option<ConsumerId> {
        self.consumers
            .iter()
            .position(|c| c.group() == group && c.name() == name)
            .map(ConsumerId)
    }

    pub fn consumer(&self, id: ConsumerId) -> Option<&EnergyConsumer> {
        self.consumers.get(id.0)
    }

    pub fn consumers(&self) -> impl Iterator<Item = (ConsumerId, &EnergyConsumer)> {
        self.consumers
            .iter()
            .enumerate()
            .map(|(i, c)| (ConsumerId(i), c))
    }

    pub fn is_on(&self, id: ConsumerId) -> bool {
        self.turned_on.contains(&id)
    }

    pub fn phases(&self) -> &PhaseCapacityGuard {
        &self.phases
    }

    pub fn consumptions(&self) -> &ConsumptionStore {
        &self.consumptions
    }

    pub fn virtuals(&self) -> &VirtualActuatorRegistry {
        &self.virtuals
    }

    /// Access for binding programmatic event handlers
    pub fn virtuals_mut(&mut self) -> &mut VirtualActuatorRegistry {
        &mut self.virtuals
    }
}
