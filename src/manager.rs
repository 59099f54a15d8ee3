//! Energy manager facade
//!
//! Wires the aggregator and the arbiter to one configuration and exposes the
//! operations the outside world needs: telemetry intake between cycles, one
//! `update` per cycle, and on/off requests for shiftable loads. When grid
//! charging is enabled the storage inverter is driven from the same cycle.

use crate::ac_charging::{AcChargingManager, StorageMode};
use crate::actuator::ActuatorAdapter;
use crate::arbiter::{ConsumptionArbiter, StagedChange};
use crate::aggregator::PowerSampleAggregator;
use crate::config::Config;
use crate::consumer::{ConsumerControl, SwitchConsumer};
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::model::ConsumerId;
use crate::telemetry::{Clock, TelemetryProvider};
use crate::virtuals::ActuatorEvent;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Outcome of one control cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub exported_watt: f64,
    pub imported_watt: f64,
    pub panel_to_house_watt: f64,
    pub change: Option<StagedChange>,
    /// Storage inverter mode, when grid charging is enabled and decidable
    pub storage_mode: Option<StorageMode>,
}

pub struct EnergyManager {
    config: Config,
    aggregator: PowerSampleAggregator,
    arbiter: ConsumptionArbiter,
    ac_charging: Option<AcChargingManager>,
    logger: StructuredLogger,
}

impl EnergyManager {
    /// Validate the configuration and register its declared consumers
    pub fn new(
        config: Config,
        telemetry: Arc<dyn TelemetryProvider>,
        actuator: Arc<dyn ActuatorAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let logger = get_logger("manager");

        let ac_charging = if config.ac_charging.enabled {
            Some(AcChargingManager::new(
                &config,
                telemetry.clone(),
                actuator.clone(),
                clock.clone(),
            )?)
        } else {
            None
        };

        let mut arbiter = ConsumptionArbiter::new(&config, telemetry, actuator.clone(), clock)?;
        for consumer in &config.consumers {
            arbiter.register_consumer(
                &consumer.group,
                &consumer.name,
                &consumer.phase,
                consumer.current,
                SwitchConsumer::new(&consumer.switch, consumer.can_be_delayed, actuator.clone()),
            )?;
        }

        logger.info(&format!(
            "Energy manager ready: {} staged consumptions, {} virtual actuators, {} consumers, grid charging {}",
            config.consumption.len(),
            config.virtuals.len(),
            config.consumers.len(),
            if ac_charging.is_some() { "on" } else { "off" }
        ));

        Ok(Self {
            config,
            aggregator: PowerSampleAggregator::new(),
            arbiter,
            ac_charging,
            logger,
        })
    }

    /// Bring the devices in line with the empty in-memory state
    pub fn start(&mut self) {
        if let Some(ac_charging) = self.ac_charging.as_mut() {
            ac_charging.start();
        }
        self.logger.info("Switching off all configured stages");
        self.arbiter.reset_all_switches(&self.config.consumption);
    }

    pub fn record_production(&self, sample: &Value) -> f64 {
        self.aggregator.record_production(sample)
    }

    pub fn record_exported(&self, sample: &Value) -> f64 {
        let watts = self.aggregator.record_exported(sample);
        self.arbiter
            .broadcast_virtual(ActuatorEvent::ExportedPowerUpdate, watts);
        watts
    }

    pub fn record_imported(&self, sample: &Value) -> f64 {
        let watts = self.aggregator.record_imported(sample);
        self.arbiter
            .broadcast_virtual(ActuatorEvent::ImportedPowerUpdate, watts);
        watts
    }

    /// Feed a reading of one of the configured power sensors to the aggregator.
    ///
    /// Returns false when the entity is not one of them. Readings of enforced
    /// inverter entities are checked against their desired value first.
    pub fn ingest_reading(&self, entity: &str, raw: &Value) -> bool {
        if let Some(ac_charging) = &self.ac_charging {
            ac_charging.reconcile(entity, raw);
        }
        let sensors = &self.config.sensors;
        if entity == sensors.solar_production {
            self.record_production(raw);
        } else if entity == sensors.exported_power {
            self.record_exported(raw);
        } else if entity == sensors.imported_power {
            self.record_imported(raw);
        } else {
            return false;
        }
        true
    }

    /// Run one control cycle
    pub fn update(&mut self) -> CycleReport {
        let cycle_id = uuid::Uuid::new_v4().to_string();
        let logger = self.logger.for_cycle(&cycle_id);
        logger.debug("Update started");
        let started = std::time::Instant::now();

        self.arbiter
            .update_consumption_trackers(&self.config.consumption);

        let panel_to_house_watt = self.aggregator.drain_average_production();
        let exported_watt = self.aggregator.drain_average_exported();
        let imported_watt = self.aggregator.drain_average_imported();

        logger.info(&format!(
            "Checking additional consumption, exported {:.2} W, imported {:.2} W, produced {:.2} W",
            exported_watt, imported_watt, panel_to_house_watt
        ));

        let storage_mode = self.ac_charging.as_mut().and_then(|ac| match ac.manage() {
            Ok(mode) => Some(mode),
            Err(e) => {
                logger.error(&format!("Grid charging skipped: {}", e));
                None
            }
        });
        if let Some(mode) = storage_mode {
            logger.info(&format!("Storage mode: {}", mode));
        }

        let change = self.arbiter.manage_additional_consumption(
            exported_watt,
            panel_to_house_watt,
            &self.config.consumption,
        );
        if let Some(change) = &change {
            logger.info(&format!("Staged change: {:?}", change));
        }

        logger.debug(&format!(
            "Update completed in {} ms",
            started.elapsed().as_millis()
        ));

        CycleReport {
            cycle_id,
            exported_watt,
            imported_watt,
            panel_to_house_watt,
            change,
            storage_mode,
        }
    }

    pub fn register_consumer(
        &mut self,
        group: &str,
        name: &str,
        phase: &str,
        current: f64,
        control: impl ConsumerControl + 'static,
    ) -> Result<ConsumerId> {
        self.arbiter
            .register_consumer(group, name, phase, current, control)
    }

    pub fn turn_on_consumer(&mut self, id: ConsumerId) -> bool {
        self.arbiter.turn_on_consumer(id)
    }

    pub fn turn_off_consumer(&mut self, id: ConsumerId) {
        self.arbiter.turn_off_consumer(id)
    }

    pub fn raise_consumer_current(&mut self, id: ConsumerId, current: f64) -> bool {
        self.arbiter.raise_consumer_current(id, current)
    }

    /// Resolve a `group/name` reference
    pub fn find_consumer(&self, reference: &str) -> Option<ConsumerId> {
        let (group, name) = reference.split_once('/')?;
        self.arbiter.find_consumer(group, name)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn arbiter(&self) -> &ConsumptionArbiter {
        &self.arbiter
    }

    pub fn arbiter_mut(&mut self) -> &mut ConsumptionArbiter {
        &mut self.arbiter
    }

    pub fn ac_charging(&self) -> Option<&AcChargingManager> {
        self.ac_charging.as_ref()
    }
}
