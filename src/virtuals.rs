//! Virtual actuators
//!
//! A virtual actuator stands in for a device that cannot be driven by a plain
//! switch entity (a water heater whose power is set through a number entity,
//! for example). The arbiter switches it like any other stage; what actually
//! happens is decided by the handlers bound to its events.

use crate::actuator::ActuatorAdapter;
use crate::config::{VirtualAction, VirtualConfig};
use crate::error::{ArbiterError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::model::{ActiveConsumptionState, ConsumptionStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Events a virtual actuator can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorEvent {
    /// Switched on or off by the arbiter
    Switched,
    /// The configured usage of its consumption changed
    UsageChange,
    /// New exported power sample
    ExportedPowerUpdate,
    /// New imported power sample
    ImportedPowerUpdate,
}

impl ActuatorEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorEvent::Switched => "switched",
            ActuatorEvent::UsageChange => "usage_change",
            ActuatorEvent::ExportedPowerUpdate => "exported_power_update",
            ActuatorEvent::ImportedPowerUpdate => "imported_power_update",
        }
    }
}

impl fmt::Display for ActuatorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventValue {
    Flag(bool),
    Watts(f64),
}

impl EventValue {
    /// Numeric view; flags map to 1 and 0
    pub fn as_f64(&self) -> f64 {
        match self {
            EventValue::Flag(true) => 1.0,
            EventValue::Flag(false) => 0.0,
            EventValue::Watts(w) => *w,
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Flag(b) => write!(f, "{}", b),
            EventValue::Watts(w) => write!(f, "{}W", w),
        }
    }
}

/// What a handler gets to see
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub actuator: &'a str,
    pub event: ActuatorEvent,
    pub value: EventValue,
    /// Active staged consumption sharing the actuator's name, if any
    pub consumption: Option<&'a ActiveConsumptionState>,
}

pub type EventHandler = Box<dyn Fn(&EventContext<'_>) -> Result<()> + Send + Sync>;

#[derive(Default)]
struct VirtualActuator {
    switched: bool,
    events: BTreeMap<ActuatorEvent, EventHandler>,
}

/// Named virtual actuators and their event dispatch tables
pub struct VirtualActuatorRegistry {
    actuators: BTreeMap<String, VirtualActuator>,
    logger: StructuredLogger,
}

impl Default for VirtualActuatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VirtualActuatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, actuator) in &self.actuators {
            map.entry(name, &actuator.switched);
        }
        map.finish()
    }
}

impl VirtualActuatorRegistry {
    pub fn new() -> Self {
        Self {
            actuators: BTreeMap::new(),
            logger: get_logger("virtuals"),
        }
    }

    /// Build the registry from configured actions
    pub fn from_config(
        virtuals: &BTreeMap<String, VirtualConfig>,
        adapter: Arc<dyn ActuatorAdapter>,
    ) -> Self {
        let mut registry = Self::new();
        for (name, virtual_config) in virtuals {
            registry.declare(name);
            for (event, action) in &virtual_config.events {
                let handler = action_handler(name, action, adapter.clone());
                registry.on(name, *event, handler);
            }
        }
        registry
    }

    /// Declare an actuator without handlers; existing actuators are kept
    pub fn declare(&mut self, name: &str) {
        self.actuators.entry(name.to_string()).or_default();
    }

    /// Bind a handler, declaring the actuator when needed
    pub fn on(&mut self, name: &str, event: ActuatorEvent, handler: EventHandler) {
        self.actuators
            .entry(name.to_string())
            .or_default()
            .events
            .insert(event, handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actuators.contains_key(name)
    }

    pub fn is_switched(&self, name: &str) -> bool {
        self.actuators.get(name).is_some_and(|a| a.switched)
    }

    pub fn turn_on(&mut self, name: &str, store: &ConsumptionStore) -> Result<()> {
        self.switch(name, true, store)
    }

    pub fn turn_off(&mut self, name: &str, store: &ConsumptionStore) -> Result<()> {
        self.switch(name, false, store)
    }

    fn switch(&mut self, name: &str, on: bool, store: &ConsumptionStore) -> Result<()> {
        let actuator = self
            .actuators
            .get_mut(name)
            .ok_or_else(|| ArbiterError::actuator(format!("unknown virtual actuator {}", name)))?;
        actuator.switched = on;
        self.dispatch(name, ActuatorEvent::Switched, EventValue::Flag(on), store);
        Ok(())
    }

    /// Invoke the handler bound to `event`, if any; handler failures are logged
    pub fn dispatch(
        &self,
        name: &str,
        event: ActuatorEvent,
        value: EventValue,
        store: &ConsumptionStore,
    ) {
        let Some(handler) = self
            .actuators
            .get(name)
            .and_then(|actuator| actuator.events.get(&event))
        else {
            return;
        };

        let context = EventContext {
            actuator: name,
            event,
            value,
            consumption: store.find_by_key(name),
        };
        if let Err(e) = handler(&context) {
            self.logger.error(&format!(
                "Handler for {} on virtual actuator {} failed: {}",
                event, name, e
            ));
        }
    }

    /// Dispatch to every actuator that is currently switched on
    pub fn broadcast_to_switched_on(
        &self,
        event: ActuatorEvent,
        value: EventValue,
        store: &ConsumptionStore,
    ) {
        for (name, actuator) in &self.actuators {
            if actuator.switched {
                self.dispatch(name, event, value, store);
            }
        }
    }
}

fn action_handler(
    name: &str,
    action: &VirtualAction,
    adapter: Arc<dyn ActuatorAdapter>,
) -> EventHandler {
    match action {
        VirtualAction::Log { label } => {
            let label = label.clone().unwrap_or_else(|| name.to_string());
            let logger = get_logger("virtuals");
            Box::new(move |ctx: &EventContext<'_>| {
                logger.info(&format!("{}: {} = {}", label, ctx.event, ctx.value));
                Ok(())
            })
        }
        VirtualAction::Forward { entity, scale } => {
            let entity = entity.clone();
            let scale = *scale;
            Box::new(move |ctx: &EventContext<'_>| {
                adapter.set_value(&entity, ctx.value.as_f64() * scale)
            })
        }
    }
}
