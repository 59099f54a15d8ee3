//! Physical actuator boundary
//!
//! Switch addresses prefixed `virtual.` resolve to the virtual actuator
//! registry; everything else is handed to an [`ActuatorAdapter`].

use crate::error::{ArbiterError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const VIRTUAL_PREFIX: &str = "virtual.";

/// Performs the physical effect of switching an entity
pub trait ActuatorAdapter: Send + Sync {
    fn turn_on(&self, entity: &str) -> Result<()>;
    fn turn_off(&self, entity: &str) -> Result<()>;
    fn set_value(&self, entity: &str, value: f64) -> Result<()>;
    fn select_option(&self, entity: &str, option: &str) -> Result<()>;
}

/// Where a switch address routes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAddress<'a> {
    /// Named virtual actuator (prefix stripped)
    Virtual(&'a str),
    /// Entity handled by the physical adapter
    Physical(&'a str),
}

impl<'a> SwitchAddress<'a> {
    pub fn parse(address: &'a str) -> Self {
        match address.strip_prefix(VIRTUAL_PREFIX) {
            Some(name) => SwitchAddress::Virtual(name),
            None => SwitchAddress::Physical(address),
        }
    }
}

/// A single instruction for the physical side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActuatorCommand {
    TurnOn { entity: String },
    TurnOff { entity: String },
    SetValue { entity: String, value: f64 },
    SelectOption { entity: String, option: String },
}

/// Adapter that queues commands on a channel for an external writer
#[derive(Debug, Clone)]
pub struct ChannelActuator {
    tx: mpsc::UnboundedSender<ActuatorCommand>,
}

impl ChannelActuator {
    pub fn new(tx: mpsc::UnboundedSender<ActuatorCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, command: ActuatorCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|e| ArbiterError::actuator(format!("command channel closed: {:?}", e.0)))
    }
}

impl ActuatorAdapter for ChannelActuator {
    fn turn_on(&self, entity: &str) -> Result<()> {
        self.send(ActuatorCommand::TurnOn {
            entity: entity.to_string(),
        })
    }

    fn turn_off(&self, entity: &str) -> Result<()> {
        self.send(ActuatorCommand::TurnOff {
            entity: entity.to_string(),
        })
    }

    fn set_value(&self, entity: &str, value: f64) -> Result<()> {
        self.send(ActuatorCommand::SetValue {
            entity: entity.to_string(),
            value,
        })
    }

    fn select_option(&self, entity: &str, option: &str) -> Result<()> {
        self.send(ActuatorCommand::SelectOption {
            entity: entity.to_string(),
            option: option.to_string(),
        })
    }
}
