//! Capabilities of shiftable loads
//!
//! The arbiter never knows how a load is actually switched. Callers hand it a
//! [`ConsumerControl`] when registering: either a bundle of closures or a
//! [`SwitchConsumer`] that drives a physical switch entity.

use crate::actuator::ActuatorAdapter;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use std::sync::Arc;

/// Hooks supplied by the owner of a shiftable load
pub trait ConsumerControl: Send + Sync {
    fn turn_on(&self) -> Result<()>;

    fn turn_off(&self) -> Result<()>;

    /// Whether activation may be postponed to a better moment
    fn can_be_delayed(&self) -> Result<bool>;

    /// Invitation to draw more power while surplus is plentiful
    fn consume_more(&self) -> Result<()>;
}

type Hook = Box<dyn Fn() -> Result<()> + Send + Sync>;
type DelayHook = Box<dyn Fn() -> Result<bool> + Send + Sync>;

/// Consumer control assembled from closures; unset hooks are no-ops
#[derive(Default)]
pub struct ClosureControl {
    turn_on: Option<Hook>,
    turn_off: Option<Hook>,
    can_be_delayed: Option<DelayHook>,
    consume_more: Option<Hook>,
}

impl ClosureControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_turn_on(mut self, f: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.turn_on = Some(Box::new(f));
        self
    }

    pub fn on_turn_off(mut self, f: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.turn_off = Some(Box::new(f));
        self
    }

    pub fn delayable(mut self, f: impl Fn() -> Result<bool> + Send + Sync + 'static) -> Self {
        self.can_be_delayed = Some(Box::new(f));
        self
    }

    pub fn on_consume_more(mut self, f: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.consume_more = Some(Box::new(f));
        self
    }
}

impl ConsumerControl for ClosureControl {
    fn turn_on(&self) -> Result<()> {
        self.turn_on.as_ref().map_or(Ok(()), |f| f())
    }

    fn turn_off(&self) -> Result<()> {
        self.turn_off.as_ref().map_or(Ok(()), |f| f())
    }

    fn can_be_delayed(&self) -> Result<bool> {
        self.can_be_delayed.as_ref().map_or(Ok(false), |f| f())
    }

    fn consume_more(&self) -> Result<()> {
        self.consume_more.as_ref().map_or(Ok(()), |f| f())
    }
}

/// A load switched on and off through one physical entity
pub struct SwitchConsumer {
    switch: String,
    delayable: bool,
    adapter: Arc<dyn ActuatorAdapter>,
    logger: StructuredLogger,
}

impl SwitchConsumer {
    pub fn new(switch: impl Into<String>, delayable: bool, adapter: Arc<dyn ActuatorAdapter>) -> Self {
        Self {
            switch: switch.into(),
            delayable,
            adapter,
            logger: get_logger("consumer"),
        }
    }

    pub fn switch(&self) -> &str {
        &self.switch
    }
}

impl ConsumerControl for SwitchConsumer {
    fn turn_on(&self) -> Result<()> {
        self.adapter.turn_on(&self.switch)
    }

    fn turn_off(&self) -> Result<()> {
        self.adapter.turn_off(&self.switch)
    }

    fn can_be_delayed(&self) -> Result<bool> {
        Ok(self.delayable)
    }

    fn consume_more(&self) -> Result<()> {
        self.logger
            .debug(&format!("{} has no way to consume more", self.switch));
        Ok(())
    }
}
