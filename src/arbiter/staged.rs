use crate::actuator::SwitchAddress;
use crate::config::{ConsumptionDefinition, ConsumptionMap};
use crate::error::Result;
use crate::model::ActiveConsumptionState;
use crate::telemetry::consumption_rate;
use crate::virtuals::{ActuatorEvent, EventValue};
use serde::Serialize;

/// The single state change a staged pass performed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StagedChange {
    Activated { key: String, stage: usize, usage: f64 },
    LeveledUp { key: String, from: usize, to: usize, usage: f64 },
    LeveledDown { key: String, from: usize, to: usize, usage: f64 },
    TurnedOff { key: String },
}

impl super::ConsumptionArbiter {
    /// Measured draw of a tracker in watts; 0 when it cannot be determined
    pub fn energy_consumption_rate(&self, tracker: &str) -> f64 {
        let window = chrono::Duration::minutes(i64::from(self.limits.tracker_window_minutes));
        consumption_rate(self.telemetry.as_ref(), tracker, self.clock.now(), window)
            .unwrap_or_else(|e| {
                self.logger
                    .warn(&format!("Consumption rate of {} unavailable: {}", tracker, e));
                0.0
            })
    }

    /// Refresh `real_usage` of every active consumption that has a tracker
    pub fn update_consumption_trackers(&mut self, consumption: &ConsumptionMap) {
        let active: Vec<(i32, String)> = self
            .consumptions
            .iter()
            .map(|(priority, key, _)| (priority, key.to_string()))
            .collect();

        for (priority, key) in active {
            let Some(tracker) = consumption.get(&key).and_then(|d| d.tracker.as_deref()) else {
                continue;
            };
            let rate = self.energy_consumption_rate(tracker);
            self.logger
                .debug(&format!("Energy consumption rate for {}: {:.2} W", key, rate));
            if let Some(state) = self.consumptions.get_mut(priority, &key) {
                state.real_usage = rate.max(0.0);
            }
        }
    }

    /// Run one staged pass; at most one consumption changes.
    ///
    /// While more than the export threshold flows to the grid the first
    /// eligible consumption in declaration order is activated or leveled up.
    /// Otherwise the first consumption whose measured draw exceeds what the
    /// panels still deliver is leveled down or switched off.
    pub fn manage_additional_consumption(
        &mut self,
        exported_watt: f64,
        panel_to_house_watt: f64,
        consumption: &ConsumptionMap,
    ) -> Option<StagedChange> {
        self.consume_more_if_surplus();

        if exported_watt > self.limits.export_threshold_w {
            self.grow_consumption(exported_watt, consumption)
        } else {
            self.reduce_consumption(panel_to_house_watt, consumption)
        }
    }

    /// Ask every consumer to draw more while the battery is full of solar energy
    fn consume_more_if_surplus(&self) {
        let telemetry = self.telemetry.as_ref();
        let battery_kwh = self.battery.current_capacity_kwh(telemetry);
        let pv_kwh = self.daily_energy(&self.sensors.pv_to_battery_daily);
        let grid_kwh = self.daily_energy(&self.sensors.grid_to_battery_daily);
        let advantage = pv_kwh - grid_kwh;

        // Battery filled from the grid is not a reason to consume more
        if advantage < self.limits.consume_more_pv_advantage_kwh {
            self.logger.debug(&format!(
                "PV advantage {:.3} kWh (pv {:.3}, grid {:.3}) too small for consume_more",
                advantage, pv_kwh, grid_kwh
            ));
            return;
        }
        if battery_kwh <= self.limits.consume_more_battery_kwh {
            self.logger.debug(&format!(
                "Battery charge {:.3} kWh too low for consume_more",
                battery_kwh
            ));
            return;
        }

        for consumer in &self.consumers {
            self.logger
                .info(&format!("Calling consume_more for {}", consumer));
            if let Err(e) = consumer.control().consume_more() {
                self.logger
                    .error(&format!("consume_more failed for {}: {}", consumer, e));
            }
        }
    }

    fn daily_energy(&self, sensor: &str) -> f64 {
        match self.telemetry.instant(sensor) {
            Ok(kwh) => kwh.max(0.0),
            Err(e) => {
                self.logger
                    .warn(&format!("Daily energy {} unavailable: {}", sensor, e));
                0.0
            }
        }
    }

    fn grow_consumption(
        &mut self,
        exported_watt: f64,
        consumption: &ConsumptionMap,
    ) -> Option<StagedChange> {
        for (key, definition) in consumption.iter() {
            if let Some((priority, blocker, real_usage)) = self
                .consumptions
                .preempting(definition.priority, self.limits.preempt_real_usage_w)
            {
                self.logger.debug(&format!(
                    "Skipping {}: priority {} consumption {} draws {:.0} W",
                    key, priority, blocker, real_usage
                ));
                continue;
            }

            match self.consumptions.get(definition.priority, key).copied() {
                // The first inactive candidate ends the pass, activated or not
                None => return self.activate(key, definition, exported_watt),
                Some(state) => {
                    if let Some(change) = self.level_up(key, definition, state, exported_watt) {
                        return Some(change);
                    }
                }
            }
        }
        None
    }

    fn activate(
        &mut self,
        key: &str,
        definition: &ConsumptionDefinition,
        exported_watt: f64,
    ) -> Option<StagedChange> {
        let (index, stage) = definition.lowest_stage()?;
        if stage.usage >= exported_watt {
            self.logger.debug(&format!(
                "Lowest stage of {} needs {:.0} W, only {:.0} W exported",
                key, stage.usage, exported_watt
            ));
            return None;
        }

        if let Err(e) = self.switch_on(&stage.switch) {
            self.logger
                .error(&format!("Failed to switch on {}: {}", stage.switch, e));
        }
        self.consumptions.insert(
            definition.priority,
            key,
            ActiveConsumptionState {
                stage: index,
                usage: stage.usage,
                real_usage: stage.usage,
            },
        );
        self.notify_usage(key, stage.usage);
        self.logger.info(&format!(
            "Activated {} at stage {} ({:.0} W)",
            key, index, stage.usage
        ));

        Some(StagedChange::Activated {
            key: key.to_string(),
            stage: index,
            usage: stage.usage,
        })
    }

    fn level_up(
        &mut self,
        key: &str,
        definition: &ConsumptionDefinition,
        state: ActiveConsumptionState,
        exported_watt: f64,
    ) -> Option<StagedChange> {
        let (to, next) = definition.next_stage_above(state.usage)?;
        let needed = next.usage - state.usage;
        if exported_watt <= needed {
            self.logger.debug(&format!(
                "Level-up of {} needs {:.0} W, only {:.0} W exported",
                key, needed, exported_watt
            ));
            return None;
        }

        let usage = next.usage;
        if !self.change_stage(key, definition, state, to) {
            return None;
        }
        self.logger
            .info(&format!("Leveled up {} to stage {} ({:.0} W)", key, to, usage));
        Some(StagedChange::LeveledUp {
            key: key.to_string(),
            from: state.stage,
            to,
            usage,
        })
    }

    fn reduce_consumption(
        &mut self,
        panel_to_house_watt: f64,
        consumption: &ConsumptionMap,
    ) -> Option<StagedChange> {
        let mut remaining = panel_to_house_watt;
        for (key, definition) in consumption.iter() {
            let Some(state) = self.consumptions.get(definition.priority, key).copied() else {
                continue;
            };
            remaining -= state.real_usage;
            if remaining < 0.0 {
                return self.reduce(key, definition, state, remaining);
            }
        }
        None
    }

    /// Level down when the next lower stage fits into `remaining`, otherwise switch off.
    ///
    /// `remaining` is the production left once this consumption's real usage is
    /// taken off, so it is negative whenever a reduction is due.
    fn reduce(
        &mut self,
        key: &str,
        definition: &ConsumptionDefinition,
        state: ActiveConsumptionState,
        remaining: f64,
    ) -> Option<StagedChange> {
        if let Some((to, lower)) = definition.next_stage_below(state.usage)
            && lower.usage < remaining
        {
            let usage = lower.usage;
            if !self.change_stage(key, definition, state, to) {
                return None;
            }
            self.logger.info(&format!(
                "Leveled down {} to stage {} ({:.0} W)",
                key, to, usage
            ));
            return Some(StagedChange::LeveledDown {
                key: key.to_string(),
                from: state.stage,
                to,
                usage,
            });
        }

        if !definition.can_be_turned_off {
            self.logger
                .info(&format!("{} cannot be turned off, keeping it", key));
            return None;
        }

        if let Some(stage) = definition.stages.get(state.stage)
            && let Err(e) = self.switch_off(&stage.switch)
        {
            self.logger.error(&format!(
                "Failed to switch off {} while turning off {}: {}",
                stage.switch, key, e
            ));
        }
        self.consumptions.remove(definition.priority, key);
        self.notify_usage(key, 0.0);
        self.logger.info(&format!("Turned off {}", key));

        Some(StagedChange::TurnedOff {
            key: key.to_string(),
        })
    }

    /// Move an active consumption to another stage.
    ///
    /// The old switch is released before the new one is engaged. When it cannot
    /// be released the change is abandoned so two stages never run together.
    fn change_stage(
        &mut self,
        key: &str,
        definition: &ConsumptionDefinition,
        state: ActiveConsumptionState,
        to: usize,
    ) -> bool {
        let (Some(from_stage), Some(to_stage)) =
            (definition.stages.get(state.stage), definition.stages.get(to))
        else {
            self.logger.error(&format!(
                "Stage {} or {} of {} no longer configured",
                state.stage, to, key
            ));
            return false;
        };

        if from_stage.switch != to_stage.switch {
            if let Err(e) = self.switch_off(&from_stage.switch) {
                self.logger.error(&format!(
                    "Failed to switch off {}, keeping {} at stage {}: {}",
                    from_stage.switch, key, state.stage, e
                ));
                return false;
            }
            if let Err(e) = self.switch_on(&to_stage.switch) {
                self.logger
                    .error(&format!("Failed to switch on {}: {}", to_stage.switch, e));
            }
        }

        if let Some(active) = self.consumptions.get_mut(definition.priority, key) {
            active.stage = to;
            active.usage = to_stage.usage;
        }
        self.notify_usage(key, to_stage.usage);
        true
    }

    /// Switch every configured stage off so the devices match the empty store
    pub fn reset_all_switches(&mut self, consumption: &ConsumptionMap) {
        for (key, definition) in consumption.iter() {
            for stage in &definition.stages {
                if let Err(e) = self.switch_off(&stage.switch) {
                    self.logger
                        .error(&format!("Failed to reset {}: {}", stage.switch, e));
                }
                if let SwitchAddress::Virtual(name) = SwitchAddress::parse(&stage.switch) {
                    self.notify_usage(name, 0.0);
                }
                self.logger
                    .debug(&format!("Disabled {} switch {}", key, stage.switch));
            }
        }
    }

    pub(crate) fn switch_on(&mut self, address: &str) -> Result<()> {
        match SwitchAddress::parse(address) {
            SwitchAddress::Virtual(name) => self.virtuals.turn_on(name, &self.consumptions),
            SwitchAddress::Physical(entity) => self.actuator.turn_on(entity),
        }
    }

    pub(crate) fn switch_off(&mut self, address: &str) -> Result<()> {
        match SwitchAddress::parse(address) {
            SwitchAddress::Virtual(name) => self.virtuals.turn_off(name, &self.consumptions),
            SwitchAddress::Physical(entity) => self.actuator.turn_off(entity),
        }
    }

    /// Tell the virtual actuator named after a consumption about its new usage
    fn notify_usage(&self, key: &str, watts: f64) {
        self.virtuals.dispatch(
            key,
            ActuatorEvent::UsageChange,
            EventValue::Watts(watts),
            &self.consumptions,
        );
    }

    /// Forward a telemetry sample to every switched-on virtual actuator
    pub fn broadcast_virtual(&self, event: ActuatorEvent, watts: f64) {
        self.virtuals
            .broadcast_to_switched_on(event, EventValue::Watts(watts), &self.consumptions);
    }
}
