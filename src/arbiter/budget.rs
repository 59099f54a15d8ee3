use crate::error::{ArbiterError, Result};
use crate::model::{ConsumerId, EnergyConsumer};

impl super::ConsumptionArbiter {
    /// Whether a shiftable load fits the current battery and PV budget.
    ///
    /// The ceiling starts at the full installation capacity. A battery above
    /// its minimum charge grants a fixed allowance and PV overproduction is
    /// added as a current equivalent. When the request exceeds that budget, or
    /// there is no budget and tomorrow's sun will refill the battery anyway, a
    /// delayable load is held back. Any failure means "not allowed".
    pub fn allowed_to_consume(&self, id: ConsumerId) -> bool {
        let Some(consumer) = self.consumers.get(id.0) else {
            self.logger.error(&format!("Unknown consumer {}", id));
            return false;
        };
        match self.try_allowed_to_consume(id, consumer) {
            Ok(allowed) => allowed,
            Err(e) => {
                self.logger.error(&format!(
                    "Budget check for {} failed, refusing: {}",
                    consumer, e
                ));
                false
            }
        }
    }

    fn try_allowed_to_consume(&self, id: ConsumerId, consumer: &EnergyConsumer) -> Result<bool> {
        let telemetry = self.telemetry.as_ref();
        let mut ceiling = self.limits.phase_capacity * f64::from(self.limits.phase_count);
        let mut budget = 0.0;

        let charge = self.battery.charge_percent(telemetry);
        if charge > self.limits.battery_budget_min_percent {
            budget += self.limits.battery_allowance;
        }

        let production = telemetry.instant(&self.sensors.solar_production)?;
        let to_battery = telemetry.instant(&self.sensors.solar_to_battery)?;
        let pv_overproduction = production - to_battery;
        if pv_overproduction > self.limits.pv_overproduction_min_w {
            // Rough current equivalent, scaled into the same unit as the allowance
            budget += pv_overproduction / self.limits.nominal_voltage * 1000.0;
        }

        let current_used: f64 = self
            .turned_on
            .iter()
            .filter(|other| **other != id)
            .filter_map(|other| self.consumers.get(other.0))
            .map(|other| other.current())
            .sum();
        let required = current_used + consumer.current();
        if !required.is_finite() || !budget.is_finite() {
            return Err(ArbiterError::admission(format!(
                "non-finite budget {} or requirement {}",
                budget, required
            )));
        }

        self.logger.debug(&format!(
            "Budget for {}: charge {:.1}%, pv overproduction {:.0} W, budget {:.0}, required {:.0}",
            consumer, charge, pv_overproduction, budget, required
        ));

        if budget > 0.0 {
            if required > budget && self.can_be_delayed(consumer) {
                ceiling = budget;
            }
        } else if self.can_be_delayed(consumer) {
            let tomorrow = self
                .forecast
                .estimated_production_tomorrow(telemetry, self.clock.now());
            let remaining = self.battery.remaining_capacity_kwh(telemetry);
            if tomorrow >= remaining {
                self.logger.debug(&format!(
                    "Forecast {:.2} kWh covers remaining battery capacity {:.2} kWh, deferring {}",
                    tomorrow, remaining, consumer
                ));
                ceiling = 0.0;
            }
        }

        Ok(required <= ceiling)
    }

    /// A failing capability counts as "cannot be delayed"
    fn can_be_delayed(&self, consumer: &EnergyConsumer) -> bool {
        consumer.control().can_be_delayed().unwrap_or_else(|e| {
            self.logger.error(&format!(
                "can_be_delayed failed for {}: {}",
                consumer, e
            ));
            false
        })
    }
}
