//! Per-circuit current budget
//!
//! Consumers sharing a `(group, phase)` bucket sit on the same circuit. The
//! guard keeps a ledger of the currents admitted per bucket and refuses a new
//! admission that would push the bucket over its capacity.

use crate::logging::{StructuredLogger, get_logger};
use crate::model::EnergyConsumer;
use std::collections::BTreeMap;

/// Capacity of one phase bucket
pub const DEFAULT_PHASE_CAPACITY: f64 = 15500.0;

type PhaseMap = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone)]
pub struct PhaseCapacityGuard {
    ledger: BTreeMap<String, PhaseMap>,
    capacity: f64,
    logger: StructuredLogger,
}

impl Default for PhaseCapacityGuard {
    fn default() -> Self {
        Self::new(DEFAULT_PHASE_CAPACITY)
    }
}

impl PhaseCapacityGuard {
    pub fn new(capacity: f64) -> Self {
        Self {
            ledger: BTreeMap::new(),
            capacity,
            logger: get_logger("phase"),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Whether admitting `consumer` keeps its bucket within capacity.
    ///
    /// Consumers without a phase label always pass. The consumer's own entry,
    /// if present, is replaced by its current rating rather than counted twice.
    pub fn check(&self, consumer: &EnergyConsumer) -> bool {
        if !consumer.is_phase_constrained() {
            return true;
        }

        let others: f64 = self
            .ledger
            .get(consumer.group())
            .and_then(|phases| phases.get(consumer.phase()))
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(name, _)| name.as_str() != consumer.name())
                    .map(|(_, current)| *current)
                    .sum()
            })
            .unwrap_or(0.0);

        let total = others + consumer.current();
        if !total.is_finite() || total > self.capacity {
            self.logger.info(&format!(
                "Phase {}/{} would carry {} (capacity {}), refusing {}",
                consumer.group(),
                consumer.phase(),
                total,
                self.capacity,
                consumer
            ));
            return false;
        }
        true
    }

    /// Record the consumer's current in its bucket, overwriting a previous entry
    pub fn add(&mut self, consumer: &EnergyConsumer) {
        self.ledger
            .entry(consumer.group().to_string())
            .or_default()
            .entry(consumer.phase().to_string())
            .or_default()
            .insert(consumer.name().to_string(), consumer.current());
    }

    /// Drop the consumer's entry and prune emptied maps
    pub fn remove(&mut self, consumer: &EnergyConsumer) -> bool {
        let removed = match self.ledger.get_mut(consumer.group()) {
            Some(phases) => {
                let removed = match phases.get_mut(consumer.phase()) {
                    Some(entries) => {
                        let removed = entries.remove(consumer.name()).is_some();
                        if entries.is_empty() {
                            phases.remove(consumer.phase());
                        }
                        removed
                    }
                    None => false,
                };
                if phases.is_empty() {
                    self.ledger.remove(consumer.group());
                }
                removed
            }
            None => false,
        };

        if !removed {
            self.logger.debug(&format!(
                "{} not present in phase ledger, nothing to remove",
                consumer
            ));
        }
        removed
    }

    /// Summed current of one bucket
    pub fn phase_load(&self, group: &str, phase: &str) -> f64 {
        self.ledger
            .get(group)
            .and_then(|phases| phases.get(phase))
            .map(|entries| entries.values().sum())
            .unwrap_or(0.0)
    }

    /// Whether a bucket already carries more than the capacity
    pub fn is_overloaded(&self, group: &str, phase: &str) -> bool {
        self.phase_load(group, phase) > self.capacity
    }

    /// Ledger entry of a single consumer
    pub fn entry(&self, group: &str, phase: &str, name: &str) -> Option<f64> {
        self.ledger.get(group)?.get(phase)?.get(name).copied()
    }

    /// Every `(group, phase)` bucket with its summed current
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.ledger.iter().flat_map(|(group, phases)| {
            phases
                .iter()
                .map(move |(phase, entries)| (group.as_str(), phase.as_str(), entries.values().sum()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ClosureControl;

    fn consumer(group: &str, name: &str, phase: &str, current: f64) -> EnergyConsumer {
        EnergyConsumer::new(group, name, phase, current, ClosureControl::new())
    }

    #[test]
    fn unconstrained_consumers_always_pass() {
        let guard = PhaseCapacityGuard::default();
        assert!(guard.check(&consumer("house", "kettle", "", 1e9)));
    }

    #[test]
    fn check_refuses_overflowing_bucket() {
        let mut guard = PhaseCapacityGuard::default();
        guard.add(&consumer("house", "heater", "L1", 10000.0));
        assert!(guard.check(&consumer("house", "dryer", "L1", 5500.0)));
        assert!(!guard.check(&consumer("house", "dryer", "L1", 5501.0)));
        // Other phases and groups are separate buckets
        assert!(guard.check(&consumer("house", "dryer", "L2", 15500.0)));
        assert!(guard.check(&consumer("garage", "dryer", "L1", 15500.0)));
    }

    #[test]
    fn overload_is_reported_per_bucket() {
        let mut guard = PhaseCapacityGuard::new(10000.0);
        guard.add(&consumer("house", "heater", "L1", 6000.0));
        guard.add(&consumer("house", "dryer", "L1", 4000.0));
        assert!(!guard.is_overloaded("house", "L1"));
        guard.add(&consumer("house", "dryer", "L1", 4500.0));
        assert!(guard.is_overloaded("house", "L1"));
        assert!(!guard.is_overloaded("house", "L2"));
    }

    #[test]
    fn check_ignores_own_entry() {
        let mut guard = PhaseCapacityGuard::default();
        let heater = consumer("house", "heater", "L1", 15000.0);
        guard.add(&heater);
        assert!(guard.check(&heater));
    }

    #[test]
    fn non_finite_current_is_refused() {
        let guard = PhaseCapacityGuard::default();
        assert!(!guard.check(&consumer("house", "broken", "L1", f64::NAN)));
    }

    #[test]
    fn add_remove_remove_restores_empty_ledger() {
        let mut guard = PhaseCapacityGuard::default();
        let heater = consumer("house", "heater", "L1", 2000.0);
        guard.add(&heater);
        guard.add(&heater);
        assert_eq!(guard.phase_load("house", "L1"), 2000.0);
        assert!(guard.remove(&heater));
        assert!(!guard.remove(&heater));
        assert!(guard.is_empty());
    }

    #[test]
    fn remove_prunes_only_empty_branches() {
        let mut guard = PhaseCapacityGuard::default();
        let a = consumer("house", "a", "L1", 1000.0);
        let b = consumer("house", "b", "L2", 1000.0);
        guard.add(&a);
        guard.add(&b);
        guard.remove(&a);
        assert_eq!(guard.entry("house", "L1", "a"), None);
        assert_eq!(guard.entry("house", "L2", "b"), Some(1000.0));
        assert_eq!(guard.buckets().count(), 1);
    }
}
