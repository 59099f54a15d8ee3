//! Runtime data model shared by the arbiter components

use crate::consumer::ConsumerControl;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable handle of a registered consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsumerId(pub(crate) usize);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A shiftable big load
pub struct EnergyConsumer {
    group: String,
    name: String,
    phase: String,
    current: f64,
    control: Box<dyn ConsumerControl>,
}

impl EnergyConsumer {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        phase: impl Into<String>,
        current: f64,
        control: impl ConsumerControl + 'static,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            phase: phase.into(),
            current,
            control: Box::new(control),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Whether this load shares a circuit budget with others
    pub fn is_phase_constrained(&self) -> bool {
        !self.phase.is_empty()
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// Raise the rated current; lower values are ignored
    pub fn raise_current(&mut self, current: f64) -> bool {
        if current > self.current {
            self.current = current;
            true
        } else {
            false
        }
    }

    pub fn control(&self) -> &dyn ConsumerControl {
        self.control.as_ref()
    }
}

impl fmt::Debug for EnergyConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnergyConsumer")
            .field("group", &self.group)
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for EnergyConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

/// Runtime state of an active staged consumption
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveConsumptionState {
    /// Index into the definition's stage list
    pub stage: usize,
    /// Configured usage of that stage
    pub usage: f64,
    /// Most recently measured draw
    pub real_usage: f64,
}

/// Active staged consumptions grouped into priority buckets.
///
/// A bucket exists only while it holds at least one consumption.
#[derive(Debug, Clone, Default)]
pub struct ConsumptionStore {
    buckets: BTreeMap<i32, BTreeMap<String, ActiveConsumptionState>>,
}

impl ConsumptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, priority: i32, key: &str) -> Option<&ActiveConsumptionState> {
        self.buckets.get(&priority)?.get(key)
    }

    pub fn get_mut(&mut self, priority: i32, key: &str) -> Option<&mut ActiveConsumptionState> {
        self.buckets.get_mut(&priority)?.get_mut(key)
    }

    pub fn insert(&mut self, priority: i32, key: &str, state: ActiveConsumptionState) {
        self.buckets
            .entry(priority)
            .or_default()
            .insert(key.to_string(), state);
    }

    /// Remove a consumption, pruning its bucket when it becomes empty
    pub fn remove(&mut self, priority: i32, key: &str) -> Option<ActiveConsumptionState> {
        let bucket = self.buckets.get_mut(&priority)?;
        let removed = bucket.remove(key);
        if bucket.is_empty() {
            self.buckets.remove(&priority);
        }
        removed
    }

    /// Look a consumption up by key across all priorities
    pub fn find_by_key(&self, key: &str) -> Option<&ActiveConsumptionState> {
        self.buckets.values().find_map(|bucket| bucket.get(key))
    }

    /// First active consumption of strictly higher priority drawing more than `threshold`
    pub fn preempting(&self, priority: i32, threshold: f64) -> Option<(i32, &str, f64)> {
        self.buckets
            .range(..priority)
            .flat_map(|(p, bucket)| bucket.iter().map(move |(k, s)| (*p, k.as_str(), s)))
            .find(|(_, _, s)| s.real_usage > threshold)
            .map(|(p, k, s)| (p, k, s.real_usage))
    }

    /// All active consumptions, highest priority first
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str, &ActiveConsumptionState)> {
        self.buckets
            .iter()
            .flat_map(|(p, bucket)| bucket.iter().map(move |(k, s)| (*p, k.as_str(), s)))
    }

    pub fn has_bucket(&self, priority: i32) -> bool {
        self.buckets.contains_key(&priority)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ClosureControl;

    fn state(usage: f64, real_usage: f64) -> ActiveConsumptionState {
        ActiveConsumptionState {
            stage: 0,
            usage,
            real_usage,
        }
    }

    #[test]
    fn removing_last_entry_prunes_bucket() {
        let mut store = ConsumptionStore::new();
        store.insert(2, "heater", state(600.0, 580.0));
        assert!(store.has_bucket(2));
        assert_eq!(store.remove(2, "heater").map(|s| s.usage), Some(600.0));
        assert!(!store.has_bucket(2));
        assert!(store.is_empty());
        assert!(store.remove(2, "heater").is_none());
    }

    #[test]
    fn preempting_only_looks_at_higher_priorities() {
        let mut store = ConsumptionStore::new();
        store.insert(1, "pump", state(300.0, 100.0));
        store.insert(3, "heater", state(600.0, 600.0));

        assert_eq!(store.preempting(2, 50.0), Some((1, "pump", 100.0)));
        assert_eq!(store.preempting(1, 50.0), None);
        // Idle higher-priority consumption does not preempt
        store.get_mut(1, "pump").unwrap().real_usage = 20.0;
        assert_eq!(store.preempting(2, 50.0), None);
    }

    #[test]
    fn find_by_key_scans_all_buckets() {
        let mut store = ConsumptionStore::new();
        store.insert(5, "heater", state(600.0, 0.0));
        assert_eq!(store.find_by_key("heater").map(|s| s.usage), Some(600.0));
        assert!(store.find_by_key("pump").is_none());
    }

    #[test]
    fn consumer_current_only_increases() {
        let mut c = EnergyConsumer::new("garage", "wallbox", "L1", 11000.0, ClosureControl::new());
        assert!(!c.raise_current(6000.0));
        assert_eq!(c.current(), 11000.0);
        assert!(c.raise_current(16000.0));
        assert_eq!(c.current(), 16000.0);
        assert_eq!(c.to_string(), "garage/wallbox");
    }
}
