mod common;

use common::{set_budget_sensors, setup};
use proptest::prelude::*;
use surplus_arbiter::config::Config;
use surplus_arbiter::consumer::ClosureControl;

const PHASES: [&str; 3] = ["L1", "L2", "L3"];

fn consumers() -> impl Strategy<Value = Vec<(usize, f64)>> {
    prop::collection::vec((0..PHASES.len(), 1000.0f64..12000.0), 2..8)
}

fn operations() -> impl Strategy<Value = Vec<(usize, bool)>> {
    prop::collection::vec((0usize..8, any::<bool>()), 1..40)
}

proptest! {
    #[test]
    fn phase_buckets_never_exceed_capacity(loads in consumers(), ops in operations()) {
        let mut s = setup(Config::default());
        set_budget_sensors(&s, 100.0, 0.0, 0.0);

        let mut ids = Vec::new();
        for (i, (phase, current)) in loads.iter().enumerate() {
            let id = s
                .manager
                .register_consumer("house", &format!("load{}", i), PHASES[*phase], *current, ClosureControl::new())
                .unwrap();
            ids.push(id);
        }

        for (index, turn_on) in ops {
            let id = ids[index % ids.len()];
            if turn_on {
                s.manager.turn_on_consumer(id);
            } else {
                s.manager.turn_off_consumer(id);
            }

            let arbiter = s.manager.arbiter();
            let phases = arbiter.phases();
            for (group, phase, load) in phases.buckets() {
                prop_assert!(
                    load <= phases.capacity(),
                    "{}/{} carries {} over capacity {}", group, phase, load, phases.capacity()
                );
            }
            for (id, consumer) in arbiter.consumers() {
                let entry = phases.entry(consumer.group(), consumer.phase(), consumer.name());
                prop_assert_eq!(arbiter.is_on(id), entry.is_some());
                if let Some(current) = entry {
                    prop_assert_eq!(current, consumer.current());
                }
            }
        }
    }

    #[test]
    fn refused_admission_leaves_ledger_untouched(current in 8000.0f64..15500.0) {
        let mut s = setup(Config::default());
        set_budget_sensors(&s, 100.0, 0.0, 0.0);

        let first = s
            .manager
            .register_consumer("garage", "wallbox", "L1", current, ClosureControl::new())
            .unwrap();
        let second = s
            .manager
            .register_consumer("garage", "heatpump", "L1", current, ClosureControl::new())
            .unwrap();

        prop_assert!(s.manager.turn_on_consumer(first));
        let before = s.manager.arbiter().phases().phase_load("garage", "L1");
        prop_assert!(!s.manager.turn_on_consumer(second));
        prop_assert_eq!(s.manager.arbiter().phases().phase_load("garage", "L1"), before);
        prop_assert!(!s.manager.arbiter().is_on(second));
    }
}
