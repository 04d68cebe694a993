//! Property-based tests for the Genesis core.
//!
//! Uses proptest to generate random rosters, ledgers, and interleavings of
//! production ticks with manual actions, then verify the ledger invariants.

use genesis_core::action::ManualActionEngine;
use genesis_core::fixed::Fixed64;
use genesis_core::ledger::{MAX_POWER, POWER, ResourceLedger};
use genesis_core::production::run_tick;
use genesis_core::roster::MachineRoster;
use genesis_core::test_utils::*;
use genesis_core::timer::{Scheduler, TimerTask};
use proptest::prelude::*;

const MACHINES: [&str; 6] = [
    "coal_generator",
    "biomass_burner",
    "solar_array",
    "miner_mk1",
    "smelter",
    "research_lab",
];

const ACTIONS: [&str; 4] = ["mine_iron", "smelt_iron", "craft_cable", "scrap_cable"];

const RESOURCES: [&str; 7] = [
    "coal",
    "biomass",
    "iron_ore",
    "iron_ingot",
    "wire",
    "cable",
    "research_points",
];

// ===========================================================================
// Generators
// ===========================================================================

fn arb_roster() -> impl Strategy<Value = MachineRoster> {
    proptest::collection::vec((0..MACHINES.len(), 0..6u32), 0..8).prop_map(|entries| {
        let mut roster = MachineRoster::new();
        for (i, count) in entries {
            roster.add(MACHINES[i], count);
        }
        roster
    })
}

fn arb_ledger() -> impl Strategy<Value = ResourceLedger> {
    proptest::collection::vec(0..20i32, RESOURCES.len()).prop_map(|amounts| {
        RESOURCES
            .iter()
            .zip(amounts)
            .map(|(k, v)| (*k, fixed(v)))
            .collect()
    })
}

#[derive(Debug, Clone)]
enum Op {
    Advance(u64),
    Perform(usize),
    ToggleLoop(usize),
    StopLoop,
}

fn arb_ops(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            (1..3000u64).prop_map(Op::Advance),
            (0..ACTIONS.len()).prop_map(Op::Perform),
            (0..ACTIONS.len()).prop_map(Op::ToggleLoop),
            Just(Op::StopLoop),
        ],
        1..=max_ops,
    )
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every quantity a tick changes is explained by its produced and
    /// consumed totals.
    #[test]
    fn tick_conserves_resources(roster in arb_roster(), mut ledger in arb_ledger()) {
        let catalog = factory_catalog();
        let before = ledger.clone();
        let report = run_tick(&mut ledger, &roster, &catalog, 1);

        for resource in RESOURCES {
            let expected = before.get(resource) + report.produced.get(resource)
                - report.consumed.get(resource);
            prop_assert_eq!(ledger.get(resource), expected);
        }
        prop_assert!(ledger.get(POWER) <= ledger.get(MAX_POWER));
    }

    /// No interleaving of ticks and actions drives anything negative, and at
    /// most one progress timer is ever armed.
    #[test]
    fn ticks_and_actions_stay_non_negative(
        roster in arb_roster(),
        mut ledger in arb_ledger(),
        ops in arb_ops(40),
    ) {
        let catalog = factory_catalog();
        let mut scheduler = Scheduler::new();
        let mut engine = ManualActionEngine::default();
        scheduler.schedule_repeating(TimerTask::ProductionTick, 1000);
        let mut tick = 0;

        for op in ops {
            match op {
                Op::Advance(dt) => {
                    let until = scheduler.now() + dt;
                    while let Some(fired) = scheduler.pop_due(until) {
                        if fired.task == TimerTask::ProductionTick {
                            tick += 1;
                            run_tick(&mut ledger, &roster, &catalog, tick);
                        } else {
                            engine.on_timer(fired, &mut ledger, &catalog, &mut scheduler);
                        }
                    }
                    scheduler.advance_clock(until);
                }
                Op::Perform(i) => {
                    let _ = engine.perform(ACTIONS[i], &mut ledger, &catalog, &mut scheduler);
                }
                Op::ToggleLoop(i) => {
                    let _ = engine.toggle_loop(ACTIONS[i], &mut ledger, &catalog, &mut scheduler);
                }
                Op::StopLoop => {
                    engine.stop_loop(&mut scheduler);
                }
            }

            prop_assert!(ledger.is_consistent());
            prop_assert!(ledger.iter().all(|(_, v)| v >= Fixed64::ZERO));
            // Production tick, at most one progress timer, at most one loop.
            prop_assert!(scheduler.len() <= 3);
        }
    }
}
