//! The automatic production tick.
//!
//! One call to [`run_tick`] is one atomic pass over the roster: generators
//! fill the power budget, then consumer machine types claim power and produce
//! phase by phase. Within a phase, machine types earlier in the roster claim
//! first. A machine type that cannot get its whole draw sits the tick out.

use crate::catalog::{Catalog, MachineRole};
use crate::fixed::{Fixed64, scale};
use crate::id::{MachineKey, RecipeKey};
use crate::ledger::{MAX_POWER, POWER, ResourceBag, ResourceLedger};
use crate::power::{GeneratorReport, PowerBudget, generate};
use crate::roster::MachineRoster;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use crate::catalog::ProductionPhase;

/// What one consumer machine type did during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineReport {
    pub machine: MachineKey,
    pub count: u32,
    pub phase: ProductionPhase,
    /// Whether the machine type got its full draw.
    pub powered: bool,
    pub draw: Fixed64,
    /// Recipes applied this tick.
    pub recipes_run: Vec<RecipeKey>,
    /// Recipes skipped because their scaled inputs were not available.
    pub recipes_starved: Vec<RecipeKey>,
}

/// Summary of one production tick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub budget: PowerBudget,
    pub generators: Vec<GeneratorReport>,
    pub machines: Vec<MachineReport>,
    /// Everything the tick removed from the ledger, fuel included.
    pub consumed: ResourceBag,
    /// Everything the tick added to the ledger, excluding the power gauges.
    pub produced: ResourceBag,
}

impl TickReport {
    /// Machine types that were denied power.
    pub fn unpowered(&self) -> impl Iterator<Item = &MachineKey> {
        self.machines.iter().filter(|m| !m.powered).map(|m| &m.machine)
    }

    /// Total draw of the machine types that were denied power.
    pub fn deficit(&self) -> Fixed64 {
        self.machines
            .iter()
            .filter(|m| !m.powered)
            .fold(Fixed64::ZERO, |acc, m| acc.saturating_add(m.draw))
    }
}

/// Run one production pass against the ledger.
///
/// Afterwards the ledger's `power` entry holds the power claimed and
/// `max_power` the power generated. Unknown machine or recipe keys contribute
/// nothing.
pub fn run_tick(
    ledger: &mut ResourceLedger,
    roster: &MachineRoster,
    catalog: &Catalog,
    tick: u64,
) -> TickReport {
    for (key, count) in roster.iter() {
        if count > 0 && catalog.machine(key.as_str()).is_none() {
            warn!(machine = %key, "skipping unknown machine type");
        }
    }

    let (mut budget, generators) = generate(ledger, roster, catalog);
    let mut report = TickReport {
        tick,
        ..TickReport::default()
    };
    for generator in &generators {
        if let Some((fuel, amount)) = &generator.fuel_burned {
            report.consumed.add(fuel.clone(), *amount);
        }
    }

    for phase in ProductionPhase::ORDER {
        for (key, count) in roster.iter() {
            if count == 0 {
                continue;
            }
            let Some(spec) = catalog.machine(key.as_str()) else {
                continue;
            };
            if spec.role.phase() != Some(phase) {
                continue;
            }

            let draw = scale(spec.role.power_draw(), count);
            let mut machine = MachineReport {
                machine: key.clone(),
                count,
                phase,
                powered: budget.try_allocate(draw),
                draw,
                recipes_run: Vec::new(),
                recipes_starved: Vec::new(),
            };
            if machine.powered {
                produce(ledger, catalog, &spec.role, &mut machine, &mut report);
            }
            report.machines.push(machine);
        }
    }

    ledger.set_gauge(POWER, budget.used);
    ledger.set_gauge(MAX_POWER, budget.generated);
    report.budget = budget;

    debug!(
        tick,
        generated = %budget.generated,
        used = %budget.used,
        unpowered = report.unpowered().count(),
        "production tick"
    );
    report
}

fn produce(
    ledger: &mut ResourceLedger,
    catalog: &Catalog,
    role: &MachineRole,
    machine: &mut MachineReport,
    report: &mut TickReport,
) {
    let count = machine.count;
    match role {
        MachineRole::Generator { .. } => {}
        MachineRole::Extractor { produces, .. } => {
            let amount = Fixed64::saturating_from_num(count);
            for resource in produces {
                ledger.deposit(resource.clone(), amount);
                report.produced.add(resource.clone(), amount);
            }
        }
        MachineRole::Fabricator { recipes, .. } => {
            for key in recipes {
                let Some(recipe) = catalog.recipe(key.as_str()) else {
                    warn!(machine = %machine.machine, recipe = %key, "skipping unknown recipe");
                    continue;
                };
                let inputs = recipe.inputs.scaled(count);
                let outputs = recipe.outputs.scaled(count);
                if ledger.try_exchange(&inputs, &outputs).is_ok() {
                    for (resource, amount) in inputs.iter() {
                        report.consumed.add(resource.clone(), amount);
                    }
                    for (resource, amount) in outputs.iter() {
                        report.produced.add(resource.clone(), amount);
                    }
                    machine.recipes_run.push(key.clone());
                } else {
                    machine.recipes_starved.push(key.clone());
                }
            }
        }
        MachineRole::Researcher { resource, rate, .. } => {
            let amount = scale(*rate, count);
            ledger.deposit(resource.clone(), amount);
            report.produced.add(resource.clone(), amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn power_gating_first_fit() {
        let catalog = power_catalog();
        let roster: MachineRoster = [("generator", 1u32), ("consumer_a", 1), ("consumer_b", 1)]
            .into_iter()
            .collect();
        let mut ledger = ResourceLedger::new();

        let report = run_tick(&mut ledger, &roster, &catalog, 1);

        assert_eq!(ledger.get(POWER), fixed(20));
        assert_eq!(ledger.get(MAX_POWER), fixed(30));
        let powered: Vec<bool> = report.machines.iter().map(|m| m.powered).collect();
        assert_eq!(powered, vec![true, false]);
        assert_eq!(ledger.get("gear"), fixed(1));
        assert_eq!(report.deficit(), fixed(20));
    }

    #[test]
    fn extraction_claims_power_before_fabrication() {
        let catalog = factory_catalog();
        // The smelter was built first but extraction still claims power first.
        let roster: MachineRoster = [("smelter", 1u32), ("miner_mk1", 1), ("coal_generator", 1)]
            .into_iter()
            .collect();
        let mut ledger: ResourceLedger = [("coal", fixed(1))].into_iter().collect();

        let report = run_tick(&mut ledger, &roster, &catalog, 1);

        let order: Vec<&str> = report.machines.iter().map(|m| m.machine.as_str()).collect();
        assert_eq!(order, vec!["miner_mk1", "smelter"]);
        assert!(report.machines[0].powered);
        assert!(!report.machines[1].powered);
        assert_eq!(ledger.get("iron_ore"), fixed(1));
        assert_eq!(ledger.get("coal"), Fixed64::ZERO);
    }

    #[test]
    fn recipe_is_all_or_nothing_scaled_by_count() {
        let catalog = factory_catalog();
        let roster: MachineRoster = [("solar_array", 1u32), ("smelter", 3)].into_iter().collect();
        let mut ledger: ResourceLedger = [("iron_ore", fixed(2))].into_iter().collect();

        let report = run_tick(&mut ledger, &roster, &catalog, 1);
        assert_eq!(ledger.get("iron_ore"), fixed(2));
        assert_eq!(ledger.get("iron_ingot"), Fixed64::ZERO);
        assert_eq!(report.machines[0].recipes_starved.len(), 1);

        ledger.deposit("iron_ore", fixed(1));
        let report = run_tick(&mut ledger, &roster, &catalog, 2);
        assert_eq!(ledger.get("iron_ore"), Fixed64::ZERO);
        assert_eq!(ledger.get("iron_ingot"), fixed(3));
        assert_eq!(report.machines[0].recipes_run.len(), 1);
    }

    #[test]
    fn research_adds_rate_times_count() {
        let catalog = factory_catalog();
        let roster: MachineRoster = [("solar_array", 1u32), ("research_lab", 2)].into_iter().collect();
        let mut ledger = ResourceLedger::new();

        run_tick(&mut ledger, &roster, &catalog, 1);
        run_tick(&mut ledger, &roster, &catalog, 2);
        assert_eq!(ledger.get("research_points"), fixed(4));
    }

    #[test]
    fn unknown_machine_contributes_nothing() {
        let catalog = factory_catalog();
        let roster: MachineRoster = [("quantum_forge", 5u32)].into_iter().collect();
        let mut ledger: ResourceLedger = [("iron_ore", fixed(3))].into_iter().collect();

        let report = run_tick(&mut ledger, &roster, &catalog, 1);
        assert!(report.machines.is_empty());
        assert_eq!(ledger.get("iron_ore"), fixed(3));
        assert_eq!(ledger.get(MAX_POWER), Fixed64::ZERO);
    }

    #[test]
    fn tick_report_balances_ledger_change() {
        let catalog = factory_catalog();
        let roster: MachineRoster = [
            ("coal_generator", 1u32),
            ("miner_mk1", 1),
            ("smelter", 1),
        ]
        .into_iter()
        .collect();
        let mut ledger: ResourceLedger = [("coal", fixed(3)), ("iron_ore", fixed(1))]
            .into_iter()
            .collect();
        let before = ledger.clone();

        let report = run_tick(&mut ledger, &roster, &catalog, 1);

        for resource in ["coal", "iron_ore", "iron_ingot"] {
            let expected = before.get(resource) + report.produced.get(resource)
                - report.consumed.get(resource);
            assert_eq!(ledger.get(resource), expected, "{resource}");
        }
    }
}
