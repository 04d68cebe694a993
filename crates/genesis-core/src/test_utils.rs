//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::catalog::*;
use crate::fixed::Fixed64;
use crate::ledger::{ResourceBag, ResourceLedger};
use crate::roster::MachineRoster;

// ===========================================================================
// Fixed-point helpers
// ===========================================================================

pub fn fixed(v: i32) -> Fixed64 {
    Fixed64::from_num(v)
}

pub fn bag(entries: &[(&str, i32)]) -> ResourceBag {
    entries.iter().map(|(k, v)| (*k, fixed(*v))).collect()
}

pub fn ledger(entries: &[(&str, i32)]) -> ResourceLedger {
    entries.iter().map(|(k, v)| (*k, fixed(*v))).collect()
}

// ===========================================================================
// Machine constructors
// ===========================================================================

pub fn make_generator(power_gen: i32, fuel: Option<FuelSpec>) -> MachineRole {
    MachineRole::Generator {
        power_gen: fixed(power_gen),
        fuel,
    }
}

pub fn make_extractor(power: i32, produces: &[&str]) -> MachineRole {
    MachineRole::Extractor {
        power: fixed(power),
        produces: produces.iter().map(|r| (*r).into()).collect(),
    }
}

pub fn make_fabricator(power: i32, recipes: &[&str]) -> MachineRole {
    MachineRole::Fabricator {
        power: fixed(power),
        recipes: recipes.iter().map(|r| (*r).into()).collect(),
    }
}

pub fn make_researcher(power: i32, resource: &str, rate: i32) -> MachineRole {
    MachineRole::Researcher {
        power: fixed(power),
        resource: resource.into(),
        rate: fixed(rate),
    }
}

pub fn machine(name: &str, tier: u32, role: MachineRole, build_cost: ResourceBag) -> MachineSpec {
    MachineSpec {
        name: name.to_string(),
        tier,
        role,
        build_cost,
    }
}

// ===========================================================================
// Catalogs
// ===========================================================================

/// One 30-power generator without fuel and two 20-power extractors.
pub fn power_catalog() -> Catalog {
    let mut builder = CatalogBuilder::new();
    builder
        .register_machine("generator", machine("Generator", 0, make_generator(30, None), bag(&[])))
        .and_then(|b| {
            b.register_machine(
                "consumer_a",
                machine("Gear Press", 0, make_extractor(20, &["gear"]), bag(&[])),
            )
        })
        .and_then(|b| {
            b.register_machine(
                "consumer_b",
                machine("Bolt Press", 0, make_extractor(20, &["bolt"]), bag(&[])),
            )
        })
        .expect("power fixtures register");
    builder.build().expect("power fixtures validate")
}

/// A small early-game factory:
///
/// | machine | tier | role | power |
/// |---|---|---|---|
/// | `coal_generator` | 0 | generator, burns coal | +10 |
/// | `biomass_burner` | 0 | generator, needs biomass | +30 |
/// | `solar_array` | 1 | generator | +100 |
/// | `miner_mk1` | 0 | extracts iron_ore | 6 |
/// | `smelter` | 1 | smelt_iron recipe | 8 |
/// | `research_lab` | 2 | research_points at 1 | 5 |
///
/// Manual actions: `mine_iron` (free, 3000 ms), `smelt_iron` (iron_ore 1 to
/// iron_ingot 1, 4000 ms, smithing xp), `craft_cable` (wire 2 to cable 1,
/// 2000 ms, needs crafting 2), `scrap_cable` (cable 1 to wire 2, 500 ms).
pub fn factory_catalog() -> Catalog {
    let mut builder = CatalogBuilder::new();
    register_factory(&mut builder).expect("factory fixtures register");
    builder.build().expect("factory fixtures validate")
}

fn register_factory(builder: &mut CatalogBuilder) -> Result<(), CatalogError> {
    builder.register_recipe(
        "smelt_iron",
        Recipe {
            inputs: bag(&[("iron_ore", 1)]),
            outputs: bag(&[("iron_ingot", 1)]),
            duration: 1000,
        },
    )?;

    builder.register_machine(
        "coal_generator",
        machine(
            "Coal Generator",
            0,
            make_generator(10, Some(FuelSpec::consumed("coal"))),
            bag(&[("iron_ingot", 3)]),
        ),
    )?;
    builder.register_machine(
        "biomass_burner",
        machine(
            "Biomass Burner",
            0,
            make_generator(30, Some(FuelSpec::unmetered("biomass"))),
            bag(&[("iron_ingot", 1)]),
        ),
    )?;
    builder.register_machine(
        "solar_array",
        machine("Solar Array", 1, make_generator(100, None), bag(&[("iron_ingot", 10)])),
    )?;
    builder.register_machine(
        "miner_mk1",
        machine("Miner Mk1", 0, make_extractor(6, &["iron_ore"]), bag(&[("iron_ingot", 2)])),
    )?;
    builder.register_machine(
        "smelter",
        machine("Smelter", 1, make_fabricator(8, &["smelt_iron"]), bag(&[("iron_ingot", 5)])),
    )?;
    builder.register_machine(
        "research_lab",
        machine(
            "Research Lab",
            2,
            make_researcher(5, "research_points", 1),
            bag(&[("iron_ingot", 8)]),
        ),
    )?;

    builder.register_action(
        "mine_iron",
        ManualActionSpec::new("Mine Iron", 3000)
            .with_rewards(bag(&[("iron_ore", 1)]))
            .with_xp("mining", 5),
    )?;
    builder.register_action(
        "smelt_iron",
        ManualActionSpec::new("Smelt Iron", 4000)
            .with_cost(bag(&[("iron_ore", 1)]))
            .with_rewards(bag(&[("iron_ingot", 1)]))
            .with_xp("smithing", 10),
    )?;
    builder.register_action(
        "craft_cable",
        ManualActionSpec::new("Craft Cable", 2000)
            .with_cost(bag(&[("wire", 2)]))
            .with_rewards(bag(&[("cable", 1)]))
            .with_xp("crafting", 8)
            .with_unlock_req("crafting", 2),
    )?;
    builder.register_action(
        "scrap_cable",
        ManualActionSpec::new("Scrap Cable", 500)
            .with_cost(bag(&[("cable", 1)]))
            .with_rewards(bag(&[("wire", 2)])),
    )?;
    Ok(())
}

/// Roster with `count` of every listed machine, in the order given.
pub fn roster(entries: &[(&str, u32)]) -> MachineRoster {
    entries.iter().map(|(k, c)| (*k, *c)).collect()
}
