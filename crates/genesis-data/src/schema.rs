//! Serde data file structs for game content definitions.
//!
//! These structs define the on-disk format for resources, recipes, machines,
//! manual actions, technologies, and the starting state. They are
//! deserialized from RON, JSON, or TOML data files and then resolved into
//! engine types by the loader. Names are plain strings here; the loader
//! checks every reference.

use serde::Deserialize;
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

// ===========================================================================
// Amounts
// ===========================================================================

/// A resource amount, as used by recipe sides, costs, and rewards.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountData {
    /// Short form: `("iron_ore", 1)`.
    Short(String, f64),
    /// Full form with explicit fields.
    Full { resource: String, amount: f64 },
}

impl AmountData {
    pub fn resource(&self) -> &str {
        match self {
            AmountData::Short(resource, _) | AmountData::Full { resource, .. } => resource,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            AmountData::Short(_, amount) | AmountData::Full { amount, .. } => *amount,
        }
    }
}

// ===========================================================================
// Resources
// ===========================================================================

/// A resource declaration. When a resources file is present every other file
/// may only reference declared resources.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceData {
    pub name: String,
}

// ===========================================================================
// Recipes
// ===========================================================================

/// An automatic recipe run by fabricator machines.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AmountData>,
    pub outputs: Vec<AmountData>,
    pub duration: u64,
}

// ===========================================================================
// Machines
// ===========================================================================

/// Generator fuel, supporting a short name form (burned 1:1) and a full form
/// that can mark the fuel as checked but not burned.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FuelData {
    /// Short form: `"coal"`, consumed.
    Short(String),
    /// Full form with explicit `consumed` flag.
    Full {
        resource: String,
        #[serde(default = "default_true")]
        consumed: bool,
    },
}

/// What a machine type does each tick.
#[derive(Debug, Clone, Deserialize)]
pub enum RoleData {
    Generator {
        power_gen: f64,
        #[serde(default)]
        fuel: Option<FuelData>,
    },
    Extractor {
        power: f64,
        produces: Vec<String>,
    },
    Fabricator {
        power: f64,
        recipes: Vec<String>,
    },
    Researcher {
        power: f64,
        resource: String,
        rate: f64,
    },
}

/// A machine type definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineData {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub tier: u32,
    pub role: RoleData,
    #[serde(default)]
    pub build_cost: Vec<AmountData>,
}

// ===========================================================================
// Manual actions
// ===========================================================================

/// A manual action definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionData {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(alias = "time")]
    pub duration: u64,
    #[serde(default)]
    pub cost: Vec<AmountData>,
    #[serde(default)]
    pub rewards: Vec<AmountData>,
    /// Experience per skill granted on completion.
    #[serde(default)]
    pub xp: BTreeMap<String, u32>,
    /// Minimum skill levels before the action is offered.
    #[serde(default)]
    pub unlock_req: BTreeMap<String, u32>,
}

// ===========================================================================
// Technologies
// ===========================================================================

/// What unlocking a technology grants.
#[derive(Debug, Clone, Deserialize)]
pub enum UnlockData {
    Machine(String),
    Action(String),
    Custom(String),
}

/// A technology definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct TechData {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub tier: u32,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub cost: Vec<AmountData>,
    #[serde(default)]
    pub unlocks: Vec<UnlockData>,
}

// ===========================================================================
// Starting state
// ===========================================================================

/// The player's state at the start of a new game.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitialStateData {
    #[serde(default)]
    pub resources: Vec<AmountData>,
    #[serde(default)]
    pub machines: Vec<(String, u32)>,
    /// Actions available from the start. When absent, every action that no
    /// technology grants starts unlocked.
    #[serde(default)]
    pub unlocked_actions: Option<Vec<String>>,
    #[serde(default)]
    pub unlocked_techs: Vec<String>,
}
