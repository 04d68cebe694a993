//! Immutable game content: recipes, machines, and manual actions.
//!
//! Content is registered through [`CatalogBuilder`] and frozen by
//! [`CatalogBuilder::build`], which checks every cross-reference once so the
//! simulation never has to. Lookups on the frozen [`Catalog`] return
//! `Option`; callers on the tick path treat a miss as "contributes nothing".

use crate::fixed::{Fixed64, Millis};
use crate::id::{ActionKey, MachineKey, RecipeKey, ResourceKey, SkillKey};
use crate::ledger::ResourceBag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while building a catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate {kind} '{key}'")]
    Duplicate { kind: &'static str, key: String },

    #[error("machine '{machine}' runs unknown recipe '{recipe}'")]
    UnknownRecipe { machine: MachineKey, recipe: RecipeKey },

    #[error("{owner} has a negative amount for '{resource}'")]
    NegativeAmount { owner: String, resource: ResourceKey },

    #[error("{owner} has a negative power figure")]
    NegativePower { owner: String },

    #[error("action '{0}' has zero duration")]
    ZeroDuration(ActionKey),
}

// ---------------------------------------------------------------------------
// Content definitions
// ---------------------------------------------------------------------------

/// An automatic recipe. Amounts are per production unit; a machine type
/// with `count` instances runs it `count` times at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub inputs: ResourceBag,
    pub outputs: ResourceBag,
    /// Nominal cycle length. The production tick runs one cycle per tick.
    pub duration: Millis,
}

/// Fuel burned by a generator: one unit per generator instance per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelSpec {
    pub resource: ResourceKey,
    /// When false the fuel gates generation but is never deducted.
    pub consumed: bool,
}

impl FuelSpec {
    pub fn consumed(resource: impl Into<ResourceKey>) -> Self {
        Self {
            resource: resource.into(),
            consumed: true,
        }
    }

    pub fn unmetered(resource: impl Into<ResourceKey>) -> Self {
        Self {
            resource: resource.into(),
            consumed: false,
        }
    }
}

/// What a machine type does each tick. Generators feed the power budget;
/// the other three draw from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineRole {
    /// Produces `power_gen` per instance, optionally burning fuel.
    Generator {
        power_gen: Fixed64,
        fuel: Option<FuelSpec>,
    },
    /// Adds one unit of each listed resource per instance.
    Extractor {
        power: Fixed64,
        produces: Vec<ResourceKey>,
    },
    /// Runs each listed recipe independently.
    Fabricator {
        power: Fixed64,
        recipes: Vec<RecipeKey>,
    },
    /// Adds `rate` of `resource` per instance.
    Researcher {
        power: Fixed64,
        resource: ResourceKey,
        rate: Fixed64,
    },
}

/// Order in which consumer machine types claim power within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProductionPhase {
    Extraction,
    Fabrication,
    Research,
}

impl ProductionPhase {
    /// All phases in the order the tick walks them.
    pub const ORDER: [ProductionPhase; 3] = [
        ProductionPhase::Extraction,
        ProductionPhase::Fabrication,
        ProductionPhase::Research,
    ];
}

impl MachineRole {
    /// Power drawn per instance. Zero for generators.
    pub fn power_draw(&self) -> Fixed64 {
        match self {
            MachineRole::Generator { .. } => Fixed64::ZERO,
            MachineRole::Extractor { power, .. }
            | MachineRole::Fabricator { power, .. }
            | MachineRole::Researcher { power, .. } => *power,
        }
    }

    /// Power generated per instance. Zero for consumers.
    pub fn power_generation(&self) -> Fixed64 {
        match self {
            MachineRole::Generator { power_gen, .. } => *power_gen,
            _ => Fixed64::ZERO,
        }
    }

    /// The production phase this role runs in, or `None` for generators.
    pub fn phase(&self) -> Option<ProductionPhase> {
        match self {
            MachineRole::Generator { .. } => None,
            MachineRole::Extractor { .. } => Some(ProductionPhase::Extraction),
            MachineRole::Fabricator { .. } => Some(ProductionPhase::Fabrication),
            MachineRole::Researcher { .. } => Some(ProductionPhase::Research),
        }
    }
}

/// A machine type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub name: String,
    /// Tier 0 machines are buildable without any technology.
    pub tier: u32,
    pub role: MachineRole,
    /// Resources paid to build one more instance.
    pub build_cost: ResourceBag,
}

/// A manual action the player starts by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualActionSpec {
    pub name: String,
    pub duration: Millis,
    /// Paid in full when the action starts.
    pub cost: ResourceBag,
    /// Deposited when progress reaches 100.
    pub rewards: ResourceBag,
    /// Experience granted per skill on completion.
    pub xp: BTreeMap<SkillKey, u32>,
    /// Minimum skill levels before the action is offered.
    pub unlock_req: BTreeMap<SkillKey, u32>,
}

impl ManualActionSpec {
    /// A cost-free action with no skill interaction.
    pub fn new(name: impl Into<String>, duration: Millis) -> Self {
        Self {
            name: name.into(),
            duration,
            cost: ResourceBag::new(),
            rewards: ResourceBag::new(),
            xp: BTreeMap::new(),
            unlock_req: BTreeMap::new(),
        }
    }

    pub fn with_cost(mut self, cost: ResourceBag) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_rewards(mut self, rewards: ResourceBag) -> Self {
        self.rewards = rewards;
        self
    }

    pub fn with_xp(mut self, skill: impl Into<SkillKey>, amount: u32) -> Self {
        self.xp.insert(skill.into(), amount);
        self
    }

    pub fn with_unlock_req(mut self, skill: impl Into<SkillKey>, level: u32) -> Self {
        self.unlock_req.insert(skill.into(), level);
        self
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing an immutable [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    recipes: BTreeMap<RecipeKey, Recipe>,
    machines: BTreeMap<MachineKey, MachineSpec>,
    machine_order: Vec<MachineKey>,
    actions: BTreeMap<ActionKey, ManualActionSpec>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_recipe(
        &mut self,
        key: impl Into<RecipeKey>,
        recipe: Recipe,
    ) -> Result<&mut Self, CatalogError> {
        let key = key.into();
        if self.recipes.contains_key(&key) {
            return Err(CatalogError::Duplicate {
                kind: "recipe",
                key: key.0,
            });
        }
        self.recipes.insert(key, recipe);
        Ok(self)
    }

    pub fn register_machine(
        &mut self,
        key: impl Into<MachineKey>,
        machine: MachineSpec,
    ) -> Result<&mut Self, CatalogError> {
        let key = key.into();
        if self.machines.contains_key(&key) {
            return Err(CatalogError::Duplicate {
                kind: "machine",
                key: key.0,
            });
        }
        self.machine_order.push(key.clone());
        self.machines.insert(key, machine);
        Ok(self)
    }

    pub fn register_action(
        &mut self,
        key: impl Into<ActionKey>,
        action: ManualActionSpec,
    ) -> Result<&mut Self, CatalogError> {
        let key = key.into();
        if self.actions.contains_key(&key) {
            return Err(CatalogError::Duplicate {
                kind: "action",
                key: key.0,
            });
        }
        self.actions.insert(key, action);
        Ok(self)
    }

    /// Validate cross-references and freeze the catalog.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        for (key, recipe) in &self.recipes {
            let owner = format!("recipe '{key}'");
            check_bag(&owner, &recipe.inputs)?;
            check_bag(&owner, &recipe.outputs)?;
        }

        for (key, machine) in &self.machines {
            let owner = format!("machine '{key}'");
            check_bag(&owner, &machine.build_cost)?;
            let negative_power = match &machine.role {
                MachineRole::Generator { power_gen, .. } => *power_gen < Fixed64::ZERO,
                MachineRole::Researcher { power, rate, .. } => {
                    *power < Fixed64::ZERO || *rate < Fixed64::ZERO
                }
                role => role.power_draw() < Fixed64::ZERO,
            };
            if negative_power {
                return Err(CatalogError::NegativePower { owner });
            }
            if let MachineRole::Fabricator { recipes, .. } = &machine.role {
                for recipe in recipes {
                    if !self.recipes.contains_key(recipe) {
                        return Err(CatalogError::UnknownRecipe {
                            machine: key.clone(),
                            recipe: recipe.clone(),
                        });
                    }
                }
            }
        }

        for (key, action) in &self.actions {
            if action.duration == 0 {
                return Err(CatalogError::ZeroDuration(key.clone()));
            }
            let owner = format!("action '{key}'");
            check_bag(&owner, &action.cost)?;
            check_bag(&owner, &action.rewards)?;
        }

        Ok(Catalog {
            recipes: self.recipes,
            machines: self.machines,
            machine_order: self.machine_order,
            actions: self.actions,
        })
    }
}

fn check_bag(owner: &str, bag: &ResourceBag) -> Result<(), CatalogError> {
    match bag.first_negative() {
        Some((resource, _)) => Err(CatalogError::NegativeAmount {
            owner: owner.to_string(),
            resource: resource.clone(),
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable content tables. Frozen after [`CatalogBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    recipes: BTreeMap<RecipeKey, Recipe>,
    machines: BTreeMap<MachineKey, MachineSpec>,
    machine_order: Vec<MachineKey>,
    actions: BTreeMap<ActionKey, ManualActionSpec>,
}

impl Catalog {
    pub fn recipe(&self, key: &str) -> Option<&Recipe> {
        self.recipes.get(key)
    }

    pub fn machine(&self, key: &str) -> Option<&MachineSpec> {
        self.machines.get(key)
    }

    pub fn action(&self, key: &str) -> Option<&ManualActionSpec> {
        self.actions.get(key)
    }

    /// Machines in registration order.
    pub fn machines(&self) -> impl Iterator<Item = (&MachineKey, &MachineSpec)> {
        self.machine_order
            .iter()
            .filter_map(|key| self.machines.get(key).map(|spec| (key, spec)))
    }

    pub fn actions(&self) -> impl Iterator<Item = (&ActionKey, &ManualActionSpec)> {
        self.actions.iter()
    }

    pub fn recipes(&self) -> impl Iterator<Item = (&RecipeKey, &Recipe)> {
        self.recipes.iter()
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }
}
