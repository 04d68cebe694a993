//! Tech Tree Module for the Genesis idle-factory engine.
//!
//! Provides technologies with prerequisites and resource costs, and the
//! progression predicates that decide what the player may build and do.
//!
//! # Overview
//!
//! Technologies are registered at startup via [`TechTree::register`]. Each
//! [`TechSpec`] has prerequisites, a cost paid from the resource ledger, and a
//! list of [`Unlock`]s. Definitions are immutable; which technologies the
//! player owns lives separately in [`UnlockedTechs`], so the tree can be shared
//! between sessions.
//!
//! Unlocking is a single step: [`TechTree::unlock`] checks prerequisites and
//! cost, deducts the cost, records the technology, and returns what it
//! unlocked. Any failed check leaves both the ledger and the unlocked set
//! untouched.
//!
//! Skill levels, which gate manual actions, live in [`skills`].

pub mod skills;

use genesis_core::id::{ActionKey, MachineKey, TechKey};
use genesis_core::ledger::{LedgerError, ResourceBag, ResourceLedger};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

// ---------------------------------------------------------------------------
// Unlocks
// ---------------------------------------------------------------------------

/// What unlocking a technology grants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unlock {
    /// Makes a machine type buildable.
    Machine(MachineKey),

    /// Adds a manual action to the unlocked-action registry.
    Action(ActionKey),

    /// Game-defined unlock. The string key is opaque to the engine;
    /// game code interprets it.
    Custom(String),
}

/// The unlocks granted by one successful [`TechTree::unlock`], split by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockOutcome {
    pub tech: TechKey,
    pub machines: Vec<MachineKey>,
    pub actions: Vec<ActionKey>,
    pub custom: Vec<String>,
}

// ---------------------------------------------------------------------------
// Technology definition
// ---------------------------------------------------------------------------

/// A technology. Registered at startup; immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechSpec {
    /// Human-readable name.
    pub name: String,

    /// Display grouping. Has no effect on unlock rules.
    pub tier: u32,

    /// Technologies that must be unlocked first.
    pub prerequisites: Vec<TechKey>,

    /// Paid in full from the ledger on unlock.
    pub cost: ResourceBag,

    pub unlocks: Vec<Unlock>,
}

impl TechSpec {
    pub fn new(name: impl Into<String>, tier: u32) -> Self {
        Self {
            name: name.into(),
            tier,
            prerequisites: Vec::new(),
            cost: ResourceBag::new(),
            unlocks: Vec::new(),
        }
    }

    pub fn with_prerequisite(mut self, tech: impl Into<TechKey>) -> Self {
        self.prerequisites.push(tech.into());
        self
    }

    pub fn with_cost(mut self, cost: ResourceBag) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_unlock(mut self, unlock: Unlock) -> Self {
        self.unlocks.push(unlock);
        self
    }
}

// ---------------------------------------------------------------------------
// Player state
// ---------------------------------------------------------------------------

/// The set of technologies the player has unlocked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnlockedTechs(BTreeSet<TechKey>);

impl UnlockedTechs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, tech: &str) -> bool {
        self.0.contains(tech)
    }

    /// Record a technology. Returns false if it was already present.
    pub fn insert(&mut self, tech: impl Into<TechKey>) -> bool {
        self.0.insert(tech.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TechKey> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<TechKey>> FromIterator<K> for UnlockedTechs {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Where a technology stands for the player right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TechStatus {
    Unlocked,
    /// Some prerequisites are still locked.
    Locked { missing: Vec<TechKey> },
    /// Prerequisites are met but the cost cannot be paid.
    Unaffordable,
    Available,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during tech tree operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TechTreeError {
    #[error("technology not found: {0}")]
    TechNotFound(TechKey),

    #[error("technology {0} is already unlocked")]
    AlreadyUnlocked(TechKey),

    #[error("prerequisite not met: {tech} requires {prereq}")]
    PrerequisiteNotMet { tech: TechKey, prereq: TechKey },

    #[error("duplicate technology: {0}")]
    DuplicateTech(TechKey),

    #[error("prerequisite {prereq} for technology {tech} does not exist")]
    InvalidPrerequisite { tech: TechKey, prereq: TechKey },

    #[error(transparent)]
    Insufficient(#[from] LedgerError),
}

// ---------------------------------------------------------------------------
// TechTree
// ---------------------------------------------------------------------------

/// Technology definitions in registration order.
#[derive(Debug, Clone, Default)]
pub struct TechTree {
    technologies: HashMap<TechKey, TechSpec>,
    order: Vec<TechKey>,
}

impl TechTree {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Registration API --

    /// Register a technology. Prerequisites must already be registered, which
    /// also rules out cycles.
    pub fn register(
        &mut self,
        key: impl Into<TechKey>,
        tech: TechSpec,
    ) -> Result<(), TechTreeError> {
        let key = key.into();
        if self.technologies.contains_key(&key) {
            return Err(TechTreeError::DuplicateTech(key));
        }
        for prereq in &tech.prerequisites {
            if !self.technologies.contains_key(prereq) {
                return Err(TechTreeError::InvalidPrerequisite {
                    tech: key,
                    prereq: prereq.clone(),
                });
            }
        }
        self.technologies.insert(key.clone(), tech);
        self.order.push(key);
        Ok(())
    }

    // -- Query API --

    pub fn get(&self, tech: &str) -> Option<&TechSpec> {
        self.technologies.get(tech)
    }

    /// Technologies in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&TechKey, &TechSpec)> {
        self.order
            .iter()
            .filter_map(|key| self.technologies.get(key).map(|tech| (key, tech)))
    }

    pub fn technology_count(&self) -> usize {
        self.technologies.len()
    }

    /// Technologies grouped by tier, each group in registration order.
    pub fn by_tier(&self) -> BTreeMap<u32, Vec<&TechKey>> {
        let mut tiers: BTreeMap<u32, Vec<&TechKey>> = BTreeMap::new();
        for (key, tech) in self.iter() {
            tiers.entry(tech.tier).or_default().push(key);
        }
        tiers
    }

    /// Prerequisites of `tech` that are not yet unlocked.
    pub fn missing_prerequisites(
        &self,
        tech: &str,
        unlocked: &UnlockedTechs,
    ) -> Result<Vec<TechKey>, TechTreeError> {
        let spec = self.lookup(tech)?;
        Ok(spec
            .prerequisites
            .iter()
            .filter(|p| !unlocked.contains(p.as_str()))
            .cloned()
            .collect())
    }

    /// Whether [`unlock`](Self::unlock) would succeed right now.
    pub fn can_unlock(&self, tech: &str, unlocked: &UnlockedTechs, ledger: &ResourceLedger) -> bool {
        self.check_unlock(tech, unlocked, ledger).is_ok()
    }

    /// Like [`can_unlock`](Self::can_unlock) but reports the first failed
    /// check.
    pub fn check_unlock(
        &self,
        tech: &str,
        unlocked: &UnlockedTechs,
        ledger: &ResourceLedger,
    ) -> Result<&TechSpec, TechTreeError> {
        let spec = self.lookup(tech)?;
        if unlocked.contains(tech) {
            return Err(TechTreeError::AlreadyUnlocked(tech.into()));
        }
        if let Some(prereq) = spec
            .prerequisites
            .iter()
            .find(|p| !unlocked.contains(p.as_str()))
        {
            return Err(TechTreeError::PrerequisiteNotMet {
                tech: tech.into(),
                prereq: prereq.clone(),
            });
        }
        ledger.check(&spec.cost)?;
        Ok(spec)
    }

    pub fn status(
        &self,
        tech: &str,
        unlocked: &UnlockedTechs,
        ledger: &ResourceLedger,
    ) -> Result<TechStatus, TechTreeError> {
        let spec = self.lookup(tech)?;
        if unlocked.contains(tech) {
            return Ok(TechStatus::Unlocked);
        }
        let missing = self.missing_prerequisites(tech, unlocked)?;
        if !missing.is_empty() {
            return Ok(TechStatus::Locked { missing });
        }
        if !ledger.can_afford(&spec.cost) {
            return Ok(TechStatus::Unaffordable);
        }
        Ok(TechStatus::Available)
    }

    // -- Unlocking --

    /// Pay for and record `tech`, returning what it unlocks.
    pub fn unlock(
        &self,
        tech: &str,
        unlocked: &mut UnlockedTechs,
        ledger: &mut ResourceLedger,
    ) -> Result<UnlockOutcome, TechTreeError> {
        let spec = self.check_unlock(tech, unlocked, ledger)?;
        ledger.try_spend(&spec.cost)?;
        unlocked.insert(tech);

        let mut outcome = UnlockOutcome {
            tech: tech.into(),
            machines: Vec::new(),
            actions: Vec::new(),
            custom: Vec::new(),
        };
        for unlock in &spec.unlocks {
            match unlock {
                Unlock::Machine(m) => outcome.machines.push(m.clone()),
                Unlock::Action(a) => outcome.actions.push(a.clone()),
                Unlock::Custom(c) => outcome.custom.push(c.clone()),
            }
        }
        info!(
            tech,
            machines = outcome.machines.len(),
            actions = outcome.actions.len(),
            "technology unlocked"
        );
        Ok(outcome)
    }

    /// Whether some unlocked technology grants `machine`.
    pub fn machine_unlocked(&self, machine: &str, unlocked: &UnlockedTechs) -> bool {
        self.granted(unlocked)
            .any(|u| matches!(u, Unlock::Machine(m) if m.as_str() == machine))
    }

    /// Machines are available at tier 0 or once a technology grants them.
    pub fn machine_available(&self, machine: &str, tier: u32, unlocked: &UnlockedTechs) -> bool {
        tier == 0 || self.machine_unlocked(machine, unlocked)
    }

    /// Every action granted by the unlocked technologies.
    pub fn unlocked_actions(&self, unlocked: &UnlockedTechs) -> BTreeSet<ActionKey> {
        self.granted(unlocked)
            .filter_map(|u| match u {
                Unlock::Action(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    fn granted<'a>(&'a self, unlocked: &'a UnlockedTechs) -> impl Iterator<Item = &'a Unlock> {
        unlocked
            .iter()
            .filter_map(|key| self.technologies.get(key))
            .flat_map(|tech| tech.unlocks.iter())
    }

    fn lookup(&self, tech: &str) -> Result<&TechSpec, TechTreeError> {
        self.technologies
            .get(tech)
            .ok_or_else(|| TechTreeError::TechNotFound(tech.into()))
    }
}
