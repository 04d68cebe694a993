//! The resource ledger: every quantity the simulation tracks.
//!
//! All mutations that take resources away go through a check-then-apply
//! pair. The check runs against the ledger as it is at call time and the
//! apply only happens when the whole check passed, so no entry is ever left
//! partially deducted or negative.

use crate::fixed::{Fixed64, scale};
use crate::id::ResourceKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Power drawn by machines during the last production tick.
pub const POWER: &str = "power";

/// Power generated during the last production tick.
pub const MAX_POWER: &str = "max_power";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by ledger mutations. A failed mutation leaves the ledger
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient {resource}: need {required}, have {available}")]
    InsufficientResources {
        resource: ResourceKey,
        required: Fixed64,
        available: Fixed64,
    },

    #[error("negative quantity {amount} for {resource}")]
    NegativeQuantity { resource: ResourceKey, amount: Fixed64 },
}

// ---------------------------------------------------------------------------
// Resource bag
// ---------------------------------------------------------------------------

/// A set of resource amounts: a cost, a reward, or a recipe side.
///
/// Entries are kept sorted by key so iteration order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceBag(BTreeMap<ResourceKey, Fixed64>);

impl ResourceBag {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert. Amounts for the same key accumulate.
    pub fn with(mut self, resource: impl Into<ResourceKey>, amount: Fixed64) -> Self {
        self.add(resource, amount);
        self
    }

    /// Add `amount` of `resource` to the bag.
    pub fn add(&mut self, resource: impl Into<ResourceKey>, amount: Fixed64) {
        let entry = self.0.entry(resource.into()).or_insert(Fixed64::ZERO);
        *entry = entry.saturating_add(amount);
    }

    pub fn get(&self, resource: &str) -> Fixed64 {
        self.0.get(resource).copied().unwrap_or(Fixed64::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, Fixed64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Every amount multiplied by `count`.
    pub fn scaled(&self, count: u32) -> Self {
        Self(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), scale(*v, count)))
                .collect(),
        )
    }

    /// The first entry with a negative amount, if any.
    pub fn first_negative(&self) -> Option<(&ResourceKey, Fixed64)> {
        self.iter().find(|(_, amount)| *amount < Fixed64::ZERO)
    }
}

impl<K: Into<ResourceKey>> FromIterator<(K, Fixed64)> for ResourceBag {
    fn from_iter<I: IntoIterator<Item = (K, Fixed64)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (k, v) in iter {
            bag.add(k, v);
        }
        bag
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Resource name to non-negative quantity. Missing keys read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLedger {
    quantities: BTreeMap<ResourceKey, Fixed64>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current quantity of a resource (zero if never seen).
    pub fn get(&self, resource: &str) -> Fixed64 {
        self.quantities.get(resource).copied().unwrap_or(Fixed64::ZERO)
    }

    /// Overwrite a quantity. Rejects negative amounts.
    pub fn set(
        &mut self,
        resource: impl Into<ResourceKey>,
        amount: Fixed64,
    ) -> Result<(), LedgerError> {
        let resource = resource.into();
        if amount < Fixed64::ZERO {
            return Err(LedgerError::NegativeQuantity { resource, amount });
        }
        self.quantities.insert(resource, amount);
        Ok(())
    }

    /// Overwrite a gauge such as [`POWER`], clamping negatives to zero.
    pub fn set_gauge(&mut self, resource: impl Into<ResourceKey>, amount: Fixed64) {
        self.quantities
            .insert(resource.into(), amount.max(Fixed64::ZERO));
    }

    /// Add a non-negative amount. Negative amounts are ignored; use
    /// [`try_spend`](Self::try_spend) to take resources away.
    pub fn deposit(&mut self, resource: impl Into<ResourceKey>, amount: Fixed64) {
        if amount <= Fixed64::ZERO {
            return;
        }
        let entry = self.quantities.entry(resource.into()).or_insert(Fixed64::ZERO);
        *entry = entry.saturating_add(amount);
    }

    /// Deposit every entry of a bag.
    pub fn credit(&mut self, gains: &ResourceBag) {
        for (resource, amount) in gains.iter() {
            self.deposit(resource.clone(), amount);
        }
    }

    /// Whether every entry of `cost` is available right now.
    pub fn can_afford(&self, cost: &ResourceBag) -> bool {
        self.check(cost).is_ok()
    }

    /// Like [`can_afford`](Self::can_afford) but reports the first shortfall.
    pub fn check(&self, cost: &ResourceBag) -> Result<(), LedgerError> {
        for (resource, required) in cost.iter() {
            let available = self.get(resource.as_str());
            if available < required {
                return Err(LedgerError::InsufficientResources {
                    resource: resource.clone(),
                    required,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Deduct the whole cost, or nothing at all.
    pub fn try_spend(&mut self, cost: &ResourceBag) -> Result<(), LedgerError> {
        self.check(cost)?;
        for (resource, required) in cost.iter() {
            if let Some(entry) = self.quantities.get_mut(resource.as_str()) {
                *entry = entry.saturating_sub(required).max(Fixed64::ZERO);
            }
        }
        Ok(())
    }

    /// Deduct `inputs` and deposit `outputs` as one step. Nothing changes if
    /// the inputs cannot be paid in full.
    pub fn try_exchange(
        &mut self,
        inputs: &ResourceBag,
        outputs: &ResourceBag,
    ) -> Result<(), LedgerError> {
        self.try_spend(inputs)?;
        self.credit(outputs);
        Ok(())
    }

    /// Iterate over all tracked resources in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, Fixed64)> {
        self.quantities.iter().map(|(k, v)| (k, *v))
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    /// Whether every quantity is non-negative.
    pub fn is_consistent(&self) -> bool {
        self.quantities.values().all(|v| *v >= Fixed64::ZERO)
    }
}

impl<K: Into<ResourceKey>> FromIterator<(K, Fixed64)> for ResourceLedger {
    fn from_iter<I: IntoIterator<Item = (K, Fixed64)>>(iter: I) -> Self {
        let mut ledger = Self::new();
        for (k, v) in iter {
            ledger.deposit(k, v);
        }
        ledger
    }
}
