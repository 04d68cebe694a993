//! Live machine counts, held by the host next to the ledger.

use crate::id::MachineKey;
use serde::{Deserialize, Serialize};

/// Machine type to instance count, in the order each type was first built.
///
/// That order breaks ties between machine types in the same production
/// phase: earlier entries claim power first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRoster {
    entries: Vec<(MachineKey, u32)>,
}

impl MachineRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance count for a machine type (zero if never built).
    pub fn count(&self, machine: &str) -> u32 {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == machine)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    /// Overwrite the count for a machine type. New types go to the back.
    pub fn set_count(&mut self, machine: impl Into<MachineKey>, count: u32) {
        let machine = machine.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == machine) {
            entry.1 = count;
        } else {
            self.entries.push((machine, count));
        }
    }

    /// Add `n` instances and return the new count.
    pub fn add(&mut self, machine: impl Into<MachineKey>, n: u32) -> u32 {
        let machine = machine.into();
        let count = self.count(machine.as_str()).saturating_add(n);
        self.set_count(machine, count);
        count
    }

    /// Remove up to `n` instances and return the new count. The entry keeps
    /// its position so rebuilding does not change priority.
    pub fn remove(&mut self, machine: &str, n: u32) -> u32 {
        match self.entries.iter_mut().find(|(k, _)| k.as_str() == machine) {
            Some(entry) => {
                entry.1 = entry.1.saturating_sub(n);
                entry.1
            }
            None => 0,
        }
    }

    /// Entries in build order, including zero counts.
    pub fn iter(&self) -> impl Iterator<Item = (&MachineKey, u32)> {
        self.entries.iter().map(|(k, c)| (k, *c))
    }

    /// Total instances across every machine type.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| u64::from(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl<K: Into<MachineKey>> FromIterator<(K, u32)> for MachineRoster {
    fn from_iter<I: IntoIterator<Item = (K, u32)>>(iter: I) -> Self {
        let mut roster = Self::new();
        for (k, c) in iter {
            roster.add(k, c);
        }
        roster
    }
}
