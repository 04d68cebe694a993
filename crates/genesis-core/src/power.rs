//! Power generation and first-fit allocation.
//!
//! Power is not stored between ticks. Each production tick starts by summing
//! what the fueled generators produce into a [`PowerBudget`]; consumer
//! machine types then claim their whole draw from it in priority order, and
//! whatever is left over is discarded.
//!
//! # Design
//!
//! - A generator type runs only if its fuel covers every instance
//!   (`fuel >= count`); otherwise it contributes nothing.
//! - Claims are all-or-nothing per machine type, never pro-rated.
//! - [`PowerMonitor`] turns tick results into events, firing only on
//!   transitions between fully powered and brownout.

use crate::catalog::{Catalog, MachineRole};
use crate::fixed::{Fixed64, scale};
use crate::id::{MachineKey, ResourceKey};
use crate::ledger::{ResourceBag, ResourceLedger};
use crate::roster::MachineRoster;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Power available to consumers during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PowerBudget {
    pub generated: Fixed64,
    pub used: Fixed64,
}

impl PowerBudget {
    pub fn new(generated: Fixed64) -> Self {
        Self {
            generated,
            used: Fixed64::ZERO,
        }
    }

    /// Power not yet claimed.
    pub fn remaining(&self) -> Fixed64 {
        self.generated.saturating_sub(self.used).max(Fixed64::ZERO)
    }

    /// Claim `draw` if it fits in what is left. Returns whether it did.
    pub fn try_allocate(&mut self, draw: Fixed64) -> bool {
        if draw > self.remaining() {
            return false;
        }
        self.used = self.used.saturating_add(draw);
        true
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// What one generator type did during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorReport {
    pub machine: MachineKey,
    pub count: u32,
    /// Power added to the budget. Zero when starved of fuel.
    pub output: Fixed64,
    /// Fuel deducted from the ledger, if any.
    pub fuel_burned: Option<(ResourceKey, Fixed64)>,
    pub starved: bool,
}

/// Run every generator type in the roster, burning fuel, and return the
/// budget for this tick together with one report per generator type.
///
/// Only fuel quantities in the ledger change. Machine types missing from the
/// catalog are skipped.
pub fn generate(
    ledger: &mut ResourceLedger,
    roster: &MachineRoster,
    catalog: &Catalog,
) -> (PowerBudget, Vec<GeneratorReport>) {
    let mut generated = Fixed64::ZERO;
    let mut reports = Vec::new();

    for (key, count) in roster.iter() {
        if count == 0 {
            continue;
        }
        let Some(spec) = catalog.machine(key.as_str()) else {
            continue;
        };
        let MachineRole::Generator { power_gen, fuel } = &spec.role else {
            continue;
        };

        let mut report = GeneratorReport {
            machine: key.clone(),
            count,
            output: Fixed64::ZERO,
            fuel_burned: None,
            starved: false,
        };

        if let Some(fuel) = fuel {
            let needed = Fixed64::saturating_from_num(count);
            if fuel.consumed {
                let burn = ResourceBag::new().with(fuel.resource.clone(), needed);
                if ledger.try_spend(&burn).is_err() {
                    report.starved = true;
                    reports.push(report);
                    continue;
                }
                report.fuel_burned = Some((fuel.resource.clone(), needed));
            } else if ledger.get(fuel.resource.as_str()) < needed {
                report.starved = true;
                reports.push(report);
                continue;
            }
        }

        report.output = scale(*power_gen, count);
        generated = generated.saturating_add(report.output);
        reports.push(report);
    }

    (PowerBudget::new(generated), reports)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Emitted by [`PowerMonitor`] when the grid changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerEvent {
    /// At least one consumer type went unpowered after a fully powered tick.
    Brownout {
        /// Machine types denied power this tick.
        denied: Vec<MachineKey>,
        /// Draw that could not be met.
        deficit: Fixed64,
        tick: u64,
    },
    /// Every consumer type ran again after a brownout.
    Restored { tick: u64 },
}

/// Tracks brownout state across ticks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerMonitor {
    in_brownout: bool,
}

impl PowerMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_brownout(&self) -> bool {
        self.in_brownout
    }

    /// Feed one tick's outcome; returns an event only on a transition.
    pub fn observe(
        &mut self,
        denied: Vec<MachineKey>,
        deficit: Fixed64,
        tick: u64,
    ) -> Option<PowerEvent> {
        let is_brownout = !denied.is_empty();
        match (self.in_brownout, is_brownout) {
            (false, true) => {
                self.in_brownout = true;
                Some(PowerEvent::Brownout {
                    denied,
                    deficit,
                    tick,
                })
            }
            (true, false) => {
                self.in_brownout = false;
                Some(PowerEvent::Restored { tick })
            }
            _ => None,
        }
    }
}
