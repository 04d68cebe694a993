//! Genesis Core -- the simulation engine for idle factory games.
//!
//! This crate owns the resource ledger and the two independent clocks that
//! mutate it: the fixed-period production tick and the timed manual actions.
//!
//! # Production Tick
//!
//! Each call to [`production::run_tick`] is one atomic pass:
//!
//! 1. **Generate** -- Fueled generators burn fuel and add to the power budget.
//! 2. **Extract** -- Extraction machines claim power and add raw resources.
//! 3. **Fabricate** -- Recipe machines claim power and run each recipe
//!    all-or-nothing.
//! 4. **Research** -- Research machines claim power and add their resource.
//! 5. **Record** -- `power` and `max_power` are overwritten in the ledger.
//!
//! Power is claimed first-fit per machine type: a type either receives its
//! whole draw or does not run this tick.
//!
//! # Manual Actions
//!
//! [`action::ManualActionEngine`] runs at most one action at a time. The cost
//! is paid up front, a progress timer ticks to 100, and the reward lands on
//! completion. A loop repeats one action until it can no longer be afforded.
//!
//! # Key Types
//!
//! - [`ledger::ResourceLedger`] -- Non-negative resource quantities.
//! - [`catalog::Catalog`] -- Immutable recipes, machines, and actions.
//! - [`roster::MachineRoster`] -- Live machine counts in build order.
//! - [`timer::Scheduler`] -- Virtual-time queue of cancellable timers.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

pub mod action;
pub mod catalog;
pub mod config;
pub mod fixed;
pub mod id;
pub mod ledger;
pub mod power;
pub mod production;
pub mod roster;
pub mod timer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
