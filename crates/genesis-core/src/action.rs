//! Manual actions: timed, player-started, optionally looped.
//!
//! The engine holds at most one in-flight action and at most one loop
//! designation. It never owns the ledger or the clock; every call receives
//! the ledger, the catalog, and the [`Scheduler`] it arms timers on, and the
//! host routes [`TimerTask::ActionProgress`] and [`TimerTask::ActionLoop`]
//! firings back through [`ManualActionEngine::on_timer`].
//!
//! Lifecycle of one action:
//!
//! 1. `perform` pays the full cost and arms a repeating progress timer.
//! 2. Each progress firing recomputes the percentage from the start time.
//! 3. Once the duration has elapsed the reward is credited and the progress
//!    timer is cancelled.
//!
//! Starting a new action while one is in flight cancels the old one. Its cost
//! is forfeited and it pays no reward.

use crate::catalog::{Catalog, ManualActionSpec};
use crate::config::EngineConfig;
use crate::fixed::{Fixed64, Millis, percent_elapsed};
use crate::id::{ActionKey, SkillKey, TimerId};
use crate::ledger::{LedgerError, ResourceBag, ResourceLedger};
use crate::timer::{Fired, Scheduler, TimerTask};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Errors and events
// ---------------------------------------------------------------------------

/// Why a manual action could not start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("unknown action '{0}'")]
    UnknownAction(ActionKey),

    #[error("action '{0}' is already in progress")]
    Busy(ActionKey),

    #[error(transparent)]
    Insufficient(#[from] LedgerError),
}

/// Why a loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopStopReason {
    /// `toggle_loop` on the looping action.
    Toggled,
    /// The action could no longer be afforded at a loop firing.
    Starved,
    /// Another action was still in flight at a loop firing.
    Preempted,
    /// A loop on another action took over.
    Replaced,
    /// `stop_loop` was called.
    Stopped,
}

/// Observable outcomes of engine calls and timer firings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEvent {
    Started {
        action: ActionKey,
        at: Millis,
    },
    /// An in-flight action was replaced before finishing. Its cost is lost.
    Cancelled {
        action: ActionKey,
        progress: Fixed64,
    },
    Completed {
        action: ActionKey,
        rewards: ResourceBag,
        xp: BTreeMap<SkillKey, u32>,
    },
    LoopStopped {
        action: ActionKey,
        reason: LoopStopReason,
    },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct InFlight {
    action: ActionKey,
    started_at: Millis,
    duration: Millis,
    progress: Fixed64,
    timer: TimerId,
}

#[derive(Debug, Clone)]
struct Looping {
    action: ActionKey,
    timer: TimerId,
}

/// Serializable view of the engine, without timer keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
    pub in_flight: Option<InFlightState>,
    pub looping: Option<LoopState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightState {
    pub action: ActionKey,
    pub started_at: Millis,
    pub duration: Millis,
    pub progress: Fixed64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopState {
    pub action: ActionKey,
    /// When the loop would have fired next.
    pub next_fire: Millis,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs one manual action at a time and repeats one action on a loop.
#[derive(Debug, Clone)]
pub struct ManualActionEngine {
    in_flight: Option<InFlight>,
    looping: Option<Looping>,
    timing: EngineConfig,
}

impl Default for ManualActionEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ManualActionEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            in_flight: None,
            looping: None,
            timing: config.clone(),
        }
    }

    fn progress_interval(&self) -> Millis {
        self.timing.progress_interval_ms.max(1)
    }

    /// Key of the in-flight action, if any.
    pub fn in_progress(&self) -> Option<&ActionKey> {
        self.in_flight.as_ref().map(|f| &f.action)
    }

    /// Progress of `action` in `[0, 100]`, or `None` if it is not in flight.
    pub fn progress(&self, action: &str) -> Option<Fixed64> {
        self.in_flight
            .as_ref()
            .filter(|f| f.action.as_str() == action)
            .map(|f| f.progress)
    }

    /// Key of the looping action, if any.
    pub fn loop_action(&self) -> Option<&ActionKey> {
        self.looping.as_ref().map(|l| &l.action)
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Whether `action` could start right now without replacing anything.
    pub fn can_perform(&self, action: &str, ledger: &ResourceLedger, catalog: &Catalog) -> bool {
        self.check(action, ledger, catalog).is_ok()
    }

    /// Like [`can_perform`](Self::can_perform) but says why not.
    pub fn check<'c>(
        &self,
        action: &str,
        ledger: &ResourceLedger,
        catalog: &'c Catalog,
    ) -> Result<&'c ManualActionSpec, ActionError> {
        if let Some(current) = self.in_progress() {
            return Err(ActionError::Busy(current.clone()));
        }
        let spec = catalog
            .action(action)
            .ok_or_else(|| ActionError::UnknownAction(action.into()))?;
        ledger.check(&spec.cost)?;
        Ok(spec)
    }

    /// Start `action`, replacing whatever is in flight.
    ///
    /// The cost is checked and paid as one step. If it cannot be paid nothing
    /// changes, except that a loop on this same action ends.
    pub fn perform(
        &mut self,
        action: &str,
        ledger: &mut ResourceLedger,
        catalog: &Catalog,
        scheduler: &mut Scheduler,
    ) -> Result<Vec<ActionEvent>, ActionError> {
        let spec = catalog
            .action(action)
            .ok_or_else(|| ActionError::UnknownAction(action.into()))?;
        if let Err(err) = ledger.check(&spec.cost) {
            if self.loop_action().is_some_and(|l| l.as_str() == action) {
                self.stop_loop_with(scheduler, LoopStopReason::Starved);
            }
            return Err(err.into());
        }

        let mut events = Vec::new();
        events.extend(self.cancel_in_flight(scheduler));
        ledger.try_spend(&spec.cost)?;
        events.push(self.start(action.into(), spec, scheduler));
        Ok(events)
    }

    fn start(
        &mut self,
        action: ActionKey,
        spec: &ManualActionSpec,
        scheduler: &mut Scheduler,
    ) -> ActionEvent {
        let at = scheduler.now();
        let timer =
            scheduler.schedule_repeating(TimerTask::ActionProgress, self.progress_interval());
        debug!(action = %action, duration = spec.duration, "action started");
        self.in_flight = Some(InFlight {
            action: action.clone(),
            started_at: at,
            duration: spec.duration,
            progress: Fixed64::ZERO,
            timer,
        });
        ActionEvent::Started { action, at }
    }

    /// Drop the in-flight action without paying its reward.
    pub fn cancel_in_flight(&mut self, scheduler: &mut Scheduler) -> Option<ActionEvent> {
        let current = self.in_flight.take()?;
        scheduler.cancel(current.timer);
        debug!(action = %current.action, progress = %current.progress, "action cancelled");
        Some(ActionEvent::Cancelled {
            action: current.action,
            progress: current.progress,
        })
    }

    /// Start or stop looping `action`.
    ///
    /// Toggling the looping action stops the loop. Otherwise any other loop
    /// ends first, then the action is performed immediately. If it cannot be
    /// afforded the call fails with no loop left running; if it starts, it
    /// restarts every `duration` plus the settle delay for as long as it can
    /// start at each firing.
    pub fn toggle_loop(
        &mut self,
        action: &str,
        ledger: &mut ResourceLedger,
        catalog: &Catalog,
        scheduler: &mut Scheduler,
    ) -> Result<Vec<ActionEvent>, ActionError> {
        if self.loop_action().is_some_and(|l| l.as_str() == action) {
            return Ok(self
                .stop_loop_with(scheduler, LoopStopReason::Toggled)
                .into_iter()
                .collect());
        }

        let spec = catalog
            .action(action)
            .ok_or_else(|| ActionError::UnknownAction(action.into()))?;

        let mut events = Vec::new();
        events.extend(self.stop_loop_with(scheduler, LoopStopReason::Replaced));
        events.extend(self.perform(action, ledger, catalog, scheduler)?);

        let period = self.timing.loop_period(spec.duration);
        let timer = scheduler.schedule_repeating(TimerTask::ActionLoop, period);
        info!(action, period, "loop started");
        self.looping = Some(Looping {
            action: action.into(),
            timer,
        });
        Ok(events)
    }

    /// End the loop. Any in-flight action keeps running to completion.
    pub fn stop_loop(&mut self, scheduler: &mut Scheduler) -> Option<ActionEvent> {
        self.stop_loop_with(scheduler, LoopStopReason::Stopped)
    }

    fn stop_loop_with(
        &mut self,
        scheduler: &mut Scheduler,
        reason: LoopStopReason,
    ) -> Option<ActionEvent> {
        let looping = self.looping.take()?;
        scheduler.cancel(looping.timer);
        info!(action = %looping.action, ?reason, "loop stopped");
        Some(ActionEvent::LoopStopped {
            action: looping.action,
            reason,
        })
    }

    /// Handle a fired timer. Firings of timers this engine does not own are
    /// ignored.
    pub fn on_timer(
        &mut self,
        fired: Fired,
        ledger: &mut ResourceLedger,
        catalog: &Catalog,
        scheduler: &mut Scheduler,
    ) -> Vec<ActionEvent> {
        match fired.task {
            TimerTask::ActionProgress => self.on_progress(fired, ledger, catalog, scheduler),
            TimerTask::ActionLoop => self.on_loop(fired, ledger, catalog, scheduler),
            TimerTask::ProductionTick => Vec::new(),
        }
    }

    fn on_progress(
        &mut self,
        fired: Fired,
        ledger: &mut ResourceLedger,
        catalog: &Catalog,
        scheduler: &mut Scheduler,
    ) -> Vec<ActionEvent> {
        let Some(current) = self.in_flight.as_mut().filter(|f| f.timer == fired.id) else {
            return Vec::new();
        };
        let elapsed = fired.at.saturating_sub(current.started_at);
        current.progress = percent_elapsed(elapsed, current.duration);
        self.complete_if_due(fired.at, ledger, catalog, scheduler)
            .into_iter()
            .collect()
    }

    /// Credit the in-flight action if its duration has elapsed by `at`.
    fn complete_if_due(
        &mut self,
        at: Millis,
        ledger: &mut ResourceLedger,
        catalog: &Catalog,
        scheduler: &mut Scheduler,
    ) -> Option<ActionEvent> {
        let current = self.in_flight.as_ref()?;
        if at.saturating_sub(current.started_at) < current.duration {
            return None;
        }

        let done = self.in_flight.take()?;
        scheduler.cancel(done.timer);
        let (rewards, xp) = catalog
            .action(done.action.as_str())
            .map(|spec| (spec.rewards.clone(), spec.xp.clone()))
            .unwrap_or_default();
        ledger.credit(&rewards);
        debug!(action = %done.action, "action completed");
        Some(ActionEvent::Completed {
            action: done.action,
            rewards,
            xp,
        })
    }

    fn on_loop(
        &mut self,
        fired: Fired,
        ledger: &mut ResourceLedger,
        catalog: &Catalog,
        scheduler: &mut Scheduler,
    ) -> Vec<ActionEvent> {
        let Some(action) = self
            .looping
            .as_ref()
            .filter(|l| l.timer == fired.id)
            .map(|l| l.action.clone())
        else {
            return Vec::new();
        };

        // An action whose duration is up counts as finished even if its own
        // progress timer is queued behind this firing.
        let mut events: Vec<ActionEvent> = self
            .complete_if_due(fired.at, ledger, catalog, scheduler)
            .into_iter()
            .collect();

        let reason = match self.check(action.as_str(), ledger, catalog) {
            Ok(_) => None,
            Err(ActionError::Busy(_)) => Some(LoopStopReason::Preempted),
            Err(_) => Some(LoopStopReason::Starved),
        };
        match reason {
            Some(reason) => events.extend(self.stop_loop_with(scheduler, reason)),
            // The check just passed, so this cannot fail.
            None => events.extend(
                self.perform(action.as_str(), ledger, catalog, scheduler)
                    .unwrap_or_default(),
            ),
        }
        events
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Capture the engine state for a snapshot.
    pub fn state(&self, scheduler: &Scheduler) -> ActionState {
        ActionState {
            in_flight: self.in_flight.as_ref().map(|f| InFlightState {
                action: f.action.clone(),
                started_at: f.started_at,
                duration: f.duration,
                progress: f.progress,
            }),
            looping: self.looping.as_ref().map(|l| LoopState {
                action: l.action.clone(),
                next_fire: scheduler.next_fire(l.timer).unwrap_or(scheduler.now()),
            }),
        }
    }

    /// Replace the engine state with a snapshot, re-arming its timers on
    /// `scheduler`. Anything currently armed by this engine is cancelled.
    pub fn restore(&mut self, state: ActionState, catalog: &Catalog, scheduler: &mut Scheduler) {
        self.cancel_in_flight(scheduler);
        if let Some(looping) = self.looping.take() {
            scheduler.cancel(looping.timer);
        }

        if let Some(f) = state.in_flight {
            let timer = scheduler
                .schedule_repeating(TimerTask::ActionProgress, self.progress_interval());
            self.in_flight = Some(InFlight {
                action: f.action,
                started_at: f.started_at,
                duration: f.duration,
                progress: f.progress,
                timer,
            });
        }

        if let Some(l) = state.looping {
            let Some(spec) = catalog.action(l.action.as_str()) else {
                return;
            };
            let period = self.timing.loop_period(spec.duration);
            let timer = scheduler.schedule_at(TimerTask::ActionLoop, l.next_fire, Some(period));
            self.looping = Some(Looping {
                action: l.action,
                timer,
            });
        }
    }
}
