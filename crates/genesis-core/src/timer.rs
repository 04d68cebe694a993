//! Virtual-time timer queue.
//!
//! Every clock in the engine (the production tick, action progress, action
//! loops) is a timer in one [`Scheduler`]. The host advances virtual time and
//! the scheduler hands back due timers one at a time, ordered by fire time and
//! then by the order they were (re)armed. Handlers run to completion before
//! the next timer is popped, so they never interleave.
//!
//! Timer keys are generational: once a timer is cancelled or has fired its
//! last time, its [`TimerId`] never resolves again, so a stale key cannot
//! trigger a later timer.

use crate::fixed::Millis;
use crate::id::TimerId;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

/// What a timer does when it fires. The handler is chosen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerTask {
    /// Run one automatic production pass.
    ProductionTick,
    /// Update the progress of the in-flight manual action.
    ActionProgress,
    /// Restart the looping manual action.
    ActionLoop,
}

#[derive(Debug, Clone)]
struct Timer {
    task: TimerTask,
    next_fire: Millis,
    /// `None` for one-shot timers.
    period: Option<Millis>,
    /// Tie-breaker among timers due at the same instant.
    seq: u64,
}

/// A timer that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub id: TimerId,
    pub task: TimerTask,
    /// Virtual time the timer fired at. The scheduler clock equals this while
    /// the handler runs.
    pub at: Millis,
}

/// A deterministic queue of cancellable timers over a virtual clock.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    now: Millis,
    timers: SlotMap<TimerId, Timer>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler whose clock starts at `now` instead of zero.
    pub fn starting_at(now: Millis) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Millis {
        self.now
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Fire once, `delay` after now.
    pub fn schedule_once(&mut self, task: TimerTask, delay: Millis) -> TimerId {
        let at = self.now.saturating_add(delay);
        self.schedule_at(task, at, None)
    }

    /// Fire every `period`, first at now + `period`. Periods below 1 ms are
    /// raised to 1 ms so a timer can never fire twice at the same instant.
    pub fn schedule_repeating(&mut self, task: TimerTask, period: Millis) -> TimerId {
        let period = period.max(1);
        let at = self.now.saturating_add(period);
        self.schedule_at(task, at, Some(period))
    }

    /// Fire first at absolute time `at` (never earlier than now), then every
    /// `period` if one is given.
    pub fn schedule_at(
        &mut self,
        task: TimerTask,
        at: Millis,
        period: Option<Millis>,
    ) -> TimerId {
        let seq = self.bump_seq();
        self.timers.insert(Timer {
            task,
            next_fire: at.max(self.now),
            period: period.map(|p| p.max(1)),
            seq,
        })
    }

    /// Cancel a timer. Returns false if it had already fired for the last
    /// time or was cancelled before; cancelling twice is harmless.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(id).is_some()
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// When a timer fires next, if it is still armed.
    pub fn next_fire(&self, id: TimerId) -> Option<Millis> {
        self.timers.get(id).map(|t| t.next_fire)
    }

    /// Earliest fire time over all armed timers.
    pub fn next_due(&self) -> Option<Millis> {
        self.timers.values().map(|t| t.next_fire).min()
    }

    /// Pop the next timer due at or before `until`, moving the clock to its
    /// fire time. Repeating timers are re-armed one period later and queue
    /// behind anything already due at their new time.
    pub fn pop_due(&mut self, until: Millis) -> Option<Fired> {
        let (id, at) = self
            .timers
            .iter()
            .filter(|(_, t)| t.next_fire <= until)
            .min_by_key(|(_, t)| (t.next_fire, t.seq))
            .map(|(id, t)| (id, t.next_fire))?;

        self.now = self.now.max(at);
        let seq = self.bump_seq();
        let timer = self.timers.get_mut(id)?;
        let task = timer.task;
        if let Some(period) = timer.period {
            timer.next_fire = at.saturating_add(period);
            timer.seq = seq;
        } else {
            self.timers.remove(id);
        }
        Some(Fired { id, task, at })
    }

    /// Move the clock forward to `until` without firing anything. Call after
    /// draining [`pop_due`](Self::pop_due).
    pub fn advance_clock(&mut self, until: Millis) {
        self.now = self.now.max(until);
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut Scheduler, until: Millis) -> Vec<(TimerTask, Millis)> {
        let mut fired = Vec::new();
        while let Some(f) = scheduler.pop_due(until) {
            fired.push((f.task, f.at));
        }
        scheduler.advance_clock(until);
        fired
    }

    #[test]
    fn one_shot_fires_once() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule_once(TimerTask::ActionLoop, 100);
        assert_eq!(drain(&mut scheduler, 99), vec![]);
        assert_eq!(drain(&mut scheduler, 500), vec![(TimerTask::ActionLoop, 100)]);
        assert!(!scheduler.is_active(id));
        assert_eq!(scheduler.now(), 500);
    }

    #[test]
    fn repeating_fires_each_period() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_repeating(TimerTask::ProductionTick, 1000);
        let fired = drain(&mut scheduler, 3500);
        assert_eq!(
            fired,
            vec![
                (TimerTask::ProductionTick, 1000),
                (TimerTask::ProductionTick, 2000),
                (TimerTask::ProductionTick, 3000),
            ]
        );
        assert_eq!(scheduler.next_due(), Some(4000));
    }

    #[test]
    fn same_instant_fires_in_scheduling_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(TimerTask::ActionLoop, 100);
        scheduler.schedule_once(TimerTask::ActionProgress, 100);
        scheduler.schedule_once(TimerTask::ProductionTick, 50);
        let tasks: Vec<TimerTask> = drain(&mut scheduler, 100).into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            tasks,
            vec![
                TimerTask::ProductionTick,
                TimerTask::ActionLoop,
                TimerTask::ActionProgress
            ]
        );
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule_repeating(TimerTask::ActionProgress, 50);
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(drain(&mut scheduler, 1000).is_empty());
    }

    #[test]
    fn cancelled_key_does_not_resolve_to_new_timer() {
        let mut scheduler = Scheduler::new();
        let old = scheduler.schedule_once(TimerTask::ActionLoop, 10);
        scheduler.cancel(old);
        let new = scheduler.schedule_once(TimerTask::ActionLoop, 10);
        assert_ne!(old, new);
        assert!(!scheduler.is_active(old));
        assert!(scheduler.is_active(new));
    }

    #[test]
    fn zero_period_is_clamped() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_repeating(TimerTask::ActionProgress, 0);
        assert_eq!(drain(&mut scheduler, 3).len(), 3);
    }

    #[test]
    fn schedule_at_never_lands_in_the_past() {
        let mut scheduler = Scheduler::starting_at(500);
        let id = scheduler.schedule_at(TimerTask::ActionLoop, 100, None);
        assert_eq!(scheduler.next_fire(id), Some(500));
    }
}
