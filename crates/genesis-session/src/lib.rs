//! Genesis Session -- the host that owns one player's game.
//!
//! A [`Session`] holds the immutable content (catalog, tech tree, config) and
//! every piece of player state: the resource ledger, the machine roster, the
//! unlocked technologies and actions, the skill book, and the manual action
//! engine. It also owns the [`Scheduler`], so virtual time only moves through
//! [`Session::advance`].
//!
//! # Time
//!
//! `advance(dt)` fires every timer due within the next `dt` milliseconds in
//! fire-time order and returns what happened as [`Outcome`]s. The production
//! tick is armed by [`Session::set_running`]; manual action timers are armed
//! by the action operations themselves. Nothing here reads the wall clock.
//!
//! # Gating
//!
//! An action may start only if it is in the unlocked-action registry and the
//! player's skills meet its `unlock_req`. A machine may be built only if it is
//! tier 0 or granted by an unlocked technology.

pub mod snapshot;

use genesis_core::action::{ActionError, ActionEvent, ManualActionEngine};
use genesis_core::catalog::{Catalog, MachineSpec};
use genesis_core::config::EngineConfig;
use genesis_core::fixed::{Fixed64, Millis};
use genesis_core::id::{ActionKey, MachineKey, TimerId};
use genesis_core::ledger::{LedgerError, ResourceLedger};
use genesis_core::power::{PowerEvent, PowerMonitor};
use genesis_core::production::{TickReport, run_tick};
use genesis_core::roster::MachineRoster;
use genesis_core::timer::{Fired, Scheduler, TimerTask};
use genesis_data::GameData;
use genesis_tech_tree::skills::{LevelUp, SkillBook, XpCurve};
use genesis_tech_tree::{TechStatus, TechTree, TechTreeError, UnlockOutcome, UnlockedTechs};
use snapshot::{SessionSnapshot, SnapshotError, SnapshotHeader};
use std::collections::BTreeSet;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Errors returned by session operations. A failed operation changes nothing.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("action '{0}' is locked")]
    ActionLocked(ActionKey),

    #[error("machine '{0}' is locked")]
    MachineLocked(MachineKey),

    #[error("unknown machine '{0}'")]
    UnknownMachine(MachineKey),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Tech(#[from] TechTreeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Something that happened while time advanced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Tick(TickReport),
    Power(PowerEvent),
    Action(ActionEvent),
    LevelUp(LevelUp),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One player's game: content plus mutable state plus the virtual clock.
#[derive(Debug)]
pub struct Session {
    catalog: Catalog,
    tech_tree: TechTree,
    config: EngineConfig,
    xp_curve: XpCurve,

    ledger: ResourceLedger,
    roster: MachineRoster,
    unlocked_techs: UnlockedTechs,
    unlocked_actions: BTreeSet<ActionKey>,
    skills: SkillBook,

    scheduler: Scheduler,
    actions: ManualActionEngine,
    power_monitor: PowerMonitor,
    production_timer: Option<TimerId>,
    tick: u64,
}

impl Session {
    /// A paused session with empty state at time zero.
    pub fn new(catalog: Catalog, tech_tree: TechTree, config: EngineConfig) -> Self {
        Self {
            xp_curve: XpCurve::from(&config),
            actions: ManualActionEngine::new(&config),
            catalog,
            tech_tree,
            config,
            ledger: ResourceLedger::new(),
            roster: MachineRoster::new(),
            unlocked_techs: UnlockedTechs::new(),
            unlocked_actions: BTreeSet::new(),
            skills: SkillBook::new(),
            scheduler: Scheduler::new(),
            power_monitor: PowerMonitor::new(),
            production_timer: None,
            tick: 0,
        }
    }

    /// A paused session seeded with the content's starting state.
    pub fn from_game_data(data: GameData) -> Self {
        let mut session = Self::new(data.catalog, data.tech_tree, data.config);
        let initial = data.initial_state;
        session.ledger = initial.ledger;
        session.roster = initial.roster;
        session.unlocked_techs = initial.unlocked_techs;
        session.unlocked_actions = initial.unlocked_actions;
        session
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tech_tree(&self) -> &TechTree {
        &self.tech_tree
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Direct ledger access for hosts that grant resources outside the rules
    /// (debug menus, scripted rewards).
    pub fn ledger_mut(&mut self) -> &mut ResourceLedger {
        &mut self.ledger
    }

    pub fn roster(&self) -> &MachineRoster {
        &self.roster
    }

    pub fn skills(&self) -> &SkillBook {
        &self.skills
    }

    pub fn unlocked_techs(&self) -> &UnlockedTechs {
        &self.unlocked_techs
    }

    pub fn unlocked_actions(&self) -> &BTreeSet<ActionKey> {
        &self.unlocked_actions
    }

    /// Current virtual time.
    pub fn now(&self) -> Millis {
        self.scheduler.now()
    }

    /// Production ticks run so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn in_brownout(&self) -> bool {
        self.power_monitor.in_brownout()
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Start or pause automatic production. Manual actions are unaffected.
    pub fn set_running(&mut self, running: bool) {
        match (running, self.production_timer) {
            (true, None) => {
                let period = self.config.tick_period_ms;
                self.production_timer =
                    Some(self.scheduler.schedule_repeating(TimerTask::ProductionTick, period));
                info!(period, "production started");
            }
            (false, Some(timer)) => {
                self.scheduler.cancel(timer);
                self.production_timer = None;
                info!(tick = self.tick, "production paused");
            }
            _ => {}
        }
    }

    pub fn is_running(&self) -> bool {
        self.production_timer.is_some()
    }

    /// Move virtual time forward by `dt`, firing every due timer in order.
    pub fn advance(&mut self, dt: Millis) -> Vec<Outcome> {
        let until = self.scheduler.now().saturating_add(dt);
        let mut outcomes = Vec::new();
        while let Some(fired) = self.scheduler.pop_due(until) {
            self.dispatch(fired, &mut outcomes);
        }
        self.scheduler.advance_clock(until);
        outcomes
    }

    fn dispatch(&mut self, fired: Fired, outcomes: &mut Vec<Outcome>) {
        match fired.task {
            TimerTask::ProductionTick => {
                if self.production_timer != Some(fired.id) {
                    return;
                }
                self.tick += 1;
                let report = run_tick(&mut self.ledger, &self.roster, &self.catalog, self.tick);
                let event = self.power_monitor.observe(
                    report.unpowered().cloned().collect(),
                    report.deficit(),
                    self.tick,
                );
                outcomes.push(Outcome::Tick(report));
                outcomes.extend(event.map(Outcome::Power));
            }
            TimerTask::ActionProgress | TimerTask::ActionLoop => {
                let events = self.actions.on_timer(
                    fired,
                    &mut self.ledger,
                    &self.catalog,
                    &mut self.scheduler,
                );
                for event in events {
                    self.record(event, outcomes);
                }
            }
        }
    }

    /// Push an action event, granting experience for completions.
    fn record(&mut self, event: ActionEvent, outcomes: &mut Vec<Outcome>) {
        let level_ups = match &event {
            ActionEvent::Completed { xp, .. } => self.skills.grant(xp, &self.xp_curve),
            _ => Vec::new(),
        };
        outcomes.push(Outcome::Action(event));
        outcomes.extend(level_ups.into_iter().map(Outcome::LevelUp));
    }

    // -----------------------------------------------------------------------
    // Manual actions
    // -----------------------------------------------------------------------

    /// Whether `action` is in the registry and the skills meet its
    /// requirements.
    pub fn action_unlocked(&self, action: &str) -> bool {
        self.unlocked_actions.contains(action)
            && self
                .catalog
                .action(action)
                .is_some_and(|spec| self.skills.meets(&spec.unlock_req))
    }

    fn ensure_unlocked(&self, action: &str) -> Result<(), SessionError> {
        if self.catalog.action(action).is_none() {
            return Err(ActionError::UnknownAction(action.into()).into());
        }
        if !self.action_unlocked(action) {
            return Err(SessionError::ActionLocked(action.into()));
        }
        Ok(())
    }

    /// Add `action` to the unlocked-action registry. Returns false if it was
    /// already there.
    pub fn unlock_action(&mut self, action: &str) -> Result<bool, SessionError> {
        if self.catalog.action(action).is_none() {
            return Err(ActionError::UnknownAction(action.into()).into());
        }
        Ok(self.unlocked_actions.insert(action.into()))
    }

    pub fn can_perform(&self, action: &str) -> bool {
        self.action_unlocked(action)
            && self.actions.can_perform(action, &self.ledger, &self.catalog)
    }

    /// Start `action`, cancelling whatever is in flight.
    pub fn perform_action(&mut self, action: &str) -> Result<Vec<ActionEvent>, SessionError> {
        self.ensure_unlocked(action)?;
        let events = self.actions.perform(
            action,
            &mut self.ledger,
            &self.catalog,
            &mut self.scheduler,
        )?;
        Ok(events)
    }

    /// Start looping `action`, or stop it if it is the current loop. Stopping
    /// never needs the action to be unlocked.
    pub fn toggle_loop(&mut self, action: &str) -> Result<Vec<ActionEvent>, SessionError> {
        let stopping = self.actions.loop_action().is_some_and(|l| l.as_str() == action);
        if !stopping {
            self.ensure_unlocked(action)?;
        }
        let events = self.actions.toggle_loop(
            action,
            &mut self.ledger,
            &self.catalog,
            &mut self.scheduler,
        )?;
        Ok(events)
    }

    pub fn stop_loop(&mut self) -> Option<ActionEvent> {
        self.actions.stop_loop(&mut self.scheduler)
    }

    /// Progress of `action` in `[0, 100]`, or `None` if it is not in flight.
    pub fn action_progress(&self, action: &str) -> Option<Fixed64> {
        self.actions.progress(action)
    }

    pub fn in_progress(&self) -> Option<&ActionKey> {
        self.actions.in_progress()
    }

    pub fn loop_action(&self) -> Option<&ActionKey> {
        self.actions.loop_action()
    }

    // -----------------------------------------------------------------------
    // Progression
    // -----------------------------------------------------------------------

    /// Pay for a technology and apply its unlocks.
    pub fn unlock_tech(&mut self, tech: &str) -> Result<UnlockOutcome, SessionError> {
        let outcome = self
            .tech_tree
            .unlock(tech, &mut self.unlocked_techs, &mut self.ledger)?;
        self.unlocked_actions.extend(outcome.actions.iter().cloned());
        Ok(outcome)
    }

    pub fn tech_status(&self, tech: &str) -> Result<TechStatus, SessionError> {
        Ok(self
            .tech_tree
            .status(tech, &self.unlocked_techs, &self.ledger)?)
    }

    fn check_build(&self, machine: &str) -> Result<&MachineSpec, SessionError> {
        let spec = self
            .catalog
            .machine(machine)
            .ok_or_else(|| SessionError::UnknownMachine(machine.into()))?;
        if !self
            .tech_tree
            .machine_available(machine, spec.tier, &self.unlocked_techs)
        {
            return Err(SessionError::MachineLocked(machine.into()));
        }
        self.ledger.check(&spec.build_cost)?;
        Ok(spec)
    }

    pub fn can_build(&self, machine: &str) -> bool {
        self.check_build(machine).is_ok()
    }

    /// Pay the build cost and add one instance. Returns the new count.
    pub fn build_machine(&mut self, machine: &str) -> Result<u32, SessionError> {
        let cost = self.check_build(machine)?.build_cost.clone();
        self.ledger.try_spend(&cost)?;
        let count = self.roster.add(machine, 1);
        info!(machine, count, "machine built");
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Encode the player state.
    pub fn save(&self) -> Result<Vec<u8>, SnapshotError> {
        SessionSnapshot {
            header: SnapshotHeader::new(self.scheduler.now(), self.tick),
            ledger: self.ledger.clone(),
            roster: self.roster.clone(),
            unlocked_techs: self.unlocked_techs.clone(),
            unlocked_actions: self.unlocked_actions.clone(),
            skills: self.skills.clone(),
            actions: self.actions.state(&self.scheduler),
            next_tick_at: self
                .production_timer
                .and_then(|timer| self.scheduler.next_fire(timer)),
        }
        .encode()
    }

    /// Rebuild a session from [`save`](Self::save) output and its content.
    pub fn load(
        bytes: &[u8],
        catalog: Catalog,
        tech_tree: TechTree,
        config: EngineConfig,
    ) -> Result<Self, SessionError> {
        let snapshot = SessionSnapshot::decode(bytes)?;
        let mut session = Self::new(catalog, tech_tree, config);
        session.scheduler = Scheduler::starting_at(snapshot.header.clock);
        session.tick = snapshot.header.tick;
        session.ledger = snapshot.ledger;
        session.roster = snapshot.roster;
        session.unlocked_techs = snapshot.unlocked_techs;
        session.unlocked_actions = snapshot.unlocked_actions;
        session.skills = snapshot.skills;
        session
            .actions
            .restore(snapshot.actions, &session.catalog, &mut session.scheduler);
        if let Some(at) = snapshot.next_tick_at {
            let period = session.config.tick_period_ms;
            session.production_timer = Some(session.scheduler.schedule_at(
                TimerTask::ProductionTick,
                at,
                Some(period),
            ));
        }
        debug!(clock = session.now(), tick = session.tick, "session loaded");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_core::test_utils::*;
    use genesis_tech_tree::{TechSpec, Unlock};

    fn tech_tree() -> TechTree {
        let mut tree = TechTree::new();
        tree.register(
            "smelting",
            TechSpec::new("Smelting", 1)
                .with_cost(bag(&[("iron_ore", 4)]))
                .with_unlock(Unlock::Machine("smelter".into())),
        )
        .unwrap();
        tree.register(
            "wiring",
            TechSpec::new("Wiring", 2)
                .with_prerequisite("smelting")
                .with_unlock(Unlock::Action("craft_cable".into())),
        )
        .unwrap();
        tree
    }

    fn session() -> Session {
        let mut session = Session::new(factory_catalog(), tech_tree(), EngineConfig::default());
        for action in ["mine_iron", "smelt_iron", "scrap_cable"] {
            session.unlock_action(action).unwrap();
        }
        session
    }

    fn completions(outcomes: &[Outcome]) -> Vec<&str> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Action(ActionEvent::Completed { action, .. }) => Some(action.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn locked_action_is_rejected() {
        let mut session = session();
        session.ledger_mut().deposit("wire", fixed(2));
        assert!(!session.can_perform("craft_cable"));
        assert!(matches!(
            session.perform_action("craft_cable"),
            Err(SessionError::ActionLocked(_))
        ));
        assert_eq!(session.ledger().get("wire"), fixed(2));
    }

    #[test]
    fn skill_requirement_gates_registered_action() {
        let mut session = session();
        session.unlock_action("craft_cable").unwrap();
        session.ledger_mut().deposit("wire", fixed(2));
        // Registered but crafting is still level 1.
        assert!(!session.action_unlocked("craft_cable"));
        assert!(!session.can_perform("craft_cable"));
    }

    #[test]
    fn unknown_action_is_an_action_error() {
        let mut session = session();
        assert!(matches!(
            session.perform_action("teleport"),
            Err(SessionError::Action(ActionError::UnknownAction(_)))
        ));
    }

    #[test]
    fn completion_credits_rewards_and_xp() {
        let mut session = session();
        session.ledger_mut().deposit("iron_ore", fixed(1));
        session.perform_action("smelt_iron").unwrap();
        assert_eq!(session.ledger().get("iron_ore"), fixed(0));

        let outcomes = session.advance(3999);
        assert!(completions(&outcomes).is_empty());
        assert!(session.action_progress("smelt_iron").is_some());

        let outcomes = session.advance(1);
        assert_eq!(completions(&outcomes), vec!["smelt_iron"]);
        assert_eq!(session.ledger().get("iron_ingot"), fixed(1));
        assert_eq!(session.skills().progress("smithing").xp, 10);
        assert!(session.in_progress().is_none());
    }

    #[test]
    fn production_only_runs_while_running() {
        let mut session = session();
        session.ledger_mut().deposit("coal", fixed(10));
        session.roster.set_count("coal_generator", 1);
        session.roster.set_count("miner_mk1", 1);

        assert!(session.advance(5000).is_empty());
        assert_eq!(session.tick(), 0);

        session.set_running(true);
        let outcomes = session.advance(2000);
        let ticks = outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::Tick(_)))
            .count();
        assert_eq!(ticks, 2);
        assert_eq!(session.ledger().get("iron_ore"), fixed(2));

        session.set_running(false);
        session.advance(5000);
        assert_eq!(session.tick(), 2);
        assert_eq!(session.now(), 12_000);
    }

    #[test]
    fn brownout_is_reported_once() {
        let mut session = session();
        session.roster.set_count("miner_mk1", 1);
        session.set_running(true);

        let outcomes = session.advance(3000);
        let power: Vec<_> = outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::Power(_)))
            .collect();
        assert_eq!(power.len(), 1);
        assert!(session.in_brownout());
    }

    #[test]
    fn build_tier_zero_pays_cost() {
        let mut session = session();
        session.ledger_mut().deposit("iron_ingot", fixed(5));
        assert!(session.can_build("miner_mk1"));
        assert_eq!(session.build_machine("miner_mk1").unwrap(), 1);
        assert_eq!(session.build_machine("miner_mk1").unwrap(), 2);
        assert_eq!(session.ledger().get("iron_ingot"), fixed(1));
        assert!(matches!(
            session.build_machine("miner_mk1"),
            Err(SessionError::Ledger(_))
        ));
        assert_eq!(session.roster().count("miner_mk1"), 2);
    }

    #[test]
    fn higher_tier_needs_a_technology() {
        let mut session = session();
        session.ledger_mut().deposit("iron_ingot", fixed(5));
        session.ledger_mut().deposit("iron_ore", fixed(4));
        assert!(matches!(
            session.build_machine("smelter"),
            Err(SessionError::MachineLocked(_))
        ));
        assert!(matches!(
            session.build_machine("fusion_reactor"),
            Err(SessionError::UnknownMachine(_))
        ));

        session.unlock_tech("smelting").unwrap();
        assert_eq!(session.build_machine("smelter").unwrap(), 1);
    }

    #[test]
    fn unlocking_a_tech_registers_its_actions() {
        let mut session = session();
        session.ledger_mut().deposit("iron_ore", fixed(4));
        session.unlock_tech("smelting").unwrap();
        let outcome = session.unlock_tech("wiring").unwrap();
        assert_eq!(outcome.actions, vec![ActionKey::from("craft_cable")]);
        assert!(session.unlocked_actions().contains("craft_cable"));
    }

    #[test]
    fn second_unlock_is_rejected_without_mutation() {
        let mut session = session();
        session.ledger_mut().deposit("iron_ore", fixed(10));
        session.unlock_tech("smelting").unwrap();
        let before = session.ledger().clone();

        assert!(matches!(
            session.unlock_tech("smelting"),
            Err(SessionError::Tech(TechTreeError::AlreadyUnlocked(_)))
        ));
        assert_eq!(session.ledger(), &before);
        assert_eq!(session.unlocked_techs().len(), 1);
        assert_eq!(
            session.tech_status("smelting").unwrap(),
            TechStatus::Unlocked
        );
    }

    #[test]
    fn toggle_off_does_not_need_unlock() {
        let mut session = session();
        session.ledger_mut().deposit("iron_ore", fixed(5));
        session.toggle_loop("smelt_iron").unwrap();
        session.unlocked_actions.remove("smelt_iron");

        let events = session.toggle_loop("smelt_iron").unwrap();
        assert!(matches!(
            events.as_slice(),
            [ActionEvent::LoopStopped { .. }]
        ));
        assert!(session.loop_action().is_none());
    }

    #[test]
    fn save_and_load_resume_in_flight_action() {
        let mut session = session();
        session.ledger_mut().deposit("iron_ore", fixed(3));
        session.set_running(true);
        session.toggle_loop("smelt_iron").unwrap();
        session.advance(1500);

        let bytes = session.save().unwrap();
        let mut restored = Session::load(
            &bytes,
            factory_catalog(),
            tech_tree(),
            EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(restored.now(), 1500);
        assert_eq!(restored.tick(), 1);
        assert!(restored.is_running());
        assert_eq!(restored.loop_action().map(ActionKey::as_str), Some("smelt_iron"));
        assert_eq!(restored.ledger(), session.ledger());

        let outcomes = restored.advance(2500);
        assert_eq!(completions(&outcomes), vec!["smelt_iron"]);
        assert_eq!(restored.ledger().get("iron_ingot"), fixed(1));
        assert_eq!(restored.tick(), 4);
    }

    #[test]
    fn load_rejects_garbage() {
        assert!(matches!(
            Session::load(&[0, 1, 2], factory_catalog(), tech_tree(), EngineConfig::default()),
            Err(SessionError::Snapshot(_))
        ));
    }
}
