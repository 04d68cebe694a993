//! Skill levels earned from manual actions.
//!
//! Every skill starts at level 1 with no experience. Completing a manual
//! action grants experience to the skills it lists; experience beyond the
//! current level's threshold rolls over into the next level, so one large
//! grant can raise several levels at once.

use genesis_core::config::EngineConfig;
use genesis_core::id::SkillKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Experience needed per level: `floor(base * growth^(level - 1))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XpCurve {
    pub base: u32,
    pub growth: f64,
}

impl Default for XpCurve {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for XpCurve {
    fn from(config: &EngineConfig) -> Self {
        Self {
            base: config.xp_base,
            growth: config.xp_growth,
        }
    }
}

impl XpCurve {
    /// Experience needed to advance from `level` to `level + 1`. Never zero,
    /// so level-up loops always terminate.
    pub fn xp_to_next(&self, level: u32) -> u64 {
        let exponent = i32::try_from(level.saturating_sub(1)).unwrap_or(i32::MAX);
        let needed = (f64::from(self.base) * self.growth.powi(exponent)).floor();
        if needed.is_finite() && needed >= 1.0 {
            needed.min(u64::MAX as f64) as u64
        } else if needed.is_finite() {
            1
        } else {
            u64::MAX
        }
    }
}

/// Level and experience within the level for one skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillProgress {
    pub level: u32,
    pub xp: u64,
}

impl Default for SkillProgress {
    fn default() -> Self {
        Self { level: 1, xp: 0 }
    }
}

/// A level reached by [`SkillBook::gain_xp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUp {
    pub skill: SkillKey,
    pub level: u32,
}

/// Every skill the player has touched. Untouched skills read as level 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillBook {
    skills: BTreeMap<SkillKey, SkillProgress>,
}

impl SkillBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self, skill: &str) -> SkillProgress {
        self.skills.get(skill).copied().unwrap_or_default()
    }

    pub fn level(&self, skill: &str) -> u32 {
        self.progress(skill).level
    }

    /// Add experience to a skill and return every level reached.
    pub fn gain_xp(
        &mut self,
        skill: impl Into<SkillKey>,
        amount: u64,
        curve: &XpCurve,
    ) -> Vec<LevelUp> {
        let skill = skill.into();
        let progress = self.skills.entry(skill.clone()).or_default();
        progress.xp = progress.xp.saturating_add(amount);

        let mut level_ups = Vec::new();
        loop {
            let needed = curve.xp_to_next(progress.level);
            if progress.xp < needed || progress.level == u32::MAX {
                break;
            }
            progress.xp -= needed;
            progress.level += 1;
            info!(skill = %skill, level = progress.level, "skill level up");
            level_ups.push(LevelUp {
                skill: skill.clone(),
                level: progress.level,
            });
        }
        level_ups
    }

    /// Grant a whole table of experience, as listed on a manual action.
    pub fn grant(&mut self, xp: &BTreeMap<SkillKey, u32>, curve: &XpCurve) -> Vec<LevelUp> {
        xp.iter()
            .flat_map(|(skill, amount)| self.gain_xp(skill.clone(), u64::from(*amount), curve))
            .collect()
    }

    /// Whether every skill meets its minimum level.
    pub fn meets(&self, requirements: &BTreeMap<SkillKey, u32>) -> bool {
        requirements
            .iter()
            .all(|(skill, level)| self.level(skill.as_str()) >= *level)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SkillKey, &SkillProgress)> {
        self.skills.iter()
    }
}
