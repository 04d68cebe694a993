//! Engine timing and progression constants.

use crate::fixed::Millis;
use serde::{Deserialize, Serialize};

/// Tunable constants shared by the clocks and the skill curve.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Period of the automatic production tick.
    pub tick_period_ms: Millis,
    /// How often an in-flight manual action updates its progress.
    pub progress_interval_ms: Millis,
    /// Extra delay between loop repeats, on top of the action duration.
    pub loop_settle_ms: Millis,
    /// Experience needed to go from level 1 to level 2.
    pub xp_base: u32,
    /// Growth factor of the experience curve per level.
    pub xp_growth: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 1000,
            progress_interval_ms: 50,
            loop_settle_ms: 200,
            xp_base: 100,
            xp_growth: 1.2,
        }
    }
}

impl EngineConfig {
    /// Repeat period of a loop over an action of the given duration.
    pub fn loop_period(&self, duration: Millis) -> Millis {
        duration.saturating_add(self.loop_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_game_timing() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_period_ms, 1000);
        assert_eq!(config.progress_interval_ms, 50);
        assert_eq!(config.loop_period(4000), 4200);
    }
}
