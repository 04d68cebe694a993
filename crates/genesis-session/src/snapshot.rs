//! Binary save format for a session.
//!
//! A snapshot is the player-owned state only: ledger, roster, unlocked sets,
//! skills, and the manual-action state. Content (catalog, tech tree, config)
//! is supplied again on load. Encoding is `bitcode` with a versioned header
//! validated before any state is restored.

use genesis_core::action::ActionState;
use genesis_core::fixed::Millis;
use genesis_core::id::ActionKey;
use genesis_core::ledger::ResourceLedger;
use genesis_core::roster::MachineRoster;
use genesis_tech_tree::UnlockedTechs;
use genesis_tech_tree::skills::SkillBook;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a Genesis session snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x6E5E_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while saving or loading a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header at the front of every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Virtual clock when the snapshot was taken.
    pub clock: Millis,
    /// Production ticks run so far.
    pub tick: u64,
}

impl SnapshotHeader {
    /// Create a header for the current format version.
    pub fn new(clock: Millis, tick: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            clock,
            tick,
        }
    }

    /// Validate the header. Returns `Ok(())` if valid.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Everything a session needs to resume, minus its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub header: SnapshotHeader,
    pub ledger: ResourceLedger,
    pub roster: MachineRoster,
    pub unlocked_techs: UnlockedTechs,
    pub unlocked_actions: BTreeSet<ActionKey>,
    pub skills: SkillBook,
    pub actions: ActionState,
    /// Next production tick, or `None` while paused.
    pub next_tick_at: Option<Millis>,
}

impl SessionSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        bitcode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Decode and validate. Returns an error (not a panic) on corrupt data
    /// or a version mismatch.
    pub fn decode(data: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: SessionSnapshot =
            bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_core::test_utils::{fixed, ledger, roster};

    fn sample() -> SessionSnapshot {
        SessionSnapshot {
            header: SnapshotHeader::new(12_345, 12),
            ledger: ledger(&[("iron_ore", 3), ("iron_ingot", 7)]),
            roster: roster(&[("miner_mk1", 2)]),
            unlocked_techs: ["basic_smelting"].into_iter().collect(),
            unlocked_actions: [ActionKey::from("mine_iron")].into_iter().collect(),
            skills: SkillBook::new(),
            actions: ActionState::default(),
            next_tick_at: Some(13_000),
        }
    }

    #[test]
    fn encode_then_decode_preserves_state() {
        let snapshot = sample();
        let bytes = snapshot.encode().unwrap();
        let restored = SessionSnapshot::decode(&bytes).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.ledger.get("iron_ingot"), fixed(7));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut snapshot = sample();
        snapshot.header.magic = 0xDEAD_BEEF;
        let bytes = snapshot.encode().unwrap();
        assert!(matches!(
            SessionSnapshot::decode(&bytes),
            Err(SnapshotError::InvalidMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut snapshot = sample();
        snapshot.header.version = FORMAT_VERSION + 1;
        let bytes = snapshot.encode().unwrap();
        assert!(matches!(
            SessionSnapshot::decode(&bytes),
            Err(SnapshotError::FutureVersion(_))
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            SessionSnapshot::decode(&[1, 2, 3]),
            Err(SnapshotError::Decode(_))
        ));
    }
}
