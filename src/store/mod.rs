//! Match result persistence

pub mod profiles;

pub use profiles::{PlayerRecorder, PlayerStats, ProfileStore};

use serde::{Deserialize, Serialize};

/// Result of a finished match from one participant's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Win,
    Loss,
}

/// Persistence collaborator invoked once per completed match
pub trait ResultRecorder: Send + Sync {
    fn record_match_result(&self, outcome: MatchOutcome, damage_dealt: u32, max_combo: u32);
}

/// Recorder that drops results (offline tests, spectators)
pub struct NoopRecorder;

impl ResultRecorder for NoopRecorder {
    fn record_match_result(&self, _outcome: MatchOutcome, _damage_dealt: u32, _max_combo: u32) {}
}
