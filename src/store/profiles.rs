//! Player profiles: lifetime fight stats and unlocked characters

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::{MatchOutcome, ResultRecorder};
use crate::game::characters::{CatalogError, Roster, UnlockSet};

/// Lifetime stats for one player
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub wins: u32,
    pub losses: u32,
    pub fights: u32,
    pub damage_dealt: u64,
    pub max_combo: u32,
    /// Rounded percentage of fights won
    pub win_rate: u32,
}

#[derive(Debug, Clone)]
struct Profile {
    stats: PlayerStats,
    unlocked: UnlockSet,
    updated_at: DateTime<Utc>,
}

impl Profile {
    fn new() -> Self {
        Self {
            stats: PlayerStats::default(),
            unlocked: UnlockSet::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Serializable profile view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub player_id: String,
    pub stats: PlayerStats,
    pub unlocked: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory profile store shared by every connection
#[derive(Default)]
pub struct ProfileStore {
    profiles: DashMap<String, Profile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    /// Apply one finished match to a player's stats
    pub fn update_stats(
        &self,
        player_id: &str,
        outcome: MatchOutcome,
        damage_dealt: u32,
        max_combo: u32,
    ) -> PlayerStats {
        let mut entry = self
            .profiles
            .entry(player_id.to_string())
            .or_insert_with(Profile::new);
        let profile = entry.value_mut();
        let stats = &mut profile.stats;

        stats.fights += 1;
        match outcome {
            MatchOutcome::Win => stats.wins += 1,
            MatchOutcome::Loss => stats.losses += 1,
        }
        stats.damage_dealt += u64::from(damage_dealt);
        stats.max_combo = stats.max_combo.max(max_combo);
        stats.win_rate = (stats.wins as f32 / stats.fights as f32 * 100.0).round() as u32;
        profile.updated_at = Utc::now();

        info!(
            player_id,
            outcome = ?outcome,
            fights = stats.fights,
            "Match result recorded"
        );

        stats.clone()
    }

    pub fn stats(&self, player_id: &str) -> Option<PlayerStats> {
        self.profiles.get(player_id).map(|p| p.stats.clone())
    }

    /// Profile view, creating a fresh profile on first access
    pub fn ensure_profile(&self, player_id: &str) -> ProfileView {
        let entry = self
            .profiles
            .entry(player_id.to_string())
            .or_insert_with(Profile::new);
        ProfileView {
            player_id: player_id.to_string(),
            stats: entry.stats.clone(),
            unlocked: entry.unlocked.ids(),
            updated_at: entry.updated_at,
        }
    }

    pub fn unlocked(&self, player_id: &str) -> UnlockSet {
        self.profiles
            .get(player_id)
            .map(|p| p.unlocked.clone())
            .unwrap_or_default()
    }

    /// Unlock a roster character for a player
    pub fn unlock(&self, player_id: &str, character_id: &str) -> Result<ProfileView, CatalogError> {
        let character = Roster::global().get(character_id)?;
        let mut entry = self
            .profiles
            .entry(player_id.to_string())
            .or_insert_with(Profile::new);
        entry.unlocked.unlock(character.id);
        entry.updated_at = Utc::now();
        info!(player_id, character = character.id, "Character unlocked");

        Ok(ProfileView {
            player_id: player_id.to_string(),
            stats: entry.stats.clone(),
            unlocked: entry.unlocked.ids(),
            updated_at: entry.updated_at,
        })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Binds the store to one player so a match can report through [`ResultRecorder`]
#[derive(Clone)]
pub struct PlayerRecorder {
    store: Arc<ProfileStore>,
    player_id: String,
}

impl PlayerRecorder {
    pub fn new(store: Arc<ProfileStore>, player_id: impl Into<String>) -> Self {
        Self {
            store,
            player_id: player_id.into(),
        }
    }
}

impl ResultRecorder for PlayerRecorder {
    fn record_match_result(&self, outcome: MatchOutcome, damage_dealt: u32, max_combo: u32) {
        self.store
            .update_stats(&self.player_id, outcome, damage_dealt, max_combo);
    }
}
