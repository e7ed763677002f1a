//! Peer wire protocol
//! These are the JSON frames exchanged between host and guest, and between the
//! relay/practice server and its participants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{Facing, FighterState, Intent, Side};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("binary frames are not part of the protocol")]
    Binary,
}

/// Messages exchanged between the two participants of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMsg {
    /// Opponent picked a character in the lobby
    #[serde(rename_all = "camelCase")]
    CharacterSelect {
        player_id: String,
        character_id: String,
    },

    /// Opponent toggled ready
    #[serde(rename_all = "camelCase")]
    Ready { player_id: String, ready: bool },

    /// Cosmetic trigger; never applies damage by itself
    #[serde(rename_all = "camelCase")]
    AbilityUsed {
        player: Side,
        ability_index: usize,
        position: Position,
        direction: Facing,
    },

    /// Damage already applied by the attacker's side
    Damage {
        attacker: Side,
        target: Side,
        damage: i32,
    },

    /// Full state overwrite, host to guest only
    GameState(GameSnapshot),

    /// Match begins with these bindings
    #[serde(rename_all = "camelCase")]
    GameStart {
        host: PlayerInfo,
        guest: PlayerInfo,
        room_code: String,
    },

    /// Guest intents for the host to apply to the guest combatant
    PlayerInput {
        /// Sequence number, stale inputs are ignored
        seq: u32,
        intent: Intent,
    },

    /// Host declared the match over
    MatchEnd { winner: Option<Side>, reason: String },

    /// The other participant's transport went away
    #[serde(rename_all = "camelCase")]
    PeerLeft { player_id: String },
}

impl PeerMsg {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire discriminator, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMsg::CharacterSelect { .. } => "character_select",
            PeerMsg::Ready { .. } => "ready",
            PeerMsg::AbilityUsed { .. } => "ability_used",
            PeerMsg::Damage { .. } => "damage",
            PeerMsg::GameState(_) => "game_state",
            PeerMsg::GameStart { .. } => "game_start",
            PeerMsg::PlayerInput { .. } => "player_input",
            PeerMsg::MatchEnd { .. } => "match_end",
            PeerMsg::PeerLeft { .. } => "peer_left",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Player binding announced in `game_start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub player_id: String,
    pub character_id: String,
}

/// Periodic full-state broadcast. Lost snapshots are healed by the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Indexed by side: host first, guest second
    pub players: Vec<PlayerSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub timer: u32,
    pub round: u32,
    /// Current target after draw extensions; 0 when the sender omits it
    #[serde(default)]
    pub rounds_to_win: u32,
}

/// Combatant state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub health: i32,
    pub awake: f32,
    pub state: FighterState,
    #[serde(default)]
    pub rounds_won: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileSnapshot {
    pub id: u32,
    pub owner: Side,
    pub ability_index: usize,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub damage: i32,
}
