//! Game simulation modules

pub mod bot;
pub mod characters;
pub mod clock;
pub mod combat;
pub mod combatant;
pub mod r#match;
pub mod physics;
pub mod render;
pub mod snapshot;
pub mod sync;

pub use combatant::{Combatant, Direction, Facing, FighterState};
pub use r#match::{GameMatch, Match, MatchConfig, MatchEvent, MatchHandle, MatchPhase};

use serde::{Deserialize, Serialize};

/// One of the two participants. The host owns the left spawn, the guest the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Host,
    Guest,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Host, Side::Guest];

    pub fn other(self) -> Side {
        match self {
            Side::Host => Side::Guest,
            Side::Guest => Side::Host,
        }
    }

    /// Slot in the match's combatant pair and in snapshot player lists
    pub fn index(self) -> usize {
        match self {
            Side::Host => 0,
            Side::Guest => 1,
        }
    }
}

/// Input state for a single tick, from local controls, a bot or a remote peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub movement: Direction,
    #[serde(default)]
    pub jump: bool,
    #[serde(default)]
    pub block: bool,
    #[serde(default)]
    pub attack: bool,
    #[serde(default)]
    pub dash: bool,
    #[serde(default)]
    pub ability: Option<usize>,
}

impl Intent {
    pub fn moving(direction: Direction) -> Self {
        Self {
            movement: direction,
            ..Self::default()
        }
    }

    pub fn attacking() -> Self {
        Self {
            attack: true,
            ..Self::default()
        }
    }

    /// True if the intent triggers a one-shot action this tick
    pub fn has_action(&self) -> bool {
        self.jump || self.attack || self.dash || self.ability.is_some()
    }

    /// `next` replaces the held state; one-shot actions still pending in
    /// `self` are kept until a tick consumes them.
    pub fn merged(self, next: Intent) -> Self {
        Self {
            movement: next.movement,
            block: next.block,
            jump: self.jump || next.jump,
            attack: self.attack || next.attack,
            dash: self.dash || next.dash,
            ability: self.ability.or(next.ability),
        }
    }

    /// The held part of the intent, with one-shot actions cleared
    pub fn held(&self) -> Self {
        Self {
            movement: self.movement,
            block: self.block,
            ..Self::default()
        }
    }
}
