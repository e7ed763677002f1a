//! Read-only match view and the render sink that consumes it

use serde::Serialize;
use tracing::{debug, trace};

use super::combat::Projectile;
use super::combatant::{Combatant, TimedModifier};
use super::{Facing, FighterState, MatchEvent, MatchPhase, Side};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FighterView<'a> {
    pub side: Side,
    pub character_id: &'a str,
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    pub state: FighterState,
    pub health: i32,
    pub max_health: i32,
    pub awake: f32,
    pub rounds_won: u32,
    /// Active timed ability effects
    pub effects: &'a [TimedModifier],
}

impl<'a> FighterView<'a> {
    pub fn of(c: &'a Combatant) -> Self {
        Self {
            side: c.side,
            character_id: c.character().id,
            x: c.x,
            y: c.y,
            facing: c.facing,
            state: c.state,
            health: c.health(),
            max_health: c.max_health(),
            awake: c.awake(),
            rounds_won: c.rounds_won,
            effects: c.modifiers(),
        }
    }
}

/// Everything a frame needs. Borrowed from the match, so a sink cannot mutate it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView<'a> {
    pub phase: MatchPhase,
    pub round: u32,
    pub rounds_to_win: u32,
    pub timer: u32,
    pub countdown: u32,
    pub fighters: [FighterView<'a>; 2],
    pub projectiles: &'a [Projectile],
}

/// Frame consumer
pub trait RenderSink {
    fn render(&mut self, view: &MatchView<'_>, events: &[MatchEvent]);
}

/// Headless sink that logs frames
#[derive(Debug, Default)]
pub struct TracingSink {
    frames: u64,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderSink for TracingSink {
    fn render(&mut self, view: &MatchView<'_>, events: &[MatchEvent]) {
        self.frames += 1;
        trace!(
            frame = self.frames,
            phase = ?view.phase,
            timer = view.timer,
            host_health = view.fighters[0].health,
            guest_health = view.fighters[1].health,
            "frame"
        );
        for event in events {
            debug!(frame = self.frames, event = ?event, "match event");
        }
    }
}
