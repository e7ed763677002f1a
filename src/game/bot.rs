//! Bot policies that drive a combatant in place of local input

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

use super::{Combatant, Direction, Intent};

/// Closer than this the bot approaches
pub const APPROACH_DISTANCE: f32 = 300.0;
/// Closer than this the bot backs off
pub const RETREAT_DISTANCE: f32 = 100.0;

const RETREAT_ATTACK_CHANCE: f64 = 0.1;
const WANDER_TOGGLE_CHANCE: f64 = 0.02;
const WANDER_JUMP_CHANCE: f64 = 0.01;
const WANDER_ATTACK_CHANCE: f64 = 0.05;
const WANDER_ABILITY_CHANCE: f64 = 0.01;

/// Supplies one combatant's intent every tick
pub trait BotPolicy: Send {
    fn decide(&mut self, me: &Combatant, opponent: &Combatant) -> Intent;
}

/// Distance-driven policy with a seeded random walk.
/// Identical seeds and inputs produce identical intents.
pub struct RandomBot {
    rng: ChaCha8Rng,
    // held direction keys, toggled during the random walk
    left: bool,
    right: bool,
}

impl RandomBot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            left: false,
            right: false,
        }
    }

    fn hold(&mut self, direction: Direction) {
        self.left = direction == Direction::Left;
        self.right = direction == Direction::Right;
    }

    fn held_direction(&self) -> Direction {
        if self.left {
            Direction::Left
        } else if self.right {
            Direction::Right
        } else {
            Direction::None
        }
    }
}

impl BotPolicy for RandomBot {
    fn decide(&mut self, me: &Combatant, opponent: &Combatant) -> Intent {
        let distance = (me.x - opponent.x).abs();
        let roll: f64 = self.rng.gen();
        let mut intent = Intent::default();

        let toward = if me.x < opponent.x {
            Direction::Right
        } else {
            Direction::Left
        };
        let away = if toward == Direction::Right {
            Direction::Left
        } else {
            Direction::Right
        };

        if distance > APPROACH_DISTANCE {
            self.hold(toward);
        } else if distance < RETREAT_DISTANCE {
            self.hold(away);
            intent.attack = roll < RETREAT_ATTACK_CHANCE;
        } else {
            if roll < WANDER_TOGGLE_CHANCE {
                self.left = !self.left;
                self.right = !self.right;
            }
            intent.jump = roll < WANDER_JUMP_CHANCE && me.grounded;
            intent.attack = roll < WANDER_ATTACK_CHANCE;

            let abilities = me.character().abilities.len();
            if roll < WANDER_ABILITY_CHANCE && abilities > 0 {
                intent.ability = Some(self.rng.gen_range(0..abilities));
            }
        }

        intent.movement = self.held_direction();
        intent
    }
}

/// Replays a fixed list of intents, then stands still
#[derive(Debug, Default)]
pub struct ScriptedBot {
    script: VecDeque<Intent>,
}

impl ScriptedBot {
    pub fn new(script: impl IntoIterator<Item = Intent>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl BotPolicy for ScriptedBot {
    fn decide(&mut self, _me: &Combatant, _opponent: &Combatant) -> Intent {
        self.script.pop_front().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::characters::Roster;
    use crate::game::Side;

    fn fighters(bot_x: f32, player_x: f32) -> (Combatant, Combatant) {
        let roster = Roster::global();
        let mut bot = Combatant::new(Side::Host, roster.get("yuji").unwrap());
        let mut player = Combatant::new(Side::Guest, roster.get("yuji_young").unwrap());
        bot.x = bot_x;
        player.x = player_x;
        (bot, player)
    }

    #[test]
    fn approaches_when_far() {
        let (bot, player) = fighters(100.0, 700.0);
        let mut policy = RandomBot::new(7);
        for _ in 0..50 {
            assert_eq!(policy.decide(&bot, &player).movement, Direction::Right);
        }

        let (bot, player) = fighters(900.0, 100.0);
        assert_eq!(policy.decide(&bot, &player).movement, Direction::Left);
    }

    #[test]
    fn retreats_when_close() {
        let (bot, player) = fighters(450.0, 400.0);
        let mut policy = RandomBot::new(7);
        let mut attacked = 0;
        for _ in 0..500 {
            let intent = policy.decide(&bot, &player);
            assert_eq!(intent.movement, Direction::Right);
            assert!(intent.ability.is_none());
            if intent.attack {
                attacked += 1;
            }
        }
        assert!(attacked > 0 && attacked < 200);
    }

    #[test]
    fn same_seed_same_decisions() {
        let (bot, player) = fighters(300.0, 500.0);
        let mut a = RandomBot::new(42);
        let mut b = RandomBot::new(42);
        for _ in 0..1000 {
            assert_eq!(a.decide(&bot, &player), b.decide(&bot, &player));
        }
    }

    #[test]
    fn wander_abilities_stay_in_range() {
        let (bot, player) = fighters(300.0, 500.0);
        let mut policy = RandomBot::new(3);
        for _ in 0..5000 {
            if let Some(index) = policy.decide(&bot, &player).ability {
                assert!(index < bot.character().abilities.len());
            }
        }
    }

    #[test]
    fn scripted_bot_replays_then_idles() {
        let (bot, player) = fighters(300.0, 500.0);
        let mut policy = ScriptedBot::new([Intent::attacking(), Intent::moving(Direction::Left)]);
        assert!(policy.decide(&bot, &player).attack);
        assert_eq!(policy.decide(&bot, &player).movement, Direction::Left);
        assert_eq!(policy.remaining(), 0);
        assert_eq!(policy.decide(&bot, &player), Intent::default());
    }
}
