//! Snapshot building for the host to guest `game_state` broadcast

use crate::ws::protocol::{GameSnapshot, PlayerSnapshot, ProjectileSnapshot};

use super::combat::Projectile;
use super::{Combatant, Match, Side};

/// Decides when to send and builds full-state snapshots
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (round transitions, match end)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    pub fn build(&self, game: &Match) -> GameSnapshot {
        GameSnapshot {
            players: Side::BOTH
                .iter()
                .map(|side| player_snapshot(game.fighter(*side)))
                .collect(),
            projectiles: game.projectiles().iter().map(projectile_snapshot).collect(),
            timer: game.timer(),
            round: game.round(),
            rounds_to_win: game.rounds_to_win(),
        }
    }
}

fn player_snapshot(c: &Combatant) -> PlayerSnapshot {
    PlayerSnapshot {
        x: c.x,
        y: c.y,
        health: c.health(),
        awake: c.awake(),
        state: c.state,
        rounds_won: c.rounds_won,
    }
}

fn projectile_snapshot(p: &Projectile) -> ProjectileSnapshot {
    ProjectileSnapshot {
        id: p.id,
        owner: p.owner,
        ability_index: p.ability_index,
        x: p.x,
        y: p.y,
        vel_x: p.vel_x,
        damage: p.damage,
    }
}

impl From<&ProjectileSnapshot> for Projectile {
    fn from(s: &ProjectileSnapshot) -> Self {
        Projectile {
            id: s.id,
            owner: s.owner,
            ability_index: s.ability_index,
            x: s.x,
            y: s.y,
            vel_x: s.vel_x,
            damage: s.damage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::characters::Roster;
    use crate::game::r#match::{MatchAuthority, MatchConfig};

    #[test]
    fn sends_every_interval_and_on_force() {
        let mut builder = SnapshotBuilder::new(3);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);

        builder.should_send();
        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn snapshot_lists_host_then_guest() {
        let roster = Roster::global();
        let mut game = Match::new(
            MatchConfig::default(),
            MatchAuthority::Host,
            Side::Host,
            roster.get("gojo").unwrap(),
            roster.get("sukuna").unwrap(),
        );
        game.fighter_mut(Side::Guest).set_health(60);

        let snapshot = SnapshotBuilder::new(3).build(&game);
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(snapshot.players[0].health, 120);
        assert_eq!(snapshot.players[1].health, 60);
        assert_eq!(snapshot.timer, 99);
        assert_eq!(snapshot.round, 1);
        assert_eq!(snapshot.rounds_to_win, 2);
    }
}
