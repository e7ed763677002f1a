//! Combat system - hitboxes, hit resolution, projectiles

use serde::Serialize;

use super::combatant::{Combatant, Facing};
use super::physics::{PhysicsSystem, Rect, BODY_HEIGHT, BODY_WIDTH};
use super::Side;
use crate::util::time::REFERENCE_FPS;

/// Reach of a melee swing in front of the body
pub const ATTACK_RANGE: f32 = 80.0;
/// Height of the melee swing, centred on the body
pub const ATTACK_HEIGHT: f32 = 60.0;
/// Awake awarded to the attacker for a landed melee hit
pub const AWAKE_PER_HIT: f32 = 5.0;

pub const PROJECTILE_SPEED: f32 = 12.0;
pub const PROJECTILE_WIDTH: f32 = 40.0;
pub const PROJECTILE_HEIGHT: f32 = 20.0;

/// How a hit was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitKind {
    Melee,
    Projectile,
}

/// Hit result from combat resolution
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub attacker: Side,
    pub target: Side,
    pub kind: HitKind,
    /// Damage after block mitigation
    pub damage: i32,
    pub x: f32,
    pub y: f32,
    pub target_defeated: bool,
}

/// Active projectile fired by a projectile-type ability
#[derive(Debug, Clone, Serialize)]
pub struct Projectile {
    pub id: u32,
    pub owner: Side,
    pub ability_index: usize,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    /// Fixed damage carried from the ability, independent of buffs and combo
    pub damage: i32,
}

impl Projectile {
    /// Spawn in front of the owner, travelling the way it faces
    pub fn spawn(id: u32, owner: &Combatant, ability_index: usize, damage: i32) -> Self {
        let x = match owner.facing {
            Facing::Right => owner.x + BODY_WIDTH,
            Facing::Left => owner.x - PROJECTILE_WIDTH,
        };
        Self {
            id,
            owner: owner.side,
            ability_index,
            x,
            y: owner.y + BODY_HEIGHT / 2.0 - PROJECTILE_HEIGHT / 2.0,
            vel_x: owner.facing.sign() * PROJECTILE_SPEED,
            damage,
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.x += self.vel_x * dt * REFERENCE_FPS;
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, PROJECTILE_WIDTH, PROJECTILE_HEIGHT)
    }
}

/// Collision and damage resolution
pub struct CombatSystem;

impl CombatSystem {
    /// Melee reach box extending from the body in the facing direction
    pub fn attack_hitbox(c: &Combatant) -> Rect {
        let x = match c.facing {
            Facing::Right => c.x + BODY_WIDTH,
            Facing::Left => c.x - ATTACK_RANGE,
        };
        let y = c.y + BODY_HEIGHT / 2.0 - ATTACK_HEIGHT / 2.0;
        Rect::new(x, y, ATTACK_RANGE, ATTACK_HEIGHT)
    }

    pub fn body_hitbox(c: &Combatant) -> Rect {
        c.body_rect()
    }

    pub fn intersects(a: &Rect, b: &Rect) -> bool {
        a.intersects(b)
    }

    /// Land the attacker's current swing on the defender, at most once per swing.
    /// Returns the damage applied after mitigation.
    pub fn resolve_melee_hit(attacker: &mut Combatant, defender: &mut Combatant) -> Option<i32> {
        if !attacker.is_attacking() || attacker.attack_credited() {
            return None;
        }
        if !Self::intersects(&Self::attack_hitbox(attacker), &Self::body_hitbox(defender)) {
            return None;
        }

        let damage = attacker.current_damage();
        let applied = defender.take_damage(damage);

        attacker.credit_attack();
        attacker.add_awake(AWAKE_PER_HIT);
        attacker.damage_dealt += applied as u32;

        Some(applied)
    }

    /// Positional correction for overlapping bodies. Returns true if moved.
    pub fn resolve_body_overlap(a: &mut Combatant, b: &mut Combatant) -> bool {
        let body_a = Self::body_hitbox(a);
        let body_b = Self::body_hitbox(b);
        if !Self::intersects(&body_a, &body_b) {
            return false;
        }
        let (xa, xb) = PhysicsSystem::resolve_body_overlap(&body_a, &body_b);
        a.x = xa;
        b.x = xb;
        true
    }

    /// Move projectiles, apply hits and drop spent ones.
    /// `fighters` is indexed by `Side::index`; hits on a target are only
    /// applied when `resolves(attacker)` allows it.
    pub fn update_projectiles(
        projectiles: &mut Vec<Projectile>,
        fighters: &mut [Combatant; 2],
        dt: f32,
        resolves: impl Fn(Side) -> bool,
    ) -> Vec<HitResult> {
        let mut hits = Vec::new();

        projectiles.retain_mut(|projectile| {
            projectile.update(dt);

            let target_side = projectile.owner.other();
            let target = &mut fighters[target_side.index()];
            if Self::intersects(&projectile.rect(), &Self::body_hitbox(target)) {
                if resolves(projectile.owner) {
                    let applied = target.take_damage(projectile.damage);
                    hits.push(HitResult {
                        attacker: projectile.owner,
                        target: target_side,
                        kind: HitKind::Projectile,
                        damage: applied,
                        x: projectile.x,
                        y: projectile.y,
                        target_defeated: !target.is_alive(),
                    });
                }
                return false;
            }

            !PhysicsSystem::is_out_of_arena(&projectile.rect())
        });

        for hit in &hits {
            fighters[hit.attacker.index()].damage_dealt += hit.damage as u32;
        }

        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::characters::Roster;
    use crate::game::combatant::FighterState;
    use crate::game::physics::{ARENA_WIDTH, GROUND_Y};

    fn pair() -> [Combatant; 2] {
        let roster = Roster::global();
        [
            Combatant::new(Side::Host, roster.get("yuji_young").unwrap()),
            Combatant::new(Side::Guest, roster.get("yuji_young").unwrap()),
        ]
    }

    #[test]
    fn attack_hitbox_follows_facing() {
        let [mut a, _] = pair();
        a.x = 100.0;
        a.facing = Facing::Right;
        let hb = CombatSystem::attack_hitbox(&a);
        assert_eq!(hb, Rect::new(180.0, GROUND_Y + 60.0, 80.0, 60.0));

        a.facing = Facing::Left;
        assert_eq!(CombatSystem::attack_hitbox(&a).x, 20.0);
    }

    #[test]
    fn melee_hit_scenario() {
        let [mut a, mut b] = pair();
        a.x = 300.0;
        b.x = 400.0;
        a.set_awake(96.0);
        a.start_attack();
        // boost to exactly 25
        a.use_ability(1);
        assert_eq!(a.current_damage(), 25);
        let awake_before = a.awake();

        let applied = CombatSystem::resolve_melee_hit(&mut a, &mut b);
        assert_eq!(applied, Some(25));
        assert_eq!(b.health(), 75);
        assert_eq!(b.state, FighterState::Hurt);
        assert_eq!(a.awake(), (awake_before + AWAKE_PER_HIT).min(100.0));
        assert_eq!(a.damage_dealt, 25);
    }

    #[test]
    fn melee_credits_once_per_swing() {
        let [mut a, mut b] = pair();
        a.x = 300.0;
        b.x = 400.0;
        a.start_attack();
        assert_eq!(CombatSystem::resolve_melee_hit(&mut a, &mut b), Some(10));
        assert_eq!(CombatSystem::resolve_melee_hit(&mut a, &mut b), None);
        assert_eq!(b.health(), 90);
    }

    #[test]
    fn melee_misses_out_of_reach_or_idle() {
        let [mut a, mut b] = pair();
        a.x = 100.0;
        b.x = 700.0;
        a.start_attack();
        assert_eq!(CombatSystem::resolve_melee_hit(&mut a, &mut b), None);

        let [mut idle, mut near] = pair();
        idle.x = 300.0;
        near.x = 400.0;
        assert_eq!(CombatSystem::resolve_melee_hit(&mut idle, &mut near), None);
    }

    #[test]
    fn blocked_melee_reports_mitigated_damage() {
        let [mut a, mut b] = pair();
        a.x = 300.0;
        b.x = 400.0;
        b.set_blocking(true);
        a.start_attack();
        assert_eq!(CombatSystem::resolve_melee_hit(&mut a, &mut b), Some(3));
        assert_eq!(b.health(), 97);
    }

    #[test]
    fn body_overlap_separates() {
        let [mut a, mut b] = pair();
        a.x = 400.0;
        b.x = 450.0;
        assert!(CombatSystem::resolve_body_overlap(&mut a, &mut b));
        assert_eq!((a.x, b.x), (390.0, 460.0));

        a.x = 0.0;
        b.x = 500.0;
        assert!(!CombatSystem::resolve_body_overlap(&mut a, &mut b));
    }

    #[test]
    fn projectile_hits_opponent_with_fixed_damage() {
        let mut fighters = pair();
        fighters[0].x = 300.0;
        fighters[1].x = 420.0;
        fighters[0].set_awake(100.0);
        fighters[0].start_attack();

        let mut projectiles = vec![Projectile::spawn(1, &fighters[0], 0, 35)];
        let hits = CombatSystem::update_projectiles(&mut projectiles, &mut fighters, 1.0 / 60.0, |_| true);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].damage, 35);
        assert_eq!(hits[0].kind, HitKind::Projectile);
        assert!(projectiles.is_empty());
        assert_eq!(fighters[1].health(), 65);
        assert_eq!(fighters[0].damage_dealt, 35);
    }

    #[test]
    fn projectile_removed_when_leaving_arena() {
        let mut fighters = pair();
        fighters[0].x = ARENA_WIDTH - BODY_WIDTH;
        fighters[1].x = 0.0;
        let mut projectiles = vec![Projectile::spawn(1, &fighters[0], 0, 35)];
        for _ in 0..10 {
            CombatSystem::update_projectiles(&mut projectiles, &mut fighters, 1.0 / 60.0, |_| true);
        }
        assert!(projectiles.is_empty());
        assert_eq!(fighters[1].health(), 100);
    }

    #[test]
    fn unresolved_projectile_is_consumed_without_damage() {
        let mut fighters = pair();
        fighters[0].x = 300.0;
        fighters[1].x = 420.0;
        let mut projectiles = vec![Projectile::spawn(1, &fighters[0], 0, 35)];
        let hits = CombatSystem::update_projectiles(&mut projectiles, &mut fighters, 1.0 / 60.0, |_| false);
        assert!(hits.is_empty());
        assert!(projectiles.is_empty());
        assert_eq!(fighters[1].health(), 100);
    }
}
