//! Per-fighter physical and combat state

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::characters::{AbilityDefinition, AbilityEffectKind, AbilityRuntimeState, CharacterDefinition};
use super::physics::{PhysicsSystem, Rect, BODY_HEIGHT, BODY_WIDTH, GROUND_Y};
use super::Side;
use crate::util::time::millis_to_secs;

/// Maximum awake gauge
pub const MAX_AWAKE: f32 = 100.0;
/// Movement speed while blocking
pub const BLOCK_SPEED: f32 = 2.0;
/// Horizontal speed forced while dashing
pub const DASH_SPEED: f32 = 20.0;

pub const ATTACK_ACTIVE_SECS: f32 = 0.2;
pub const ATTACK_COOLDOWN_SECS: f32 = 0.5;
pub const COMBO_WINDOW_SECS: f32 = 1.0;
pub const DASH_ACTIVE_SECS: f32 = 0.3;
pub const DASH_COOLDOWN_SECS: f32 = 1.0;
pub const HURT_SECS: f32 = 0.2;

/// Awake gained per attack swing
pub const AWAKE_PER_ATTACK: f32 = 2.0;
/// Blocked hits keep this fraction of their damage
pub const BLOCK_DAMAGE_FACTOR: f32 = 0.3;
/// Combo length after which outgoing damage is scaled
pub const COMBO_BONUS_THRESHOLD: u32 = 3;
pub const COMBO_BONUS_MULTIPLIER: f32 = 1.2;

/// Regeneration period in simulated seconds
pub const REGEN_PERIOD_SECS: f32 = 17.0;

/// Spawn x for each side
pub fn spawn_x(side: Side) -> f32 {
    match side {
        Side::Host => 200.0,
        Side::Guest => 700.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Left,
    Right,
}

impl Facing {
    pub fn sign(self) -> f32 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }
}

/// Movement intent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    None,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FighterState {
    #[default]
    Idle,
    Walk,
    Jump,
    Attack,
    Hurt,
    Block,
    Dash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    DamageBoost,
    DoubleHit,
}

/// Buff left behind by an ability, expiring on its own timer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimedModifier {
    pub kind: ModifierKind,
    pub remaining: f32,
    pub magnitude: f32,
}

/// A fighter in a match
#[derive(Debug, Clone)]
pub struct Combatant {
    pub side: Side,
    character: Arc<CharacterDefinition>,

    // Position and movement
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub facing: Facing,
    pub grounded: bool,
    speed: f32,

    // Resources
    health: i32,
    awake: f32,

    pub state: FighterState,
    blocking: bool,
    hurt_remaining: f32,

    // Attack
    attack_active_remaining: f32,
    attack_cooldown: f32,
    attack_activation: u32,
    attack_credited: bool,
    combo_counter: u32,
    combo_timer: f32,

    // Dash
    dash_remaining: f32,
    dash_cooldown: f32,

    ability_cooldowns: Vec<f32>,
    modifiers: Vec<TimedModifier>,
    regen_timer: f32,

    pub rounds_won: u32,

    // Stats
    pub damage_dealt: u32,
    pub max_combo: u32,
}

impl Combatant {
    pub fn new(side: Side, character: Arc<CharacterDefinition>) -> Self {
        let facing = match side {
            Side::Host => Facing::Right,
            Side::Guest => Facing::Left,
        };
        let ability_count = character.abilities.len();
        Self {
            side,
            x: spawn_x(side),
            y: GROUND_Y,
            vel_x: 0.0,
            vel_y: 0.0,
            facing,
            grounded: true,
            speed: character.speed,
            health: character.health,
            awake: 0.0,
            state: FighterState::Idle,
            blocking: false,
            hurt_remaining: 0.0,
            attack_active_remaining: 0.0,
            attack_cooldown: 0.0,
            attack_activation: 0,
            attack_credited: false,
            combo_counter: 0,
            combo_timer: 0.0,
            dash_remaining: 0.0,
            dash_cooldown: 0.0,
            ability_cooldowns: vec![0.0; ability_count],
            modifiers: Vec::new(),
            regen_timer: 0.0,
            rounds_won: 0,
            damage_dealt: 0,
            max_combo: 0,
            character,
        }
    }

    pub fn character(&self) -> &CharacterDefinition {
        &self.character
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn max_health(&self) -> i32 {
        self.character.health
    }

    pub fn awake(&self) -> f32 {
        self.awake
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn is_attacking(&self) -> bool {
        self.attack_active_remaining > 0.0
    }

    pub fn is_dashing(&self) -> bool {
        self.dash_remaining > 0.0
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn attack_cooldown(&self) -> f32 {
        self.attack_cooldown
    }

    pub fn combo_counter(&self) -> u32 {
        self.combo_counter
    }

    pub fn modifiers(&self) -> &[TimedModifier] {
        &self.modifiers
    }

    pub fn has_modifier(&self, kind: ModifierKind) -> bool {
        self.modifiers.iter().any(|m| m.kind == kind)
    }

    pub fn set_health(&mut self, health: i32) {
        self.health = health.clamp(0, self.max_health());
    }

    pub fn set_awake(&mut self, awake: f32) {
        self.awake = awake.clamp(0.0, MAX_AWAKE);
    }

    pub fn add_awake(&mut self, amount: f32) {
        self.set_awake(self.awake + amount);
    }

    pub fn body_rect(&self) -> Rect {
        Rect::new(self.x, self.y, BODY_WIDTH, BODY_HEIGHT)
    }

    /// Runtime view of one ability slot
    pub fn ability(&self, index: usize) -> Option<AbilityRuntimeState<'_>> {
        let definition = self.character.abilities.get(index)?;
        Some(AbilityRuntimeState {
            definition,
            cooldown_remaining: self.ability_cooldowns[index],
        })
    }

    /// Identifier of the current attack swing, used to credit a hit once
    pub fn attack_activation(&self) -> u32 {
        self.attack_activation
    }

    /// Whether the current swing has already landed
    pub fn attack_credited(&self) -> bool {
        self.attack_credited
    }

    pub fn credit_attack(&mut self) {
        self.attack_credited = true;
    }

    pub fn apply_movement_intent(&mut self, direction: Direction) {
        match direction {
            Direction::Left => {
                self.vel_x = -self.speed;
                self.facing = Facing::Left;
            }
            Direction::Right => {
                self.vel_x = self.speed;
                self.facing = Facing::Right;
            }
            Direction::None => {
                self.vel_x = 0.0;
            }
        }
    }

    pub fn jump(&mut self) -> bool {
        if !self.grounded {
            return false;
        }
        self.vel_y = -self.character.jump;
        self.grounded = false;
        true
    }

    pub fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
        self.speed = if blocking {
            BLOCK_SPEED
        } else {
            self.character.speed
        };
    }

    /// Begin a melee swing. Rejected while on cooldown or dashing.
    pub fn start_attack(&mut self) -> bool {
        if self.attack_cooldown > 0.0 || self.is_dashing() {
            return false;
        }

        self.attack_active_remaining = ATTACK_ACTIVE_SECS;
        self.attack_cooldown = ATTACK_COOLDOWN_SECS;
        self.attack_activation = self.attack_activation.wrapping_add(1);
        self.attack_credited = false;

        self.combo_counter += 1;
        self.combo_timer = COMBO_WINDOW_SECS;
        self.max_combo = self.max_combo.max(self.combo_counter);

        self.add_awake(AWAKE_PER_ATTACK);
        self.refresh_state();
        true
    }

    pub fn start_dash(&mut self) -> bool {
        if !self.grounded || self.dash_cooldown > 0.0 {
            return false;
        }
        self.dash_remaining = DASH_ACTIVE_SECS;
        self.dash_cooldown = DASH_COOLDOWN_SECS;
        self.refresh_state();
        true
    }

    /// Fire an ability. Rejected without side effects unless the slot exists,
    /// its cooldown has elapsed and the awake cost can be paid.
    pub fn use_ability(&mut self, index: usize) -> bool {
        let Some(runtime) = self.ability(index) else {
            return false;
        };
        if !runtime.is_usable(self.awake) {
            return false;
        }

        let definition: AbilityDefinition = runtime.definition.clone();
        self.ability_cooldowns[index] = millis_to_secs(definition.cooldown_ms);
        self.set_awake(self.awake - definition.cost_awake);

        match definition.effect {
            AbilityEffectKind::DamageBoost {
                multiplier,
                duration_secs,
            } => self.modifiers.push(TimedModifier {
                kind: ModifierKind::DamageBoost,
                remaining: duration_secs,
                magnitude: multiplier,
            }),
            AbilityEffectKind::DoubleHit { duration_secs } => self.modifiers.push(TimedModifier {
                kind: ModifierKind::DoubleHit,
                remaining: duration_secs,
                magnitude: 1.0,
            }),
            AbilityEffectKind::Projectile | AbilityEffectKind::Cosmetic => {}
        }

        true
    }

    /// Apply an incoming hit. Returns the damage actually taken.
    pub fn take_damage(&mut self, raw_damage: i32) -> i32 {
        let effective = if self.blocking {
            (raw_damage as f32 * BLOCK_DAMAGE_FACTOR).floor() as i32
        } else {
            raw_damage
        };
        self.suffer(effective)
    }

    /// Apply damage that the attacking peer already mitigated
    pub fn apply_mirrored_damage(&mut self, damage: i32) -> i32 {
        self.suffer(damage)
    }

    fn suffer(&mut self, effective: i32) -> i32 {
        let effective = effective.max(0);
        self.set_health(self.health - effective);
        self.hurt_remaining = HURT_SECS;
        self.state = FighterState::Hurt;

        let knockback = effective as f32 * 0.5;
        self.vel_x = -self.facing.sign() * knockback;
        self.vel_y = -knockback * 0.5;

        effective
    }

    pub fn tick_timers(&mut self, dt: f32) {
        self.attack_cooldown = (self.attack_cooldown - dt).max(0.0);
        self.attack_active_remaining = (self.attack_active_remaining - dt).max(0.0);
        self.dash_cooldown = (self.dash_cooldown - dt).max(0.0);
        self.dash_remaining = (self.dash_remaining - dt).max(0.0);
        self.hurt_remaining = (self.hurt_remaining - dt).max(0.0);

        if self.combo_timer > 0.0 {
            self.combo_timer -= dt;
            if self.combo_timer <= 0.0 {
                self.combo_timer = 0.0;
                self.combo_counter = 0;
            }
        }

        for cooldown in &mut self.ability_cooldowns {
            *cooldown = (*cooldown - dt).max(0.0);
        }

        for modifier in &mut self.modifiers {
            modifier.remaining -= dt;
        }
        self.modifiers.retain(|m| m.remaining > 0.0);
    }

    pub fn tick_physics(&mut self, dt: f32) {
        let was_grounded = self.grounded;

        self.vel_y = PhysicsSystem::apply_gravity(self.vel_y, self.grounded, dt);

        if self.is_dashing() {
            self.vel_x = self.facing.sign() * DASH_SPEED;
        }

        let (x, y) = PhysicsSystem::integrate(self.x, self.y, self.vel_x, self.vel_y, dt);
        self.x = PhysicsSystem::clamp_to_arena(x, BODY_WIDTH);

        let (y, on_ground) = PhysicsSystem::resolve_ground(y);
        self.y = y;
        if on_ground {
            self.vel_y = 0.0;
            self.grounded = true;
            if !was_grounded {
                self.dash_remaining = 0.0;
            }
        } else {
            self.grounded = false;
        }

        self.refresh_state();
    }

    /// Periodic self-heal. Returns the amount healed when the period elapses.
    pub fn tick_regen<R: Rng + ?Sized>(&mut self, dt: f32, rng: &mut R) -> Option<i32> {
        self.regen_timer += dt;
        if self.regen_timer < REGEN_PERIOD_SECS {
            return None;
        }
        self.regen_timer = 0.0;

        let heal = 5 + (self.awake / 20.0).floor() as i32;
        let before = self.health;
        self.set_health(self.health + heal);

        if self.awake > 0.0 {
            let decay: f32 = rng.gen_range(2.0..3.0);
            self.set_awake(self.awake - decay);
        }

        Some(self.health - before)
    }

    /// Outgoing melee damage with buffs and combo scaling applied
    pub fn current_damage(&self) -> i32 {
        let mut damage = self.character.damage as f32;
        for modifier in &self.modifiers {
            if modifier.kind == ModifierKind::DamageBoost {
                damage *= modifier.magnitude;
            }
        }
        if self.combo_counter > COMBO_BONUS_THRESHOLD {
            damage *= COMBO_BONUS_MULTIPLIER;
        }
        damage.floor() as i32
    }

    /// Derive the visible state. Hurt overrides for its short window, then
    /// attacking, dashing, blocking, airborne, walking, idle in that order.
    pub fn refresh_state(&mut self) {
        self.state = if self.hurt_remaining > 0.0 {
            FighterState::Hurt
        } else if self.is_attacking() {
            FighterState::Attack
        } else if self.is_dashing() {
            FighterState::Dash
        } else if self.blocking {
            FighterState::Block
        } else if !self.grounded {
            FighterState::Jump
        } else if self.vel_x.abs() > 0.0 {
            FighterState::Walk
        } else {
            FighterState::Idle
        };
    }

    /// Reset between rounds. Health is handled by the match; awake carries over.
    pub fn reset_for_round(&mut self) {
        self.x = spawn_x(self.side);
        self.y = GROUND_Y;
        self.vel_x = 0.0;
        self.vel_y = 0.0;
        self.facing = match self.side {
            Side::Host => Facing::Right,
            Side::Guest => Facing::Left,
        };
        self.grounded = true;
        self.set_blocking(false);
        self.hurt_remaining = 0.0;
        self.attack_active_remaining = 0.0;
        self.attack_cooldown = 0.0;
        self.attack_credited = false;
        self.combo_counter = 0;
        self.combo_timer = 0.0;
        self.dash_remaining = 0.0;
        self.dash_cooldown = 0.0;
        self.ability_cooldowns.iter_mut().for_each(|c| *c = 0.0);
        self.modifiers.clear();
        self.regen_timer = 0.0;
        self.state = FighterState::Idle;
    }

    /// Overwrite the mirrored fields from a host snapshot
    pub fn apply_snapshot(&mut self, x: f32, y: f32, health: i32, awake: f32, state: FighterState) {
        self.x = x;
        self.y = y;
        self.grounded = y >= GROUND_Y;
        self.set_health(health);
        self.set_awake(awake);
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::characters::Roster;
    use crate::game::physics::ARENA_WIDTH;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const DT: f32 = 1.0 / 60.0;

    fn fighter(id: &str) -> Combatant {
        Combatant::new(Side::Host, Roster::global().get(id).unwrap())
    }

    #[test]
    fn movement_sets_velocity_and_facing() {
        let mut c = fighter("yuji_young");
        c.apply_movement_intent(Direction::Left);
        assert_eq!(c.vel_x, -5.0);
        assert_eq!(c.facing, Facing::Left);

        c.apply_movement_intent(Direction::None);
        assert_eq!(c.vel_x, 0.0);
        assert_eq!(c.facing, Facing::Left);
    }

    #[test]
    fn blocking_slows_movement() {
        let mut c = fighter("toji");
        c.set_blocking(true);
        c.apply_movement_intent(Direction::Right);
        assert_eq!(c.vel_x, BLOCK_SPEED);

        c.set_blocking(false);
        c.apply_movement_intent(Direction::Right);
        assert_eq!(c.vel_x, 7.0);
    }

    #[test]
    fn jump_requires_ground() {
        let mut c = fighter("yuji_young");
        assert!(c.jump());
        assert_eq!(c.vel_y, -15.0);
        assert!(!c.grounded);
        assert!(!c.jump());
    }

    #[test]
    fn attack_sets_windows_and_awake() {
        let mut c = fighter("yuji_young");
        assert!(c.start_attack());
        assert!(c.is_attacking());
        assert_eq!(c.attack_cooldown(), ATTACK_COOLDOWN_SECS);
        assert_eq!(c.combo_counter(), 1);
        assert_eq!(c.awake(), 2.0);
        assert_eq!(c.state, FighterState::Attack);

        assert!(!c.start_attack());
        assert_eq!(c.combo_counter(), 1);
    }

    #[test]
    fn dashing_blocks_attacking() {
        let mut c = fighter("yuji_young");
        assert!(c.start_dash());
        let cooldown_before = c.attack_cooldown();
        assert!(!c.start_attack());
        assert!(!c.is_attacking());
        assert_eq!(c.attack_cooldown(), cooldown_before);
    }

    #[test]
    fn dash_forces_speed_until_timer_expires() {
        let mut c = fighter("yuji_young");
        assert!(c.start_dash());
        c.apply_movement_intent(Direction::None);
        c.tick_physics(DT);
        assert_eq!(c.vel_x, DASH_SPEED);
        assert_eq!(c.state, FighterState::Dash);

        for _ in 0..20 {
            c.tick_timers(DT);
        }
        assert!(!c.is_dashing());
        assert!(!c.start_dash(), "dash cooldown still running");
    }

    #[test]
    fn dash_cancels_on_landing() {
        let mut c = fighter("yuji_young");
        assert!(c.start_dash());
        c.grounded = false;
        c.y = GROUND_Y - 1.0;
        c.vel_y = 5.0;
        c.tick_physics(DT);
        assert!(c.grounded);
        assert!(!c.is_dashing());
    }

    #[test]
    fn ability_rejected_without_awake_or_during_cooldown() {
        let mut c = fighter("yuji_young");
        assert!(!c.use_ability(0), "no awake yet");
        assert_eq!(c.awake(), 0.0);

        c.set_awake(45.0);
        assert!(c.use_ability(0));
        assert_eq!(c.awake(), 25.0);

        for _ in 0..5 {
            assert!(!c.use_ability(0));
        }
        assert_eq!(c.awake(), 25.0);
        assert!(c.ability(0).unwrap().cooldown_remaining > 4.9);

        assert!(!c.use_ability(9));
    }

    #[test]
    fn black_flash_boosts_damage_until_expiry() {
        let mut c = fighter("yuji_young");
        c.set_awake(100.0);
        assert!(c.use_ability(1));
        assert!(c.has_modifier(ModifierKind::DamageBoost));
        assert_eq!(c.current_damage(), 25);

        for _ in 0..61 {
            c.tick_timers(DT);
        }
        assert!(!c.has_modifier(ModifierKind::DamageBoost));
        assert_eq!(c.current_damage(), 10);
    }

    #[test]
    fn divergent_fist_adds_double_hit_window() {
        let mut c = fighter("yuji_young");
        c.set_awake(20.0);
        assert!(c.use_ability(0));
        assert!(c.has_modifier(ModifierKind::DoubleHit));
        assert_eq!(c.awake(), 0.0);
    }

    #[test]
    fn combo_scaling_after_three_hits() {
        let mut c = fighter("yuji_young");
        for _ in 0..4 {
            assert!(c.start_attack());
            for _ in 0..31 {
                c.tick_timers(DT);
            }
        }
        assert_eq!(c.combo_counter(), 4);
        assert_eq!(c.current_damage(), 12);
        assert_eq!(c.max_combo, 4);
    }

    #[test]
    fn combo_resets_after_window() {
        let mut c = fighter("yuji_young");
        c.start_attack();
        for _ in 0..61 {
            c.tick_timers(DT);
        }
        assert_eq!(c.combo_counter(), 0);
    }

    #[test]
    fn blocked_damage_is_floored_fraction() {
        let mut c = fighter("yuji_young");
        c.set_blocking(true);
        assert_eq!(c.take_damage(25), 7);
        assert_eq!(c.health(), 93);

        c.set_blocking(false);
        assert_eq!(c.take_damage(25), 25);
        assert_eq!(c.health(), 68);
        assert_eq!(c.state, FighterState::Hurt);
    }

    #[test]
    fn knockback_opposes_facing() {
        let mut c = fighter("yuji_young");
        c.facing = Facing::Right;
        c.take_damage(20);
        assert_eq!(c.vel_x, -10.0);
        assert_eq!(c.vel_y, -5.0);
    }

    #[test]
    fn health_never_negative() {
        let mut c = fighter("yuji_young");
        c.take_damage(500);
        assert_eq!(c.health(), 0);
        assert!(!c.is_alive());
    }

    #[test]
    fn hurt_state_expires() {
        let mut c = fighter("yuji_young");
        c.take_damage(1);
        c.apply_movement_intent(Direction::None);
        for _ in 0..13 {
            c.tick_timers(DT);
            c.tick_physics(DT);
        }
        assert_ne!(c.state, FighterState::Hurt);
    }

    #[test]
    fn arena_left_edge_holds() {
        let mut c = fighter("yuji_young");
        c.x = 0.0;
        c.apply_movement_intent(Direction::Left);
        c.tick_physics(DT);
        assert_eq!(c.x, 0.0);

        c.x = ARENA_WIDTH - BODY_WIDTH;
        c.apply_movement_intent(Direction::Right);
        c.tick_physics(DT);
        assert_eq!(c.x, ARENA_WIDTH - BODY_WIDTH);
    }

    #[test]
    fn jump_arc_lands_back_on_ground() {
        let mut c = fighter("yuji_young");
        c.jump();
        let mut airborne_ticks = 0;
        while !c.grounded && airborne_ticks < 600 {
            c.tick_physics(DT);
            airborne_ticks += 1;
        }
        assert!(c.grounded);
        assert_eq!(c.y, GROUND_Y);
        assert!(airborne_ticks > 10);
    }

    #[test]
    fn regen_heals_every_period_and_drains_awake() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut c = fighter("yuji_young");
        c.set_health(50);
        c.set_awake(40.0);

        assert_eq!(c.tick_regen(16.0, &mut rng), None);
        assert_eq!(c.tick_regen(1.0, &mut rng), Some(7));
        assert_eq!(c.health(), 57);
        let awake = c.awake();
        assert!(awake > 37.0 && awake <= 38.0, "awake = {awake}");
    }

    #[test]
    fn regen_caps_at_max_health() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut c = fighter("yuji_young");
        c.set_health(98);
        assert_eq!(c.tick_regen(REGEN_PERIOD_SECS, &mut rng), Some(2));
        assert_eq!(c.health(), 100);
        assert_eq!(c.awake(), 0.0);
    }

    #[test]
    fn resources_stay_clamped() {
        let mut c = fighter("yuji_young");
        c.add_awake(250.0);
        assert_eq!(c.awake(), MAX_AWAKE);
        c.set_health(1000);
        assert_eq!(c.health(), 100);
        c.set_awake(-3.0);
        assert_eq!(c.awake(), 0.0);
    }

    #[test]
    fn round_reset_keeps_awake() {
        let mut c = fighter("yuji_young");
        c.set_awake(60.0);
        c.x = 512.0;
        c.start_attack();
        c.reset_for_round();
        assert_eq!(c.x, spawn_x(Side::Host));
        assert_eq!(c.combo_counter(), 0);
        assert!(!c.is_attacking());
        assert_eq!(c.awake(), 60.0);
    }
}
