//! Character kits and ability bookkeeping

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::error;

/// Awake cost of every ability that is not a domain expansion
pub const DEFAULT_ABILITY_COST: f32 = 20.0;
/// Awake cost of a domain expansion (the full gauge)
pub const DOMAIN_ABILITY_COST: f32 = 100.0;

/// Character unlocked for every new profile
pub const STARTER_CHARACTER: &str = "yuji_young";

/// Ability archetype as listed in the character tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    Melee,
    Projectile,
    Dash,
    Special,
    Aoe,
    Push,
    Fire,
    Summon,
    Domain,
}

/// What the simulation does when an ability fires. Declared on each roster
/// row; projectile abilities default to [`AbilityEffectKind::Projectile`],
/// everything else to [`AbilityEffectKind::Cosmetic`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum AbilityEffectKind {
    /// Multiplies outgoing melee damage for a while
    DamageBoost { multiplier: f32, duration_secs: f32 },
    /// Marks the fighter with a second-impact window
    DoubleHit { duration_secs: f32 },
    /// Spawns a projectile carrying the ability's own damage
    Projectile,
    /// Visible effect only; the core applies no state change
    Cosmetic,
}

impl AbilityEffectKind {
    fn default_for(kind: AbilityKind) -> Self {
        match kind {
            AbilityKind::Projectile => Self::Projectile,
            _ => Self::Cosmetic,
        }
    }
}

const BLACK_FLASH: AbilityEffectKind = AbilityEffectKind::DamageBoost {
    multiplier: 2.5,
    duration_secs: 1.0,
};

/// Static ability definition
#[derive(Debug, Clone, Serialize)]
pub struct AbilityDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub damage_base: i32,
    pub cooldown_ms: u32,
    pub cost_awake: f32,
    pub kind: AbilityKind,
    pub effect: AbilityEffectKind,
}

impl AbilityDefinition {
    fn new(
        name: &'static str,
        description: &'static str,
        damage_base: i32,
        cooldown_ms: u32,
        kind: AbilityKind,
    ) -> Self {
        let cost_awake = if kind == AbilityKind::Domain {
            DOMAIN_ABILITY_COST
        } else {
            DEFAULT_ABILITY_COST
        };
        Self {
            name,
            description,
            damage_base,
            cooldown_ms,
            cost_awake,
            kind,
            effect: AbilityEffectKind::default_for(kind),
        }
    }

    fn with_effect(mut self, effect: AbilityEffectKind) -> Self {
        self.effect = effect;
        self
    }
}

/// Immutable character definition, shared read-only by every combatant using it
#[derive(Debug, Clone, Serialize)]
pub struct CharacterDefinition {
    pub id: &'static str,
    pub name: &'static str,
    /// Cosmetic tier label
    pub grade: &'static str,
    pub health: i32,
    pub speed: f32,
    pub jump: f32,
    pub damage: i32,
    pub abilities: Vec<AbilityDefinition>,
    pub locked: bool,
}

impl CharacterDefinition {
    /// The domain expansion ability, if this kit has one
    pub fn domain(&self) -> Option<&AbilityDefinition> {
        self.abilities
            .iter()
            .find(|a| a.kind == AbilityKind::Domain)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let domains = self
            .abilities
            .iter()
            .filter(|a| a.kind == AbilityKind::Domain)
            .count();
        if domains > 1 {
            return Err(CatalogError::MultipleDomains(self.id));
        }
        if self.health <= 0 {
            return Err(CatalogError::InvalidStats(self.id));
        }
        Ok(())
    }
}

/// Catalog errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    #[error("Character {0} has more than one domain ability")]
    MultipleDomains(&'static str),

    #[error("Character {0} has invalid base stats")]
    InvalidStats(&'static str),

    #[error("Character {0} is locked")]
    Locked(String),
}

/// The character catalog, built once per process
pub struct Roster {
    characters: Vec<Arc<CharacterDefinition>>,
}

impl Roster {
    /// Shared roster instance
    pub fn global() -> &'static Roster {
        static ROSTER: OnceLock<Roster> = OnceLock::new();
        ROSTER.get_or_init(Roster::builtin)
    }

    /// Build a roster from definitions, rejecting malformed kits
    pub fn from_definitions(characters: Vec<CharacterDefinition>) -> Result<Self, CatalogError> {
        for c in &characters {
            c.validate()?;
        }
        Ok(Self {
            characters: characters.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn get(&self, id: &str) -> Result<Arc<CharacterDefinition>, CatalogError> {
        self.characters
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownCharacter(id.to_string()))
    }

    pub fn all(&self) -> &[Arc<CharacterDefinition>] {
        &self.characters
    }

    /// Shipped kits. Invalid ones are logged and left out.
    fn builtin() -> Self {
        let characters = builtin_definitions()
            .into_iter()
            .filter(|c| match c.validate() {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, "Skipping invalid character");
                    false
                }
            })
            .map(Arc::new)
            .collect();
        Self { characters }
    }
}

fn builtin_definitions() -> Vec<CharacterDefinition> {
    use AbilityKind::*;
    let ab = AbilityDefinition::new;

    vec![
        CharacterDefinition {
            id: "yuji_young",
            name: "Yuji Itadori (Young)",
            grade: "Grade 3",
            health: 100,
            speed: 5.0,
            jump: 15.0,
            damage: 10,
            abilities: vec![
                ab("Divergent Fist", "Second impact after punch", 25, 5000, Melee)
                    .with_effect(AbilityEffectKind::DoubleHit { duration_secs: 0.5 }),
                ab("Black Flash", "2.5x damage multiplier", 40, 10000, Special)
                    .with_effect(BLACK_FLASH),
                ab("Small Knife", "Double dash attack", 20, 7000, Dash),
            ],
            locked: false,
        },
        CharacterDefinition {
            id: "yuji",
            name: "Yuji Itadori",
            grade: "Grade 1",
            health: 110,
            speed: 5.0,
            jump: 16.0,
            damage: 12,
            abilities: vec![
                ab("Piercing Blood", "Blood beam at speed of sound", 35, 8000, Projectile),
                ab("Dismantle", "Slashing attack through touch", 30, 6000, Melee),
                ab("Black Flash", "Enhanced 2.5x multiplier", 50, 12000, Special)
                    .with_effect(BLACK_FLASH),
            ],
            locked: true,
        },
        CharacterDefinition {
            id: "gojo",
            name: "Satoru Gojo",
            grade: "Special Grade",
            health: 120,
            speed: 6.0,
            jump: 18.0,
            damage: 15,
            abilities: vec![
                ab("Lapse Blue", "Creates vacuum pulling matter", 30, 7000, Aoe),
                ab("Reversal Red", "Powerful repulsive force", 40, 9000, Push),
                ab("Hollow Purple", "Imaginary mass destruction", 60, 15000, Projectile),
                ab("Unlimited Void", "Domain Expansion", 80, 90000, Domain),
            ],
            locked: true,
        },
        CharacterDefinition {
            id: "sukuna",
            name: "Ryomen Sukuna",
            grade: "Special Grade",
            health: 130,
            speed: 5.0,
            jump: 15.0,
            damage: 18,
            abilities: vec![
                ab("Dismantle", "Ranged slashing attack", 35, 5000, Projectile),
                ab("Cleave", "Adaptive slashing attack", 45, 8000, Melee),
                ab("Divine Flame", "Fire manipulation", 55, 12000, Fire),
                ab("Malevolent Shrine", "Domain Expansion", 90, 90000, Domain),
            ],
            locked: true,
        },
        CharacterDefinition {
            id: "toji",
            name: "Toji Fushiguro",
            grade: "Sorcerer Killer",
            health: 115,
            speed: 7.0,
            jump: 20.0,
            damage: 20,
            abilities: vec![
                ab("Weapon Master", "Nullifies cursed techniques", 30, 6000, Melee),
                ab("Strong Blows", "Superhuman strength", 40, 8000, Melee),
                ab("Speed Moves", "Superhuman speed and reflexes", 25, 5000, Dash),
            ],
            locked: true,
        },
        CharacterDefinition {
            id: "yuta",
            name: "Yuta Okkotsu",
            grade: "Special Grade",
            health: 125,
            speed: 5.0,
            jump: 16.0,
            damage: 14,
            abilities: vec![
                ab("Katana Hits", "Enhanced swordsmanship", 35, 6000, Melee),
                ab("Copy", "Copies random technique", 0, 20000, Special),
                ab("Summon Rika", "Cursed spirit companion", 50, 15000, Summon),
                ab("Authentic Mutual Love", "Domain Expansion", 85, 90000, Domain),
            ],
            locked: true,
        },
    ]
}

/// Derived per-ability runtime view: definition plus the owner's cooldown
#[derive(Debug, Clone, Copy)]
pub struct AbilityRuntimeState<'a> {
    pub definition: &'a AbilityDefinition,
    pub cooldown_remaining: f32,
}

impl AbilityRuntimeState<'_> {
    /// Usable iff the cooldown has elapsed and the owner can pay the cost
    pub fn is_usable(&self, awake: f32) -> bool {
        self.cooldown_remaining <= 0.0 && awake >= self.definition.cost_awake
    }
}

/// Which characters a player may pick
#[derive(Debug, Clone)]
pub struct UnlockSet {
    unlocked: HashSet<String>,
}

impl UnlockSet {
    pub fn new() -> Self {
        let mut unlocked = HashSet::new();
        unlocked.insert(STARTER_CHARACTER.to_string());
        Self { unlocked }
    }

    pub fn is_unlocked(&self, id: &str) -> bool {
        self.unlocked.contains(id)
    }

    pub fn unlock(&mut self, id: &str) {
        self.unlocked.insert(id.to_string());
    }

    /// Unlocked ids in stable order
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.unlocked.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve a selection, refusing unknown and locked characters
    pub fn select(
        &self,
        roster: &Roster,
        id: &str,
    ) -> Result<Arc<CharacterDefinition>, CatalogError> {
        let character = roster.get(id)?;
        if !self.is_unlocked(id) {
            return Err(CatalogError::Locked(id.to_string()));
        }
        Ok(character)
    }
}

impl Default for UnlockSet {
    fn default() -> Self {
        Self::new()
    }
}
