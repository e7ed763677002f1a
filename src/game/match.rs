//! Match state machine and the server-hosted authoritative tick loop

use dashmap::DashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{MatchOutcome, NoopRecorder, ResultRecorder};
use crate::util::time::TICK_DURATION_MICROS;
use crate::ws::protocol::PeerMsg;

use super::bot::BotPolicy;
use super::characters::CharacterDefinition;
use super::clock::SecondTicker;
use super::combat::{CombatSystem, HitKind, Projectile};
use super::combatant::{Combatant, Facing};
use super::render::{FighterView, MatchView};
use super::sync::{Authority, BroadcastTransport, InboundSender, MatchSession};
use super::{Intent, Side};

pub const DEFAULT_ROUND_TIME_SECS: u32 = 99;
pub const DEFAULT_ROUNDS_TO_WIN: u32 = 2;
pub const COUNTDOWN_SECS: u32 = 3;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Constructed, waiting for an explicit start
    Waiting,
    /// 3-2-1 before a round, no simulation
    Countdown,
    /// Simulation running
    Playing,
    /// Overlay on `Playing`, clock and round timer suspended
    Paused,
    /// Transient while a finished round is resolved
    RoundEnd,
    Ended,
}

/// Who owns the authoritative state of this match instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchAuthority {
    /// Sole writer: runs the round timer and resolves rounds and the match
    Host,
    /// Local optimistic copy corrected by host snapshots
    Mirror,
}

#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub round_time_secs: u32,
    pub rounds_to_win: u32,
    /// Upper bound for draw extensions; `None` extends forever
    pub max_rounds_to_win: Option<u32>,
    pub countdown_secs: u32,
    /// Seed for regen decay; bots carry their own
    pub seed: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            round_time_secs: DEFAULT_ROUND_TIME_SECS,
            rounds_to_win: DEFAULT_ROUNDS_TO_WIN,
            max_rounds_to_win: None,
            countdown_secs: COUNTDOWN_SECS,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEndReason {
    Knockout,
    Timeout,
}

impl RoundEndReason {
    fn as_str(self) -> &'static str {
        match self {
            RoundEndReason::Knockout => "knockout",
            RoundEndReason::Timeout => "timeout",
        }
    }
}

/// Something that happened during a tick, for render sinks and the sync layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchEvent {
    CountdownTick {
        remaining: u32,
    },
    RoundStarted {
        round: u32,
    },
    Hit {
        attacker: Side,
        target: Side,
        kind: HitKind,
        damage: i32,
        x: f32,
        y: f32,
    },
    /// Damage reported by the other peer
    DamageReceived {
        attacker: Side,
        target: Side,
        damage: i32,
    },
    AbilityUsed {
        side: Side,
        index: usize,
        x: f32,
        y: f32,
        facing: Facing,
    },
    Regen {
        side: Side,
        amount: i32,
    },
    RoundEnded {
        round: u32,
        winner: Option<Side>,
        reason: RoundEndReason,
    },
    MatchEnded {
        winner: Option<Side>,
        reason: String,
    },
}

/// One two-fighter match
pub struct Match {
    config: MatchConfig,
    authority: MatchAuthority,
    /// Side whose result is recorded and whose hits a mirror resolves
    perspective: Side,
    characters: [Arc<CharacterDefinition>; 2],
    fighters: [Combatant; 2],

    phase: MatchPhase,
    round: u32,
    rounds_to_win: u32,
    timer: u32,
    countdown: u32,
    seconds: SecondTicker,

    projectiles: Vec<Projectile>,
    next_projectile_id: u32,

    intents: [Intent; 2],
    bots: [Option<Box<dyn BotPolicy>>; 2],
    rng: ChaCha8Rng,

    recorder: Arc<dyn ResultRecorder>,
    winner: Option<Side>,
    end_reason: Option<String>,
    result_recorded: bool,
}

impl Match {
    pub fn new(
        config: MatchConfig,
        authority: MatchAuthority,
        perspective: Side,
        host: Arc<CharacterDefinition>,
        guest: Arc<CharacterDefinition>,
    ) -> Self {
        let fighters = [
            Combatant::new(Side::Host, host.clone()),
            Combatant::new(Side::Guest, guest.clone()),
        ];
        Self {
            rounds_to_win: config.rounds_to_win,
            timer: config.round_time_secs,
            countdown: config.countdown_secs,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            authority,
            perspective,
            characters: [host, guest],
            fighters,
            phase: MatchPhase::Waiting,
            round: 1,
            seconds: SecondTicker::new(),
            projectiles: Vec::new(),
            next_projectile_id: 0,
            intents: [Intent::default(); 2],
            bots: [None, None],
            recorder: Arc::new(NoopRecorder),
            winner: None,
            end_reason: None,
            result_recorded: false,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ResultRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn authority(&self) -> MatchAuthority {
        self.authority
    }

    pub fn perspective(&self) -> Side {
        self.perspective
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn rounds_to_win(&self) -> u32 {
        self.rounds_to_win
    }

    /// Whole seconds left in the round
    pub fn timer(&self) -> u32 {
        self.timer
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn end_reason(&self) -> Option<&str> {
        self.end_reason.as_deref()
    }

    pub fn result_recorded(&self) -> bool {
        self.result_recorded
    }

    pub fn fighter(&self, side: Side) -> &Combatant {
        &self.fighters[side.index()]
    }

    pub fn fighter_mut(&mut self, side: Side) -> &mut Combatant {
        &mut self.fighters[side.index()]
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn set_bot(&mut self, side: Side, bot: Box<dyn BotPolicy>) {
        self.bots[side.index()] = Some(bot);
    }

    pub fn clear_bot(&mut self, side: Side) {
        self.bots[side.index()] = None;
    }

    pub fn is_bot(&self, side: Side) -> bool {
        self.bots[side.index()].is_some()
    }

    /// Latest input for a side. Movement and block are held until replaced,
    /// one-shot actions fire on the next playing tick only. Several inputs
    /// before that tick accumulate their one-shot actions.
    pub fn set_intent(&mut self, side: Side, intent: Intent) {
        let pending = &mut self.intents[side.index()];
        *pending = pending.merged(intent);
    }

    /// Begin from `Waiting` or `Ended` (rematch). Everything is rebuilt, so
    /// no timer state from a previous run survives.
    pub fn start(&mut self) -> bool {
        if !matches!(self.phase, MatchPhase::Waiting | MatchPhase::Ended) {
            return false;
        }

        self.fighters = [
            Combatant::new(Side::Host, self.characters[0].clone()),
            Combatant::new(Side::Guest, self.characters[1].clone()),
        ];
        self.round = 1;
        self.rounds_to_win = self.config.rounds_to_win;
        self.timer = self.config.round_time_secs;
        self.countdown = self.config.countdown_secs;
        self.seconds.reset();
        self.projectiles.clear();
        self.next_projectile_id = 0;
        self.intents = [Intent::default(); 2];
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.winner = None;
        self.end_reason = None;
        self.result_recorded = false;
        self.phase = MatchPhase::Countdown;

        info!(
            host = self.characters[0].id,
            guest = self.characters[1].id,
            authority = ?self.authority,
            "Match started"
        );
        true
    }

    pub fn pause(&mut self) {
        if self.phase == MatchPhase::Playing {
            self.phase = MatchPhase::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.phase == MatchPhase::Paused {
            self.phase = MatchPhase::Playing;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.phase == MatchPhase::Paused
    }

    /// Leave the match. A later `start` rebuilds from scratch.
    pub fn stop(&mut self) {
        self.seconds.reset();
        self.projectiles.clear();
        self.intents = [Intent::default(); 2];
        self.phase = MatchPhase::Waiting;
        debug!("Match stopped");
    }

    /// End without a winner. Nothing is recorded.
    pub fn force_end(&mut self, reason: &str) -> Option<MatchEvent> {
        if self.phase == MatchPhase::Ended {
            return None;
        }
        self.phase = MatchPhase::Ended;
        self.winner = None;
        self.end_reason = Some(reason.to_string());
        info!(reason, "Match force-ended");
        Some(MatchEvent::MatchEnded {
            winner: None,
            reason: reason.to_string(),
        })
    }

    /// Adopt a winner declared by the host
    pub fn declare_result(&mut self, winner: Side, reason: &str) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        if self.phase != MatchPhase::Ended {
            self.finish(Some(winner), reason, &mut events);
        }
        events
    }

    /// Round and timer from a host snapshot. A higher round means the host
    /// already resolved the previous one, so the local round is reset.
    pub fn adopt_round(&mut self, round: u32, timer: u32, rounds_to_win: u32) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        if self.authority != MatchAuthority::Mirror
            || matches!(self.phase, MatchPhase::Waiting | MatchPhase::Ended)
        {
            return events;
        }
        if round > self.round {
            self.enter_round(round);
            events.push(MatchEvent::CountdownTick {
                remaining: self.countdown,
            });
        }
        self.timer = timer;
        if rounds_to_win > 0 {
            self.rounds_to_win = rounds_to_win;
        }
        events
    }

    /// Swap in another peer's projectiles, keeping locally owned ones
    pub fn replace_projectiles(&mut self, owner: Side, projectiles: Vec<Projectile>) {
        self.projectiles.retain(|p| p.owner != owner);
        self.projectiles.extend(projectiles);
    }

    /// Fire an ability for a side. Rejections leave no trace.
    pub fn use_ability(&mut self, side: Side, index: usize) -> Option<MatchEvent> {
        let fighter = &mut self.fighters[side.index()];
        if !fighter.use_ability(index) {
            return None;
        }

        let ability = &fighter.character().abilities[index];
        let (effect, damage) = (ability.effect, ability.damage_base);
        debug!(side = ?side, ability = ability.name, "Ability used");

        if effect == super::characters::AbilityEffectKind::Projectile {
            self.next_projectile_id = self.next_projectile_id.wrapping_add(1);
            self.projectiles.push(Projectile::spawn(
                self.next_projectile_id,
                fighter,
                index,
                damage,
            ));
        }

        Some(MatchEvent::AbilityUsed {
            side,
            index,
            x: fighter.x,
            y: fighter.y,
            facing: fighter.facing,
        })
    }

    /// Advance by `dt` seconds
    pub fn tick(&mut self, dt: f32) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        match self.phase {
            MatchPhase::Countdown => self.tick_countdown(dt, &mut events),
            MatchPhase::Playing => self.tick_playing(dt, &mut events),
            MatchPhase::Waiting | MatchPhase::Paused | MatchPhase::RoundEnd | MatchPhase::Ended => {}
        }
        events
    }

    pub fn view(&self) -> MatchView<'_> {
        MatchView {
            phase: self.phase,
            round: self.round,
            rounds_to_win: self.rounds_to_win,
            timer: self.timer,
            countdown: self.countdown,
            fighters: [
                FighterView::of(&self.fighters[0]),
                FighterView::of(&self.fighters[1]),
            ],
            projectiles: &self.projectiles,
        }
    }

    fn tick_countdown(&mut self, dt: f32, events: &mut Vec<MatchEvent>) {
        for _ in 0..self.seconds.advance(dt) {
            self.countdown = self.countdown.saturating_sub(1);
            if self.countdown == 0 {
                self.phase = MatchPhase::Playing;
                self.seconds.reset();
                events.push(MatchEvent::RoundStarted { round: self.round });
                break;
            }
            events.push(MatchEvent::CountdownTick {
                remaining: self.countdown,
            });
        }
    }

    // intents -> timers -> physics -> collision -> win check
    fn tick_playing(&mut self, dt: f32, events: &mut Vec<MatchEvent>) {
        for side in Side::BOTH {
            let intent = self.next_intent(side);
            self.apply_intent(side, intent, events);
        }

        for fighter in &mut self.fighters {
            fighter.tick_timers(dt);
            if let Some(amount) = fighter.tick_regen(dt, &mut self.rng) {
                if amount > 0 {
                    events.push(MatchEvent::Regen {
                        side: fighter.side,
                        amount,
                    });
                }
            }
        }
        if self.authority == MatchAuthority::Host {
            for _ in 0..self.seconds.advance(dt) {
                self.timer = self.timer.saturating_sub(1);
            }
        }

        for fighter in &mut self.fighters {
            fighter.tick_physics(dt);
        }
        let [host, guest] = &mut self.fighters;
        CombatSystem::resolve_body_overlap(host, guest);

        self.resolve_hits(dt, events);

        if self.authority == MatchAuthority::Host {
            self.check_round_end(events);
        }
    }

    fn next_intent(&mut self, side: Side) -> Intent {
        let i = side.index();
        match &mut self.bots[i] {
            Some(bot) => bot.decide(&self.fighters[i], &self.fighters[side.other().index()]),
            None => {
                let intent = self.intents[i];
                self.intents[i] = intent.held();
                intent
            }
        }
    }

    fn apply_intent(&mut self, side: Side, intent: Intent, events: &mut Vec<MatchEvent>) {
        let fighter = &mut self.fighters[side.index()];
        fighter.set_blocking(intent.block);
        fighter.apply_movement_intent(intent.movement);
        if intent.jump {
            fighter.jump();
        }
        if intent.dash {
            fighter.start_dash();
        }
        if intent.attack {
            fighter.start_attack();
        }
        if let Some(index) = intent.ability {
            events.extend(self.use_ability(side, index));
        }
    }

    fn resolves_hits_for(&self, attacker: Side) -> bool {
        self.authority == MatchAuthority::Host || attacker == self.perspective
    }

    fn resolve_hits(&mut self, dt: f32, events: &mut Vec<MatchEvent>) {
        for attacker_side in Side::BOTH {
            if !self.resolves_hits_for(attacker_side) {
                continue;
            }
            let [host, guest] = &mut self.fighters;
            let (attacker, defender) = match attacker_side {
                Side::Host => (host, guest),
                Side::Guest => (guest, host),
            };
            if let Some(damage) = CombatSystem::resolve_melee_hit(attacker, defender) {
                events.push(MatchEvent::Hit {
                    attacker: attacker_side,
                    target: defender.side,
                    kind: HitKind::Melee,
                    damage,
                    x: defender.x,
                    y: defender.y,
                });
            }
        }

        let authority = self.authority;
        let perspective = self.perspective;
        let hits = CombatSystem::update_projectiles(
            &mut self.projectiles,
            &mut self.fighters,
            dt,
            |owner| authority == MatchAuthority::Host || owner == perspective,
        );
        events.extend(hits.into_iter().map(|hit| MatchEvent::Hit {
            attacker: hit.attacker,
            target: hit.target,
            kind: hit.kind,
            damage: hit.damage,
            x: hit.x,
            y: hit.y,
        }));
    }

    fn check_round_end(&mut self, events: &mut Vec<MatchEvent>) {
        let host = self.fighters[0].health();
        let guest = self.fighters[1].health();

        let reason = if host == 0 || guest == 0 {
            RoundEndReason::Knockout
        } else if self.timer == 0 {
            RoundEndReason::Timeout
        } else {
            return;
        };

        let winner = match host.cmp(&guest) {
            std::cmp::Ordering::Greater => Some(Side::Host),
            std::cmp::Ordering::Less => Some(Side::Guest),
            std::cmp::Ordering::Equal => None,
        };
        self.resolve_round(winner, reason, events);
    }

    fn resolve_round(
        &mut self,
        winner: Option<Side>,
        reason: RoundEndReason,
        events: &mut Vec<MatchEvent>,
    ) {
        self.phase = MatchPhase::RoundEnd;
        events.push(MatchEvent::RoundEnded {
            round: self.round,
            winner,
            reason,
        });
        info!(round = self.round, winner = ?winner, reason = reason.as_str(), "Round ended");

        match winner {
            Some(side) => {
                let fighter = &mut self.fighters[side.index()];
                fighter.rounds_won += 1;
                if fighter.rounds_won >= self.rounds_to_win {
                    self.finish(Some(side), reason.as_str(), events);
                    return;
                }
            }
            None => {
                let capped = self
                    .config
                    .max_rounds_to_win
                    .is_some_and(|cap| self.rounds_to_win >= cap);
                if !capped {
                    self.rounds_to_win += 1;
                }
            }
        }

        self.enter_round(self.round + 1);
    }

    /// Reset both fighters for `round` and count down again. Awake carries over.
    fn enter_round(&mut self, round: u32) {
        self.round = round;
        self.timer = self.config.round_time_secs;
        for fighter in &mut self.fighters {
            fighter.reset_for_round();
            fighter.set_health(fighter.max_health());
        }
        self.projectiles.clear();
        self.intents = [Intent::default(); 2];
        self.countdown = self.config.countdown_secs;
        self.seconds.reset();
        self.phase = MatchPhase::Countdown;
    }

    fn finish(&mut self, winner: Option<Side>, reason: &str, events: &mut Vec<MatchEvent>) {
        self.phase = MatchPhase::Ended;
        self.winner = winner;
        self.end_reason = Some(reason.to_string());
        events.push(MatchEvent::MatchEnded {
            winner,
            reason: reason.to_string(),
        });
        info!(winner = ?winner, reason, round = self.round, "Match ended");

        if let Some(winner) = winner {
            self.record_result(winner);
        }
    }

    fn record_result(&mut self, winner: Side) {
        if self.result_recorded {
            return;
        }
        let me = &self.fighters[self.perspective.index()];
        let outcome = if winner == self.perspective {
            MatchOutcome::Win
        } else {
            MatchOutcome::Loss
        };
        self.recorder
            .record_match_result(outcome, me.damage_dealt, me.max_combo);
        self.result_recorded = true;
    }
}

/// Handle to a running server-hosted match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub inbound: InboundSender,
    pub outbound_tx: broadcast::Sender<PeerMsg>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl MatchHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<PeerMsg> {
        self.outbound_tx.subscribe()
    }
}

/// Registry of all running server-hosted matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A match hosted by the server: this process is the authority and
/// streams snapshots to the remote guest.
pub struct GameMatch {
    id: Uuid,
    session: MatchSession<BroadcastTransport>,
}

impl GameMatch {
    /// Create a new match. The caller configures bots and the recorder on `game`.
    pub fn new(id: Uuid, game: Match) -> (Self, MatchHandle) {
        let (outbound_tx, _) = broadcast::channel(64);
        let (inbound, queue) = super::sync::inbound_channel(256);

        let session = MatchSession::new(
            game,
            Box::new(Authority::new(Side::Host)),
            BroadcastTransport::new(outbound_tx.clone()),
            queue,
        );

        let handle = MatchHandle {
            id,
            inbound,
            outbound_tx,
            started_at: chrono::Utc::now(),
        };

        (Self { id, session }, handle)
    }

    pub fn session(&self) -> &MatchSession<BroadcastTransport> {
        &self.session
    }

    /// Run the authoritative tick loop until the match ends or the guest leaves
    pub async fn run(mut self) {
        info!(match_id = %self.id, "Hosted match started");

        let tick_duration = Duration::from_micros(TICK_DURATION_MICROS);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        self.session.start();
        let mut last = Instant::now();

        loop {
            tick_interval.tick().await;

            let now = Instant::now();
            let elapsed = now.duration_since(last).as_secs_f32();
            last = now;

            // Drain inbound messages, then simulate
            self.session.frame(elapsed);

            if self.session.game().phase() == MatchPhase::Ended {
                break;
            }
        }

        info!(
            match_id = %self.id,
            winner = ?self.session.game().winner(),
            reason = self.session.game().end_reason().unwrap_or_default(),
            "Hosted match finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::bot::ScriptedBot;
    use crate::game::characters::Roster;
    use crate::game::combatant::FighterState;
    use crate::game::Direction;
    use crate::util::time::tick_delta;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CountingRecorder {
        calls: Mutex<Vec<(MatchOutcome, u32, u32)>>,
    }

    impl ResultRecorder for CountingRecorder {
        fn record_match_result(&self, outcome: MatchOutcome, damage_dealt: u32, max_combo: u32) {
            self.calls.lock().push((outcome, damage_dealt, max_combo));
        }
    }

    fn new_match(config: MatchConfig) -> Match {
        let roster = Roster::global();
        Match::new(
            config,
            MatchAuthority::Host,
            Side::Host,
            roster.get("yuji_young").unwrap(),
            roster.get("yuji_young").unwrap(),
        )
    }

    fn playing(config: MatchConfig) -> Match {
        let mut game = new_match(config);
        assert!(game.start());
        game.tick(3.0);
        assert_eq!(game.phase(), MatchPhase::Playing);
        game
    }

    #[test]
    fn countdown_runs_three_two_one() {
        let mut game = new_match(MatchConfig::default());
        assert_eq!(game.phase(), MatchPhase::Waiting);
        assert!(game.tick(1.0).is_empty());

        game.start();
        assert_eq!(game.tick(1.0), vec![MatchEvent::CountdownTick { remaining: 2 }]);
        assert_eq!(game.tick(1.0), vec![MatchEvent::CountdownTick { remaining: 1 }]);
        assert_eq!(game.tick(1.0), vec![MatchEvent::RoundStarted { round: 1 }]);
        assert_eq!(game.phase(), MatchPhase::Playing);
    }

    #[test]
    fn countdown_does_not_simulate() {
        let mut game = new_match(MatchConfig::default());
        game.start();
        game.set_intent(Side::Host, Intent::moving(Direction::Right));
        game.tick(0.5);
        assert_eq!(game.fighter(Side::Host).x, 200.0);
    }

    #[test]
    fn timer_decrements_once_per_second() {
        let mut game = playing(MatchConfig::default());
        for _ in 0..60 {
            game.tick(tick_delta());
        }
        assert!(game.timer() == 98 || game.timer() == 99);
        for _ in 0..61 {
            game.tick(tick_delta());
        }
        assert!(game.timer() <= 98);
    }

    #[test]
    fn timeout_awards_round_to_healthier() {
        let mut game = playing(MatchConfig {
            round_time_secs: 1,
            ..MatchConfig::default()
        });
        game.fighter_mut(Side::Host).set_health(40);
        game.fighter_mut(Side::Guest).set_health(70);

        let events = game.tick(1.0);
        assert!(events.contains(&MatchEvent::RoundEnded {
            round: 1,
            winner: Some(Side::Guest),
            reason: RoundEndReason::Timeout,
        }));
        assert_eq!(game.fighter(Side::Guest).rounds_won, 1);
        assert_eq!(game.round(), 2);
        assert_eq!(game.phase(), MatchPhase::Countdown);
        assert_eq!(game.fighter(Side::Host).health(), 100);
        assert_eq!(game.timer(), 1);
    }

    #[test]
    fn draw_extends_rounds_to_win() {
        let mut game = playing(MatchConfig {
            round_time_secs: 1,
            ..MatchConfig::default()
        });
        let events = game.tick(1.0);
        assert!(events.iter().any(|e| matches!(
            e,
            MatchEvent::RoundEnded { winner: None, .. }
        )));
        assert_eq!(game.rounds_to_win(), 3);
        assert_eq!(game.round(), 2);
        assert_eq!(game.fighter(Side::Host).rounds_won, 0);
    }

    #[test]
    fn draw_extension_respects_cap() {
        let mut game = playing(MatchConfig {
            round_time_secs: 1,
            max_rounds_to_win: Some(3),
            ..MatchConfig::default()
        });
        game.tick(1.0);
        assert_eq!(game.rounds_to_win(), 3);
        game.tick(3.0);
        game.tick(1.0);
        assert_eq!(game.rounds_to_win(), 3);
        assert_eq!(game.round(), 3);
    }

    #[test]
    fn knockout_ends_round_immediately() {
        let mut game = playing(MatchConfig::default());
        game.fighter_mut(Side::Guest).set_health(0);
        let events = game.tick(tick_delta());
        assert!(events.contains(&MatchEvent::RoundEnded {
            round: 1,
            winner: Some(Side::Host),
            reason: RoundEndReason::Knockout,
        }));
        assert_eq!(game.fighter(Side::Host).rounds_won, 1);
    }

    #[test]
    fn match_ends_and_records_once() {
        let recorder = Arc::new(CountingRecorder::default());
        let mut game = new_match(MatchConfig::default()).with_recorder(recorder.clone());
        game.start();

        for _ in 0..2 {
            game.tick(3.0);
            game.fighter_mut(Side::Guest).set_health(0);
            game.tick(tick_delta());
        }

        assert_eq!(game.phase(), MatchPhase::Ended);
        assert_eq!(game.winner(), Some(Side::Host));
        assert_eq!(game.fighter(Side::Host).rounds_won, 2);

        // further ticks change nothing
        assert!(game.tick(1.0).is_empty());
        assert!(game.force_end("late").is_none());
        assert!(game.declare_result(Side::Guest, "late").is_empty());

        let calls = recorder.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, MatchOutcome::Win);
    }

    #[test]
    fn force_end_records_nothing() {
        let recorder = Arc::new(CountingRecorder::default());
        let mut game = new_match(MatchConfig::default()).with_recorder(recorder.clone());
        game.start();
        let event = game.force_end("peer_left");
        assert_eq!(
            event,
            Some(MatchEvent::MatchEnded {
                winner: None,
                reason: "peer_left".into()
            })
        );
        assert_eq!(game.phase(), MatchPhase::Ended);
        assert_eq!(game.winner(), None);
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn pause_is_idempotent_and_freezes_time() {
        let mut game = playing(MatchConfig::default());
        game.pause();
        game.pause();
        assert!(game.is_paused());
        assert!(game.tick(5.0).is_empty());
        assert_eq!(game.timer(), 99);

        game.resume();
        game.resume();
        assert_eq!(game.phase(), MatchPhase::Playing);
        game.tick(1.0);
        assert_eq!(game.timer(), 98);
    }

    #[test]
    fn pause_only_while_playing() {
        let mut game = new_match(MatchConfig::default());
        game.start();
        game.pause();
        assert_eq!(game.phase(), MatchPhase::Countdown);
    }

    #[test]
    fn restart_after_stop_reinitialises() {
        let mut game = playing(MatchConfig::default());
        game.set_intent(Side::Host, Intent::attacking());
        game.tick(tick_delta());
        assert!(game.fighter(Side::Host).attack_cooldown() > 0.0);

        assert!(!game.start());
        game.stop();
        assert_eq!(game.phase(), MatchPhase::Waiting);
        assert!(game.start());
        assert_eq!(game.fighter(Side::Host).attack_cooldown(), 0.0);
        assert_eq!(game.fighter(Side::Host).awake(), 0.0);
        assert_eq!(game.round(), 1);
    }

    #[test]
    fn rematch_from_ended() {
        let mut game = playing(MatchConfig {
            rounds_to_win: 1,
            ..MatchConfig::default()
        });
        game.fighter_mut(Side::Host).set_health(0);
        game.tick(tick_delta());
        assert_eq!(game.winner(), Some(Side::Guest));

        assert!(game.start());
        assert_eq!(game.winner(), None);
        assert_eq!(game.fighter(Side::Guest).rounds_won, 0);
        assert!(!game.result_recorded());
    }

    #[test]
    fn left_edge_stays_in_bounds() {
        let mut game = playing(MatchConfig::default());
        game.fighter_mut(Side::Host).x = 0.0;
        game.set_intent(Side::Host, Intent::moving(Direction::Left));
        game.tick(tick_delta());
        assert_eq!(game.fighter(Side::Host).x, 0.0);
    }

    #[test]
    fn attack_intent_lands_once() {
        let mut game = playing(MatchConfig::default());
        game.fighter_mut(Side::Host).x = 300.0;
        game.fighter_mut(Side::Guest).x = 400.0;
        game.set_intent(Side::Host, Intent::attacking());

        let events = game.tick(tick_delta());
        assert!(events.iter().any(|e| matches!(
            e,
            MatchEvent::Hit { attacker: Side::Host, damage: 10, kind: HitKind::Melee, .. }
        )));
        assert_eq!(game.fighter(Side::Guest).health(), 90);
        assert_eq!(game.fighter(Side::Guest).state, FighterState::Hurt);

        // the attack was one-shot: no second swing, no second credit
        let events = game.tick(tick_delta());
        assert!(!events.iter().any(|e| matches!(e, MatchEvent::Hit { .. })));
        assert_eq!(game.fighter(Side::Guest).health(), 90);
    }

    #[test]
    fn pending_actions_survive_a_later_input() {
        let mut game = playing(MatchConfig::default());
        game.fighter_mut(Side::Host).set_awake(50.0);
        game.set_intent(
            Side::Host,
            Intent {
                ability: Some(1),
                jump: true,
                ..Intent::default()
            },
        );
        game.set_intent(Side::Host, Intent::moving(Direction::Right));

        let events = game.tick(tick_delta());
        assert!(events.iter().any(|e| matches!(
            e,
            MatchEvent::AbilityUsed { side: Side::Host, index: 1, .. }
        )));
        assert!(!game.fighter(Side::Host).grounded);
        assert!(game.fighter(Side::Host).x > 200.0);

        // consumed: the next tick fires nothing
        let events = game.tick(tick_delta());
        assert!(!events.iter().any(|e| matches!(e, MatchEvent::AbilityUsed { .. })));
    }

    #[test]
    fn projectile_ability_spawns_and_hits() {
        let roster = Roster::global();
        let mut game = Match::new(
            MatchConfig::default(),
            MatchAuthority::Host,
            Side::Host,
            roster.get("yuji").unwrap(),
            roster.get("yuji_young").unwrap(),
        );
        game.start();
        game.tick(3.0);
        game.fighter_mut(Side::Host).set_awake(50.0);

        let used = game.use_ability(Side::Host, 0);
        assert!(matches!(used, Some(MatchEvent::AbilityUsed { side: Side::Host, index: 0, .. })));
        assert_eq!(game.projectiles().len(), 1);
        assert_eq!(game.fighter(Side::Host).awake(), 30.0);

        // on cooldown now
        assert!(game.use_ability(Side::Host, 0).is_none());

        let mut hit = None;
        for _ in 0..120 {
            for event in game.tick(tick_delta()) {
                if let MatchEvent::Hit { kind: HitKind::Projectile, damage, .. } = event {
                    hit = Some(damage);
                }
            }
        }
        assert_eq!(hit, Some(35));
        assert!(game.projectiles().is_empty());
    }

    #[test]
    fn bot_drives_its_side() {
        let mut game = playing(MatchConfig::default());
        game.set_bot(
            Side::Guest,
            Box::new(ScriptedBot::new(vec![Intent::moving(Direction::Left); 10])),
        );
        assert!(game.is_bot(Side::Guest));
        for _ in 0..10 {
            game.tick(tick_delta());
        }
        assert!((game.fighter(Side::Guest).x - 650.0).abs() < 0.01);
    }

    #[test]
    fn mirror_neither_counts_down_timer_nor_resolves_rounds() {
        let roster = Roster::global();
        let mut game = Match::new(
            MatchConfig::default(),
            MatchAuthority::Mirror,
            Side::Guest,
            roster.get("yuji_young").unwrap(),
            roster.get("yuji_young").unwrap(),
        );
        game.start();
        game.tick(3.0);
        game.fighter_mut(Side::Host).set_health(0);
        game.tick(5.0);
        assert_eq!(game.timer(), 99);
        assert_eq!(game.phase(), MatchPhase::Playing);

        let events = game.adopt_round(2, 99, 2);
        assert_eq!(events, vec![MatchEvent::CountdownTick { remaining: 3 }]);
        assert_eq!(game.round(), 2);
        assert_eq!(game.phase(), MatchPhase::Countdown);
        assert_eq!(game.fighter(Side::Host).health(), 100);
    }

    #[tokio::test]
    async fn hosted_match_ends_when_guest_leaves() {
        let game = new_match(MatchConfig::default());
        let (game_match, handle) = GameMatch::new(Uuid::new_v4(), game);
        let _rx = handle.subscribe();
        let task = tokio::spawn(game_match.run());

        drop(handle);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("match loop should stop")
            .unwrap();
    }
}
