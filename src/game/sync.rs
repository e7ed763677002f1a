//! Host/guest reconciliation
//!
//! The host runs the authoritative [`Match`]; the guest runs a mirror that
//! applies its own input optimistically and takes the remote combatant, round
//! and timer from periodic full snapshots. Action messages (`ability_used`,
//! `damage`) are fire-and-forget. A lost one is a visual desync that the next
//! snapshot heals; nothing here retries or acknowledges.
//!
//! Inbound frames are queued and only applied at the start of the next frame,
//! never in the middle of a tick.

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::util::time::{tick_delta, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{GameSnapshot, PeerMsg, Position};

use super::characters::{CatalogError, Roster};
use super::clock::SimulationClock;
use super::combat::Projectile;
use super::r#match::{Match, MatchAuthority, MatchConfig, MatchEvent, MatchPhase};
use super::render::RenderSink;
use super::snapshot::SnapshotBuilder;
use super::{Intent, Side};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("expected game_start, got {0}")]
    NotGameStart(&'static str),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Outbound half of the channel to the other participant
pub trait Transport: Send {
    fn send(&self, msg: &PeerMsg) -> Result<(), TransportError>;
}

/// Fans messages out to every subscriber of a broadcast channel
pub struct BroadcastTransport {
    tx: broadcast::Sender<PeerMsg>,
}

impl BroadcastTransport {
    pub fn new(tx: broadcast::Sender<PeerMsg>) -> Self {
        Self { tx }
    }
}

impl Transport for BroadcastTransport {
    fn send(&self, msg: &PeerMsg) -> Result<(), TransportError> {
        self.tx
            .send(msg.clone())
            .map(|_| ())
            .map_err(|_| TransportError::Closed)
    }
}

/// Producer side of the inbound queue, held by whatever reads the socket
#[derive(Clone)]
pub struct InboundSender {
    tx: mpsc::Sender<PeerMsg>,
}

impl InboundSender {
    pub fn deliver(&self, msg: PeerMsg) -> Result<(), TransportError> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(kind = msg.kind(), "Inbound queue full, dropping message");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    /// Decode a text frame and queue it. Malformed frames are logged and dropped.
    pub fn deliver_text(&self, text: &str) -> Result<(), TransportError> {
        match PeerMsg::decode(text) {
            Ok(msg) => self.deliver(msg),
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                Ok(())
            }
        }
    }
}

/// Consumer side, drained at the tick boundary
pub struct InboundQueue {
    rx: mpsc::Receiver<PeerMsg>,
}

#[derive(Debug, Default)]
pub struct Drained {
    pub messages: Vec<PeerMsg>,
    /// Every sender is gone
    pub closed: bool,
}

impl InboundQueue {
    pub fn drain(&mut self) -> Drained {
        let mut drained = Drained::default();
        loop {
            match self.rx.try_recv() {
                Ok(msg) => drained.messages.push(msg),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    drained.closed = true;
                    break;
                }
            }
        }
        drained
    }
}

pub fn inbound_channel(capacity: usize) -> (InboundSender, InboundQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (InboundSender { tx }, InboundQueue { rx })
}

/// Host or guest behaviour, chosen once when the session is set up
pub trait SyncRole: Send {
    /// The side this participant controls
    fn side(&self) -> Side;

    /// Apply local input. Returns messages for the other participant.
    fn apply_local_action(&mut self, game: &mut Match, intent: Intent) -> Vec<PeerMsg>;

    /// Apply a host snapshot
    fn apply_remote_snapshot(&mut self, game: &mut Match, snapshot: &GameSnapshot) -> Vec<MatchEvent>;

    /// Apply any other inbound message
    fn apply_remote_message(&mut self, game: &mut Match, msg: PeerMsg) -> Vec<MatchEvent>;

    /// Messages produced by one simulation tick
    fn after_tick(&mut self, game: &Match, events: &[MatchEvent]) -> Vec<PeerMsg>;
}

/// `ability_used` and `damage` for actions of the local side
fn action_messages(local: Side, events: &[MatchEvent]) -> Vec<PeerMsg> {
    events
        .iter()
        .filter_map(|event| match *event {
            MatchEvent::AbilityUsed {
                side,
                index,
                x,
                y,
                facing,
            } if side == local => Some(PeerMsg::AbilityUsed {
                player: side,
                ability_index: index,
                position: Position { x, y },
                direction: facing,
            }),
            MatchEvent::Hit {
                attacker,
                target,
                damage,
                ..
            } if attacker == local => Some(PeerMsg::Damage {
                attacker,
                target,
                damage,
            }),
            _ => None,
        })
        .collect()
}

/// Remote ability: play the effect, apply nothing
fn remote_ability(local: Side, msg: &PeerMsg) -> Option<MatchEvent> {
    match *msg {
        PeerMsg::AbilityUsed {
            player,
            ability_index,
            position,
            direction,
        } if player != local => Some(MatchEvent::AbilityUsed {
            side: player,
            index: ability_index,
            x: position.x,
            y: position.y,
            facing: direction,
        }),
        _ => None,
    }
}

/// Host role: sole writer of match state
pub struct Authority {
    side: Side,
    last_input_seq: u32,
    snapshots: SnapshotBuilder,
}

impl Authority {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            last_input_seq: 0,
            snapshots: SnapshotBuilder::new(SIMULATION_TPS / SNAPSHOT_TPS),
        }
    }
}

impl SyncRole for Authority {
    fn side(&self) -> Side {
        self.side
    }

    fn apply_local_action(&mut self, game: &mut Match, intent: Intent) -> Vec<PeerMsg> {
        game.set_intent(self.side, intent);
        Vec::new()
    }

    fn apply_remote_snapshot(&mut self, _game: &mut Match, _snapshot: &GameSnapshot) -> Vec<MatchEvent> {
        warn!("Host ignores game_state from guest");
        Vec::new()
    }

    fn apply_remote_message(&mut self, game: &mut Match, msg: PeerMsg) -> Vec<MatchEvent> {
        let remote = self.side.other();
        if let Some(event) = remote_ability(self.side, &msg) {
            return vec![event];
        }

        match msg {
            PeerMsg::PlayerInput { seq, intent } => {
                if seq > self.last_input_seq {
                    self.last_input_seq = seq;
                    game.set_intent(remote, intent);
                } else {
                    debug!(seq, last = self.last_input_seq, "Stale input ignored");
                }
                Vec::new()
            }
            PeerMsg::Damage {
                attacker,
                target,
                damage,
            } => {
                debug!(?attacker, ?target, damage, "Guest reported damage");
                vec![MatchEvent::DamageReceived {
                    attacker,
                    target,
                    damage,
                }]
            }
            PeerMsg::PeerLeft { .. } => game.force_end("peer_left").into_iter().collect(),
            PeerMsg::GameState(snapshot) => self.apply_remote_snapshot(game, &snapshot),
            other => {
                debug!(kind = other.kind(), "Message not handled by host match");
                Vec::new()
            }
        }
    }

    fn after_tick(&mut self, game: &Match, events: &[MatchEvent]) -> Vec<PeerMsg> {
        let mut out = action_messages(self.side, events);

        if events.iter().any(|e| {
            matches!(
                e,
                MatchEvent::RoundEnded { .. } | MatchEvent::MatchEnded { .. }
            )
        }) {
            self.snapshots.force_next();
        }

        if game.phase() != MatchPhase::Waiting && self.snapshots.should_send() {
            out.push(PeerMsg::GameState(self.snapshots.build(game)));
        }

        for event in events {
            if let MatchEvent::MatchEnded { winner, reason } = event {
                out.push(PeerMsg::MatchEnd {
                    winner: *winner,
                    reason: reason.clone(),
                });
            }
        }

        out
    }
}

/// Guest role: optimistic local side, remote side from snapshots
pub struct Mirror {
    side: Side,
    seq: u32,
    last_sent: Option<Intent>,
}

impl Mirror {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            seq: 0,
            last_sent: None,
        }
    }
}

impl SyncRole for Mirror {
    fn side(&self) -> Side {
        self.side
    }

    fn apply_local_action(&mut self, game: &mut Match, intent: Intent) -> Vec<PeerMsg> {
        game.set_intent(self.side, intent);

        if self.last_sent == Some(intent) && !intent.has_action() {
            return Vec::new();
        }
        self.seq += 1;
        self.last_sent = Some(intent);
        vec![PeerMsg::PlayerInput {
            seq: self.seq,
            intent,
        }]
    }

    fn apply_remote_snapshot(&mut self, game: &mut Match, snapshot: &GameSnapshot) -> Vec<MatchEvent> {
        let remote = self.side.other();
        let events = game.adopt_round(snapshot.round, snapshot.timer, snapshot.rounds_to_win);

        for side in Side::BOTH {
            if let Some(player) = snapshot.players.get(side.index()) {
                let fighter = game.fighter_mut(side);
                fighter.rounds_won = player.rounds_won;
                // never overwrite the local combatant
                if side == remote {
                    fighter.apply_snapshot(
                        player.x,
                        player.y,
                        player.health,
                        player.awake,
                        player.state,
                    );
                }
            }
        }

        let remote_projectiles = snapshot
            .projectiles
            .iter()
            .filter(|p| p.owner == remote)
            .map(Projectile::from)
            .collect();
        game.replace_projectiles(remote, remote_projectiles);

        events
    }

    fn apply_remote_message(&mut self, game: &mut Match, msg: PeerMsg) -> Vec<MatchEvent> {
        if let Some(event) = remote_ability(self.side, &msg) {
            return vec![event];
        }

        match msg {
            PeerMsg::GameState(snapshot) => self.apply_remote_snapshot(game, &snapshot),
            PeerMsg::Damage {
                attacker,
                target,
                damage,
            } => {
                // host-resolved hits are the only way the local side loses health
                if target == self.side && attacker != self.side && game.phase() == MatchPhase::Playing {
                    let applied = game.fighter_mut(target).apply_mirrored_damage(damage);
                    vec![MatchEvent::DamageReceived {
                        attacker,
                        target,
                        damage: applied,
                    }]
                } else {
                    debug!(?attacker, ?target, damage, "Informational damage");
                    Vec::new()
                }
            }
            PeerMsg::GameStart { host, guest, .. } => {
                let bound = game.fighter(Side::Host).character().id == host.character_id
                    && game.fighter(Side::Guest).character().id == guest.character_id;
                if !bound {
                    warn!(
                        host = %host.character_id,
                        guest = %guest.character_id,
                        "game_start does not match this session's characters"
                    );
                    return Vec::new();
                }
                // rematch, or the first start of a session built ahead of time
                if game.start() {
                    vec![MatchEvent::CountdownTick {
                        remaining: game.countdown(),
                    }]
                } else {
                    Vec::new()
                }
            }
            PeerMsg::MatchEnd { winner, reason } => match winner {
                Some(winner) => game.declare_result(winner, &reason),
                None => game.force_end(&reason).into_iter().collect(),
            },
            PeerMsg::PeerLeft { .. } => game.force_end("peer_left").into_iter().collect(),
            PeerMsg::PlayerInput { .. } => {
                warn!("Guest ignores player_input");
                Vec::new()
            }
            other => {
                debug!(kind = other.kind(), "Message not handled by guest match");
                Vec::new()
            }
        }
    }

    fn after_tick(&mut self, _game: &Match, events: &[MatchEvent]) -> Vec<PeerMsg> {
        action_messages(self.side, events)
    }
}

/// One participant's running match: simulation, role, clock and transport
pub struct MatchSession<T: Transport> {
    game: Match,
    role: Box<dyn SyncRole>,
    transport: T,
    inbound: InboundQueue,
    clock: SimulationClock,
    transport_closed: bool,
}

impl<T: Transport> MatchSession<T> {
    pub fn new(game: Match, role: Box<dyn SyncRole>, transport: T, inbound: InboundQueue) -> Self {
        Self {
            game,
            role,
            transport,
            inbound,
            clock: SimulationClock::fixed(tick_delta()),
            transport_closed: false,
        }
    }

    /// Build and start a participant's match from the host's `game_start`.
    /// The host side takes the authority role, the guest side a mirror.
    pub fn from_game_start(
        msg: &PeerMsg,
        local: Side,
        config: MatchConfig,
        transport: T,
        inbound: InboundQueue,
    ) -> Result<Self, SessionError> {
        let PeerMsg::GameStart {
            host,
            guest,
            room_code,
        } = msg
        else {
            return Err(SessionError::NotGameStart(msg.kind()));
        };

        let roster = Roster::global();
        let host_character = roster.get(&host.character_id)?;
        let guest_character = roster.get(&guest.character_id)?;

        let (authority, role) = match local {
            Side::Host => (
                MatchAuthority::Host,
                Box::new(Authority::new(local)) as Box<dyn SyncRole>,
            ),
            Side::Guest => (
                MatchAuthority::Mirror,
                Box::new(Mirror::new(local)) as Box<dyn SyncRole>,
            ),
        };
        let game = Match::new(config, authority, local, host_character, guest_character);

        let mut session = Self::new(game, role, transport, inbound);
        session.start();
        info!(
            room = %room_code,
            host = %host.player_id,
            guest = %guest.player_id,
            side = ?local,
            "Session started from game_start"
        );
        Ok(session)
    }

    pub fn game(&self) -> &Match {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Match {
        &mut self.game
    }

    pub fn side(&self) -> Side {
        self.role.side()
    }

    pub fn start(&mut self) -> bool {
        self.clock.start();
        self.game.start()
    }

    pub fn pause(&mut self) {
        self.game.pause();
    }

    pub fn resume(&mut self) {
        self.game.resume();
    }

    /// Quit: the clock stops before the match is torn down
    pub fn leave(&mut self) {
        self.clock.stop();
        self.game.stop();
    }

    pub fn set_local_intent(&mut self, intent: Intent) {
        let out = self.role.apply_local_action(&mut self.game, intent);
        self.send_all(out);
    }

    /// Apply queued messages, then simulate `elapsed` seconds of wall time
    pub fn frame(&mut self, elapsed: f32) -> Vec<MatchEvent> {
        let mut events = Vec::new();

        let drained = self.inbound.drain();
        for msg in drained.messages {
            events.extend(self.role.apply_remote_message(&mut self.game, msg));
        }
        if drained.closed || self.transport_closed {
            events.extend(self.game.force_end("transport_closed"));
        }
        // a remote game_start can begin the match
        if !self.clock.is_running()
            && !matches!(self.game.phase(), MatchPhase::Waiting | MatchPhase::Ended)
        {
            self.clock.start();
        }

        for dt in self.clock.advance(elapsed) {
            let tick_events = self.game.tick(dt);
            let out = self.role.after_tick(&self.game, &tick_events);
            self.send_all(out);
            events.extend(tick_events);
        }

        events
    }

    pub fn render(&self, sink: &mut dyn RenderSink, events: &[MatchEvent]) {
        sink.render(&self.game.view(), events);
    }

    fn send_all(&mut self, messages: Vec<PeerMsg>) {
        for msg in messages {
            if let Err(e) = self.transport.send(&msg) {
                if !self.transport_closed {
                    warn!(error = %e, kind = msg.kind(), "Send failed");
                }
                self.transport_closed = true;
            }
        }
    }
}
