//! Room registry and peer relay
//!
//! The server is not authoritative for relayed rooms. It seats two
//! participants, forwards each text frame verbatim to the other one and
//! watches lobby traffic to report room status.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::Side;
use crate::ws::protocol::PeerMsg;

use super::state::{LobbyState, RoomStatus};
use super::{RoomCode, RoomError};

/// Buffered frames per participant before the relay starts dropping
const PARTICIPANT_BUFFER: usize = 128;

struct Participant {
    player_id: String,
    tx: mpsc::Sender<String>,
}

struct Room {
    lobby: LobbyState,
    participants: [Option<Participant>; 2],
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Room {
    fn new(code: RoomCode) -> Self {
        let now = Utc::now();
        Self {
            lobby: LobbyState::new(code),
            participants: [None, None],
            created_at: now,
            last_activity: now,
        }
    }

    fn connected(&self) -> usize {
        self.participants.iter().flatten().count()
    }

    /// Queue a frame for one participant. False if nobody is seated there or
    /// their backlog is full.
    fn send_to(&self, code: &RoomCode, side: Side, text: String, kind: &'static str) -> bool {
        let Some(peer) = &self.participants[side.index()] else {
            debug!(room = %code, side = ?side, kind, "No participant seated, frame dropped");
            return false;
        };
        match peer.tx.try_send(text) {
            Ok(()) => true,
            Err(_) => {
                warn!(room = %code, side = ?side, player_id = %peer.player_id, kind, "Backlog full, frame dropped");
                false
            }
        }
    }
}

/// Public room status for `GET /rooms/{code}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub code: RoomCode,
    pub status: RoomStatus,
    pub players: usize,
    pub created_at: DateTime<Utc>,
}

/// Seat assigned on join, with the frames relayed to this participant.
/// Dropping the seat leaves the room.
pub struct Seat {
    code: RoomCode,
    side: Side,
    frames: Option<mpsc::Receiver<String>>,
    rooms: Weak<RoomRegistry>,
}

impl Seat {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Frames from the other participant; `None` once taken
    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<String>> {
        self.frames.take()
    }
}

impl Drop for Seat {
    fn drop(&mut self) {
        if let Some(rooms) = self.rooms.upgrade() {
            rooms.leave(&self.code, self.side);
        }
    }
}

/// All open rooms
pub struct RoomRegistry {
    rooms: DashMap<RoomCode, Room>,
    ttl: ChronoDuration,
}

impl RoomRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1)),
        }
    }

    /// Open a room under a fresh code
    pub fn create(&self) -> RoomCode {
        let mut rng = rand::thread_rng();
        loop {
            let code = RoomCode::generate(&mut rng);
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.rooms.entry(code.clone()) {
                slot.insert(Room::new(code.clone()));
                info!(room = %code, "Room created");
                return code;
            }
        }
    }

    pub fn info(&self, code: &RoomCode) -> Option<RoomInfo> {
        self.rooms.get(code).map(|room| RoomInfo {
            code: code.clone(),
            status: room.lobby.status(),
            players: room.connected(),
            created_at: room.created_at,
        })
    }

    /// Seat a participant: first joiner hosts, second is the guest
    pub fn join(self: &Arc<Self>, code: &RoomCode, player_id: &str) -> Result<Seat, RoomError> {
        let mut room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.to_string()))?;

        let side = room
            .lobby
            .free_side()
            .ok_or_else(|| RoomError::Full(code.to_string()))?;

        let (tx, frames) = mpsc::channel(PARTICIPANT_BUFFER);
        room.participants[side.index()] = Some(Participant {
            player_id: player_id.to_string(),
            tx,
        });
        room.lobby.join(side, player_id);
        room.last_activity = Utc::now();

        info!(room = %code, side = ?side, player_id, "Joined room");
        Ok(Seat {
            code: code.clone(),
            side,
            frames: Some(frames),
            rooms: Arc::downgrade(self),
        })
    }

    /// Forward a frame from `from` to the other participant.
    /// Malformed frames are logged and dropped. Once both players have picked
    /// and readied, `game_start` goes out to both of them.
    pub fn forward(&self, code: &RoomCode, from: Side, text: &str) -> Result<(), RoomError> {
        let mut room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.to_string()))?;

        let msg = match PeerMsg::decode(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(room = %code, side = ?from, error = %e, "Dropping malformed frame");
                return Ok(());
            }
        };
        if matches!(msg, PeerMsg::GameState(_)) && from != Side::Host {
            warn!(room = %code, "Dropping game_state from guest");
            return Ok(());
        }

        room.lobby.observe(from, &msg);
        room.last_activity = Utc::now();

        if room.send_to(code, from.other(), text.to_string(), msg.kind()) {
            debug!(room = %code, side = ?from, kind = msg.kind(), "Relayed");
        }

        if let Some(start) = room.lobby.start() {
            match start.encode() {
                Ok(text) => {
                    for side in Side::BOTH {
                        room.send_to(code, side, text.clone(), start.kind());
                    }
                    info!(room = %code, "Match starting");
                }
                Err(e) => warn!(room = %code, error = %e, "Failed to encode game_start"),
            }
        }
        Ok(())
    }

    /// Free a seat and tell the remaining participant. Empty rooms are closed.
    /// Returns whether a remaining participant was sent `peer_left`.
    pub fn leave(&self, code: &RoomCode, side: Side) -> bool {
        let Some(mut room) = self.rooms.get_mut(code) else {
            return false;
        };

        let Some(left) = room.participants[side.index()].take() else {
            return false;
        };
        room.lobby.leave(side);

        let mut notified = false;
        if room.participants[side.other().index()].is_some() {
            let notice = PeerMsg::PeerLeft {
                player_id: left.player_id.clone(),
            };
            match notice.encode() {
                Ok(text) => {
                    notified = room.send_to(code, side.other(), text, notice.kind());
                    if !notified {
                        // backlog full: drop the survivor so its stream closes
                        room.participants[side.other().index()] = None;
                        room.lobby.leave(side.other());
                        warn!(room = %code, "peer_left undeliverable, remaining participant dropped");
                    }
                }
                Err(e) => warn!(room = %code, error = %e, "Failed to encode peer_left"),
            }
        }
        info!(room = %code, side = ?side, player_id = %left.player_id, "Left room");

        let empty = room.lobby.is_empty();
        drop(room);
        if empty {
            self.rooms.remove(code);
            info!(room = %code, "Room closed");
        }
        notified
    }

    /// Drop rooms idle for longer than the TTL. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.rooms.len();
        self.rooms
            .retain(|_, room| now.signed_duration_since(room.last_activity) <= self.ttl);
        let removed = before - self.rooms.len();
        if removed > 0 {
            info!(removed, "Expired rooms purged");
        }
        removed
    }

    /// Periodic expiry sweep
    pub async fn run_expiry(self: Arc<Self>, every: Duration) {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            self.purge_expired(Utc::now());
        }
    }

    pub fn open_rooms(&self) -> usize {
        self.rooms.len()
    }
}
