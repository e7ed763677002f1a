//! Pre-match lobby: who is in the room, what they picked, whether they are ready

use serde::Serialize;
use tracing::{debug, warn};

use crate::game::characters::{CatalogError, Roster};
use crate::game::Side;
use crate::ws::protocol::{PeerMsg, PlayerInfo};

use super::RoomCode;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySlot {
    pub player_id: Option<String>,
    pub character_id: Option<String>,
    pub ready: bool,
}

impl LobbySlot {
    fn info(&self) -> Option<PlayerInfo> {
        Some(PlayerInfo {
            player_id: self.player_id.clone()?,
            character_id: self.character_id.clone()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Waiting for a second participant
    Waiting,
    /// Both seats taken, still in the lobby
    Full,
    InMatch,
}

/// Lobby bookkeeping for one room, indexed by [`Side`]
#[derive(Debug, Clone)]
pub struct LobbyState {
    code: RoomCode,
    slots: [LobbySlot; 2],
    in_match: bool,
}

impl LobbyState {
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            slots: Default::default(),
            in_match: false,
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn slot(&self, side: Side) -> &LobbySlot {
        &self.slots[side.index()]
    }

    /// First free seat, host before guest
    pub fn free_side(&self) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.slots[side.index()].player_id.is_none())
    }

    pub fn join(&mut self, side: Side, player_id: &str) {
        self.slots[side.index()] = LobbySlot {
            player_id: Some(player_id.to_string()),
            ..LobbySlot::default()
        };
    }

    /// Free a seat. Any running match is over and the other side must ready up again.
    pub fn leave(&mut self, side: Side) {
        self.slots[side.index()] = LobbySlot::default();
        self.slots[side.other().index()].ready = false;
        self.in_match = false;
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.player_id.is_none())
    }

    pub fn status(&self) -> RoomStatus {
        if self.in_match {
            RoomStatus::InMatch
        } else if self.free_side().is_some() {
            RoomStatus::Waiting
        } else {
            RoomStatus::Full
        }
    }

    pub fn select(&mut self, side: Side, character_id: &str) -> Result<(), CatalogError> {
        Roster::global().get(character_id)?;
        self.slots[side.index()].character_id = Some(character_id.to_string());
        Ok(())
    }

    pub fn set_ready(&mut self, side: Side, ready: bool) {
        self.slots[side.index()].ready = ready;
    }

    /// Both seated, both picked, both ready
    pub fn can_start(&self) -> bool {
        !self.in_match
            && self
                .slots
                .iter()
                .all(|s| s.player_id.is_some() && s.character_id.is_some() && s.ready)
    }

    /// The host's `game_start`, once everyone is ready
    pub fn start(&mut self) -> Option<PeerMsg> {
        if !self.can_start() {
            return None;
        }
        let host = self.slots[Side::Host.index()].info()?;
        let guest = self.slots[Side::Guest.index()].info()?;
        self.in_match = true;
        Some(PeerMsg::GameStart {
            host,
            guest,
            room_code: self.code.to_string(),
        })
    }

    /// Track a lobby message sent by `from`
    pub fn observe(&mut self, from: Side, msg: &PeerMsg) {
        match msg {
            PeerMsg::CharacterSelect { character_id, .. } => {
                if let Err(e) = self.select(from, character_id) {
                    warn!(room = %self.code, side = ?from, error = %e, "Rejected character select");
                }
            }
            PeerMsg::Ready { ready, .. } => self.set_ready(from, *ready),
            PeerMsg::GameStart { .. } if from == Side::Host => {
                self.in_match = true;
                debug!(room = %self.code, "Match started");
            }
            PeerMsg::MatchEnd { .. } => {
                self.in_match = false;
                for slot in &mut self.slots {
                    slot.ready = false;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> LobbyState {
        let mut lobby = LobbyState::new(RoomCode::parse("ABC123").unwrap());
        lobby.join(Side::Host, "p1");
        lobby.join(Side::Guest, "p2");
        lobby
    }

    #[test]
    fn start_needs_both_selected_and_ready() {
        let mut lobby = lobby();
        lobby.set_ready(Side::Host, true);
        lobby.set_ready(Side::Guest, true);
        lobby.select(Side::Host, "gojo").unwrap();
        assert!(lobby.start().is_none());

        lobby.select(Side::Guest, "sukuna").unwrap();
        let start = lobby.start().unwrap();
        assert_eq!(
            start,
            PeerMsg::GameStart {
                host: PlayerInfo {
                    player_id: "p1".into(),
                    character_id: "gojo".into()
                },
                guest: PlayerInfo {
                    player_id: "p2".into(),
                    character_id: "sukuna".into()
                },
                room_code: "ABC123".into(),
            }
        );
        assert_eq!(lobby.status(), RoomStatus::InMatch);
        assert!(lobby.start().is_none());
    }

    #[test]
    fn unknown_character_is_rejected() {
        let mut lobby = lobby();
        assert!(lobby.select(Side::Host, "nobody").is_err());
        assert_eq!(lobby.slot(Side::Host).character_id, None);
    }

    #[test]
    fn observe_tracks_messages() {
        let mut lobby = lobby();
        lobby.observe(
            Side::Guest,
            &PeerMsg::CharacterSelect {
                player_id: "p2".into(),
                character_id: "toji".into(),
            },
        );
        lobby.observe(
            Side::Guest,
            &PeerMsg::Ready {
                player_id: "p2".into(),
                ready: true,
            },
        );
        assert_eq!(lobby.slot(Side::Guest).character_id.as_deref(), Some("toji"));
        assert!(lobby.slot(Side::Guest).ready);

        lobby.observe(
            Side::Host,
            &PeerMsg::MatchEnd {
                winner: Some(Side::Host),
                reason: "knockout".into(),
            },
        );
        assert!(!lobby.slot(Side::Guest).ready);
    }

    #[test]
    fn leaving_frees_the_seat() {
        let mut lobby = lobby();
        assert_eq!(lobby.status(), RoomStatus::Full);
        lobby.set_ready(Side::Host, true);
        lobby.leave(Side::Guest);
        assert_eq!(lobby.free_side(), Some(Side::Guest));
        assert_eq!(lobby.status(), RoomStatus::Waiting);
        assert!(!lobby.slot(Side::Host).ready);
    }
}
