//! Rooms, lobby state and the peer relay

pub mod code;
pub mod registry;
pub mod state;

pub use code::RoomCode;
pub use registry::{RoomInfo, RoomRegistry, Seat};
pub use state::{LobbyState, RoomStatus};

/// Room errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Invalid room code: {0}")]
    InvalidCode(String),

    #[error("Room not found: {0}")]
    NotFound(String),

    #[error("Room is full: {0}")]
    Full(String),
}
