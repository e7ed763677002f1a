//! WebSocket wire protocol and connection handlers

pub mod handler;
pub mod protocol;
