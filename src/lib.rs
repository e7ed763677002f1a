//! Cursed Arena - two-player fighting game core
//!
//! The simulation (`game`) runs identically on a host, a guest mirror or the
//! server; the remaining modules are the relay and practice server around it.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod store;
pub mod util;
pub mod ws;
