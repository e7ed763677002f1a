//! Shared server state

mod state;

pub use state::AppState;
