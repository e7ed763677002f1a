//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::r#match::MatchRegistry;
use crate::lobby::RoomRegistry;
use crate::store::ProfileStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub profiles: Arc<ProfileStore>,
    pub rooms: Arc<RoomRegistry>,
    /// Server-hosted practice matches
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let rooms = Arc::new(RoomRegistry::new(config.room_ttl));

        Self {
            config: Arc::new(config),
            profiles: Arc::new(ProfileStore::new()),
            rooms,
            match_registry: Arc::new(MatchRegistry::new()),
        }
    }
}
