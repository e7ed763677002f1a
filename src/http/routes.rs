//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::characters::{CatalogError, CharacterDefinition, Roster};
use crate::lobby::{RoomCode, RoomError, RoomInfo};
use crate::store::profiles::ProfileView;
use crate::store::PlayerStats;
use crate::util::time::uptime_secs;
use crate::ws::handler::{practice_handler, relay_handler};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/characters", get(characters_handler))
        .route("/rooms", post(create_room_handler))
        .route("/rooms/:code", get(room_handler))
        .route("/profiles/:player_id/stats", get(stats_handler))
        .route("/profiles/:player_id/unlocks", post(unlock_handler))
        .route("/ws/relay", get(relay_handler))
        .route("/ws/practice", get(practice_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin))
        .with_state(state)
}

/// CORS from CLIENT_ORIGIN: `*` or a comma-separated list
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    open_rooms: usize,
    practice_matches: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        open_rooms: state.rooms.open_rooms(),
        practice_matches: state.match_registry.active_matches(),
    })
}

// ============================================================================
// Character catalog
// ============================================================================

async fn characters_handler() -> Json<Vec<CharacterDefinition>> {
    Json(
        Roster::global()
            .all()
            .iter()
            .map(|c| c.as_ref().clone())
            .collect(),
    )
}

// ============================================================================
// Rooms
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomResponse {
    room_code: RoomCode,
    ws_path: String,
}

async fn create_room_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateRoomResponse>) {
    let room_code = state.rooms.create();
    let ws_path = format!("/ws/relay?room={}", room_code);
    (
        StatusCode::CREATED,
        Json(CreateRoomResponse { room_code, ws_path }),
    )
}

async fn room_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomInfo>, AppError> {
    let code = RoomCode::parse(&code)?;
    state
        .rooms
        .info(&code)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Room not found: {}", code)))
}

// ============================================================================
// Profiles
// ============================================================================

async fn stats_handler(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<Json<PlayerStats>, AppError> {
    state
        .profiles
        .stats(&player_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No profile for {}", player_id)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnlockRequest {
    character_id: String,
}

async fn unlock_handler(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Json(request): Json<UnlockRequest>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(state.profiles.unlock(&player_id, &request.character_id)?))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<RoomError> for AppError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::InvalidCode(_) => AppError::BadRequest(e.to_string()),
            RoomError::NotFound(_) => AppError::NotFound(e.to_string()),
            RoomError::Full(_) => AppError::Conflict(e.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Locked(_) => AppError::Forbidden(e.to_string()),
            CatalogError::UnknownCharacter(_) => AppError::NotFound(e.to_string()),
            CatalogError::MultipleDomains(_) | CatalogError::InvalidStats(_) => {
                AppError::BadRequest(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_errors_map_to_statuses() {
        let status = |e: RoomError| AppError::from(e).into_response().status();
        assert_eq!(status(RoomError::Full("ABC123".into())), StatusCode::CONFLICT);
        assert_eq!(status(RoomError::NotFound("ABC123".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(RoomError::InvalidCode("x".into())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn locked_character_is_forbidden() {
        let response = AppError::from(CatalogError::Locked("gojo".into())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    fn test_state() -> AppState {
        AppState::new(crate::config::Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".into(),
            client_origin: "*".into(),
            round_time_secs: 99,
            rounds_to_win: 2,
            max_rounds_to_win: None,
            room_ttl: std::time::Duration::from_secs(60),
            relay_rate_limit: 90,
        })
    }

    #[tokio::test]
    async fn unlock_makes_character_selectable() {
        let state = test_state();
        let roster = Roster::global();
        assert!(state.profiles.unlocked("p1").select(roster, "gojo").is_err());

        let Json(view) = unlock_handler(
            State(state.clone()),
            Path("p1".to_string()),
            Json(UnlockRequest {
                character_id: "gojo".into(),
            }),
        )
        .await
        .unwrap();
        assert!(view.unlocked.contains(&"gojo".to_string()));
        assert!(state.profiles.unlocked("p1").select(roster, "gojo").is_ok());

        let err = unlock_handler(
            State(state),
            Path("p1".to_string()),
            Json(UnlockRequest {
                character_id: "mahito".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn wildcard_origin_builds() {
        let _ = cors_layer("*");
        let _ = cors_layer("http://localhost:5173, https://arena.example");
    }
}
