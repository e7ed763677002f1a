//! WebSocket upgrade handlers

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::bot::RandomBot;
use crate::game::characters::{CharacterDefinition, Roster};
use crate::game::r#match::MatchAuthority;
use crate::game::{GameMatch, Match, MatchHandle, Side};
use crate::http::AppError;
use crate::lobby::{RoomCode, Seat};
use crate::store::PlayerRecorder;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{PeerMsg, PlayerInfo, ProtocolError};

/// Opponent character in practice matches
pub const PRACTICE_BOT_CHARACTER: &str = "yuji";
pub const PRACTICE_BOT_ID: &str = "bot";

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Query parameters for the relay socket
#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub room: String,
    pub player_id: String,
}

/// Query parameters for the practice socket
#[derive(Debug, Deserialize)]
pub struct PracticeQuery {
    pub player_id: String,
    pub character: String,
}

fn require_player_id(player_id: &str) -> Result<(), AppError> {
    if player_id.trim().is_empty() {
        return Err(AppError::BadRequest("player_id is required".to_string()));
    }
    Ok(())
}

/// Join a relay room. The seat is taken before upgrading so a full room is
/// refused with a plain HTTP error; if the upgrade never happens the seat is
/// dropped with the callback and the room frees it.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RelayQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    require_player_id(&query.player_id)?;
    let code = RoomCode::parse(&query.room)?;
    let seat = state.rooms.join(&code, &query.player_id)?;

    Ok(ws
        .on_failed_upgrade(|e: axum::Error| warn!(error = %e, "Relay upgrade failed"))
        .on_upgrade(move |socket| handle_relay(socket, seat, state)))
}

async fn handle_relay(socket: WebSocket, mut seat: Seat, state: AppState) {
    let code = seat.code().clone();
    let side = seat.side();
    let Some(mut frames) = seat.take_frames() else {
        error!(room = %code, "Seat has no frame stream");
        return;
    };
    info!(room = %code, side = ?side, "Relay connection opened");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Writer task: frames from the other participant -> WebSocket
    let writer_code = code.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(text) = frames.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(text)).await {
                debug!(room = %writer_code, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let limiter = ConnectionRateLimiter::new(state.config.relay_rate_limit);
    while let Some(text) = next_text(&mut ws_stream, &limiter).await {
        if let Err(e) = state.rooms.forward(&code, side, &text) {
            warn!(room = %code, error = %e, "Room gone, closing relay");
            break;
        }
    }

    writer_handle.abort();
    // leaves the room and tells the other participant
    drop(seat);
    info!(room = %code, side = ?side, "Relay connection closed");
}

/// Start a practice match against the server-hosted bot
pub async fn practice_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<PracticeQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    require_player_id(&query.player_id)?;

    let roster = Roster::global();
    state.profiles.ensure_profile(&query.player_id);
    let character = state
        .profiles
        .unlocked(&query.player_id)
        .select(roster, &query.character)?;
    let bot_character = roster.get(PRACTICE_BOT_CHARACTER)?;

    Ok(ws.on_upgrade(move |socket| {
        handle_practice(socket, query.player_id, character, bot_character, state)
    }))
}

async fn handle_practice(
    socket: WebSocket,
    player_id: String,
    character: Arc<CharacterDefinition>,
    bot_character: Arc<CharacterDefinition>,
    state: AppState,
) {
    let match_id = Uuid::new_v4();
    let seed = rand::random::<u64>();

    let mut game = Match::new(
        state.config.match_config(seed),
        MatchAuthority::Host,
        Side::Guest,
        bot_character.clone(),
        character.clone(),
    )
    .with_recorder(Arc::new(PlayerRecorder::new(
        state.profiles.clone(),
        player_id.clone(),
    )));
    game.set_bot(Side::Host, Box::new(RandomBot::new(seed)));

    let (game_match, handle) = GameMatch::new(match_id, game);
    // Subscribe before the loop starts
    let outbound = handle.subscribe();
    state.match_registry.insert(handle.clone());

    let start = PeerMsg::GameStart {
        host: PlayerInfo {
            player_id: PRACTICE_BOT_ID.to_string(),
            character_id: bot_character.id.to_string(),
        },
        guest: PlayerInfo {
            player_id: player_id.clone(),
            character_id: character.id.to_string(),
        },
        room_code: RoomCode::generate(&mut rand::thread_rng()).to_string(),
    };

    let (mut ws_sink, ws_stream) = socket.split();
    if let Err(e) = send_msg(&mut ws_sink, &start).await {
        error!(match_id = %match_id, error = %e, "Failed to send game_start");
        state.match_registry.remove(&match_id);
        return;
    }

    info!(match_id = %match_id, player_id = %player_id, character = character.id, "Practice match started");

    let registry = state.match_registry.clone();
    tokio::spawn(async move {
        game_match.run().await;
        registry.remove(&match_id);
        info!(match_id = %match_id, "Match removed from registry");
    });

    run_practice_session(&player_id, handle, ws_sink, ws_stream, outbound, &state).await;

    info!(match_id = %match_id, player_id = %player_id, "Practice connection closed");
}

async fn run_practice_session(
    player_id: &str,
    handle: MatchHandle,
    mut ws_sink: WsSink,
    mut ws_stream: WsStream,
    mut outbound: broadcast::Receiver<PeerMsg>,
    state: &AppState,
) {
    let match_id = handle.id;

    // Writer task: match broadcast -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(msg) => {
                    let last = matches!(msg, PeerMsg::MatchEnd { .. });
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(match_id = %match_id, error = %e, "WebSocket send failed");
                        break;
                    }
                    if last {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(match_id = %match_id, lagged = n, "Client lagged, skipped messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Reader loop: WebSocket -> match inbound queue
    let limiter = ConnectionRateLimiter::new(state.config.relay_rate_limit);
    while let Some(text) = next_text(&mut ws_stream, &limiter).await {
        if handle.inbound.deliver_text(&text).is_err() {
            debug!(match_id = %match_id, "Match already finished");
            break;
        }
    }

    // Signal disconnect to the match loop
    let _ = handle.inbound.deliver(PeerMsg::PeerLeft {
        player_id: player_id.to_string(),
    });
    writer_handle.abort();
}

/// Next rate-limited text frame, or `None` once the socket is done
async fn next_text(stream: &mut WsStream, limiter: &ConnectionRateLimiter) -> Option<String> {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !limiter.check_frame() {
                    warn!("Rate limited frame");
                    continue;
                }
                return Some(text);
            }
            Ok(Message::Binary(_)) => {
                warn!(error = %ProtocolError::Binary, "Ignoring frame");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!("Client initiated close");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "WebSocket error");
                return None;
            }
        }
    }
    None
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &PeerMsg) -> Result<(), String> {
    let json = msg.encode().map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
