//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{ArenaHandle, PlayerInput};
use crate::http::AppError;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, Outbound, ServerMsg};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// How long a joiner waits for the arena to accept or refuse it
const JOIN_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure writing to a client socket
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Socket send failed: {0}")]
    Socket(#[from] axum::Error),
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    if state.arenas.is_full() {
        warn!("Rejecting WebSocket upgrade, all arenas full");
        return Err(AppError::ServiceUnavailable);
    }

    // Connections are anonymous; identity lives as long as the socket
    let user_id = Uuid::new_v4();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    info!(user_id = %user_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let rate_limiter = PlayerRateLimiter::new();

    let welcome = ServerMsg::Welcome {
        user_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(user_id = %user_id, error = %e, "Failed to send welcome");
        return;
    }

    let Some(display_name) =
        wait_for_join(user_id, &mut ws_sink, &mut ws_stream, &rate_limiter).await
    else {
        info!(user_id = %user_id, "Connection closed before joining");
        return;
    };

    let Some(arena) = state.arenas.join_or_create() else {
        let full = ServerMsg::Error {
            code: "server_full".to_string(),
            message: "No arena has a free slot".to_string(),
        };
        let _ = send_msg(&mut ws_sink, &full).await;
        return;
    };

    // Subscribe before joining so the join reply is not missed
    let mut outbound_rx = arena.subscribe();
    let join = PlayerInput {
        user_id,
        msg: ClientMsg::JoinArena { display_name },
        received_at: unix_millis(),
    };
    if arena.input_tx.send(join).await.is_err() {
        arena.release_reservation();
        warn!(user_id = %user_id, arena_id = %arena.id, "Arena closed before join");
        return;
    }

    match await_join_reply(user_id, &mut ws_sink, &mut outbound_rx).await {
        Ok(true) => {}
        Ok(false) => {
            info!(user_id = %user_id, arena_id = %arena.id, "Join refused, closing session");
            leave(user_id, &arena.input_tx).await;
            return;
        }
        Err(e) => {
            warn!(user_id = %user_id, arena_id = %arena.id, error = %e, "Join reply not delivered");
            leave(user_id, &arena.input_tx).await;
            return;
        }
    }

    run_session(user_id, &arena, ws_sink, ws_stream, outbound_rx, rate_limiter).await;

    info!(user_id = %user_id, arena_id = %arena.id, "WebSocket connection closed");
}

/// Read until the client asks to join. Pings are answered directly.
async fn wait_for_join(
    user_id: Uuid,
    ws_sink: &mut WsSink,
    ws_stream: &mut WsStream,
    rate_limiter: &PlayerRateLimiter,
) -> Option<Option<String>> {
    while let Some(result) = ws_stream.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };

        if !rate_limiter.check_control() {
            warn!(user_id = %user_id, "Rate limited pre-join message");
            continue;
        }

        match serde_json::from_str::<ClientMsg>(&text) {
            Ok(ClientMsg::JoinArena { display_name }) => return Some(display_name),
            Ok(ClientMsg::Ping { t }) => {
                if send_msg(ws_sink, &ServerMsg::Pong { t }).await.is_err() {
                    return None;
                }
            }
            Ok(other) => {
                debug!(user_id = %user_id, msg = ?other, "Ignoring message before join");
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to parse client message");
            }
        }
    }
    None
}

/// Forward arena traffic until the arena answers our join. True once
/// joined; false when the arena refused or went away.
async fn await_join_reply(
    user_id: Uuid,
    ws_sink: &mut WsSink,
    outbound_rx: &mut broadcast::Receiver<Outbound>,
) -> Result<bool, SessionError> {
    let reply = tokio::time::timeout(JOIN_REPLY_TIMEOUT, async {
        loop {
            match outbound_rx.recv().await {
                Ok(outbound) if outbound.audience.includes(user_id) => {
                    if let Err(e) = send_msg(ws_sink, &outbound.msg).await {
                        return Err(e);
                    }
                    match outbound.msg {
                        ServerMsg::ArenaJoined { .. } => return Ok(true),
                        ServerMsg::Error { .. } => return Ok(false),
                        _ => {}
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(user_id = %user_id, lagged_count = n, "Lagged while joining");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(false),
            }
        }
    })
    .await;

    reply.unwrap_or(Ok(false))
}

async fn leave(user_id: Uuid, input_tx: &mpsc::Sender<PlayerInput>) {
    // Leaving twice is harmless; the arena ignores unknown players
    let _ = input_tx
        .send(PlayerInput {
            user_id,
            msg: ClientMsg::LeaveArena,
            received_at: unix_millis(),
        })
        .await;
}

/// Run the WebSocket session with read/write split
async fn run_session(
    user_id: Uuid,
    arena: &ArenaHandle,
    mut ws_sink: WsSink,
    mut ws_stream: WsStream,
    mut outbound_rx: broadcast::Receiver<Outbound>,
    rate_limiter: PlayerRateLimiter,
) {
    let input_tx: mpsc::Sender<PlayerInput> = arena.input_tx.clone();

    // Writer task: arena broadcast -> WebSocket, filtered by audience
    let writer_handle = tokio::spawn(async move {
        loop {
            match outbound_rx.recv().await {
                Ok(outbound) => {
                    if !outbound.audience.includes(user_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &outbound.msg).await {
                        debug!(user_id = %user_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        user_id = %user_id,
                        lagged_count = n,
                        "Client lagged, skipping {} messages", n
                    );
                    // Continue - don't disconnect for lag
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(user_id = %user_id, "Arena channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> arena loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                let allowed = match msg {
                    ClientMsg::Command { .. } => rate_limiter.check_input(),
                    _ => rate_limiter.check_control(),
                };
                if !allowed {
                    warn!(user_id = %user_id, "Rate limited client message");
                    continue;
                }

                let leaving = matches!(msg, ClientMsg::LeaveArena);
                let input = PlayerInput {
                    user_id,
                    msg,
                    received_at: unix_millis(),
                };
                if input_tx.send(input).await.is_err() {
                    debug!(user_id = %user_id, "Input channel closed");
                    break;
                }
                if leaving {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    leave(user_id, &input_tx).await;
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> Result<(), SessionError> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
