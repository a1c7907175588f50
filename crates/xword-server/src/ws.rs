use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use xword_core::error::{Error, ErrorCode};
use xword_core::event::EventKind;
use xword_core::protocol::{ClientCommand, ClientFrame, MAX_SYNC_LIMIT, ServerMessage};
use xword_core::validation::{validate_game_event, validate_room_event};

use crate::auth::Credential;
use crate::authz;
use crate::db;
use crate::hub::{SUBSCRIBER_QUEUE, game_topic, room_topic};
use crate::state::{AppState, ConnectionHandle, Kill};

/// Implicit deadline on sync RPCs.
const SYNC_DEADLINE: Duration = Duration::from_secs(30);

/// The recent window that archived paging counts back from.
const ARCHIVE_WINDOW: u32 = 1000;

/// Top-level WebSocket handler -- spawned per connection.
pub async fn handle_socket(
    state: Arc<AppState>,
    mut socket: WebSocket,
    user_id: String,
    credential: Credential,
    conn_id: u64,
) {
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(SUBSCRIBER_QUEUE);
    let kill = Arc::new(Kill::default());

    state.connections.insert(
        conn_id,
        ConnectionHandle {
            conn_id,
            user_id: user_id.clone(),
            tx: tx.clone(),
            kill: kill.clone(),
        },
    );

    let mut ping_timer =
        tokio::time::interval(Duration::from_millis(state.config.ping_interval_ms.max(1)));
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of an interval completes immediately; consume it.
    ping_timer.tick().await;
    let ping_timeout = Duration::from_millis(state.config.ping_timeout_ms);
    let mut last_pong = Instant::now();

    debug!(conn_id, user = %user_id, "websocket session started");

    loop {
        tokio::select! {
            // Outbound: drain the bounded queue into the socket.
            Some(msg) = rx.recv() => {
                let Ok(json) = serde_json::to_string(&msg) else { continue };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            // Forced close (backpressure, shutdown).
            reason = kill.wait() => {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AGAIN,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
            // Keepalive: missed pongs close the connection.
            _ = ping_timer.tick() => {
                if last_pong.elapsed() > ping_timeout {
                    debug!(conn_id, "ping timeout");
                    break;
                }
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            // Inbound: decode and dispatch one frame at a time.
            maybe_msg = socket.recv() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_frame(&state, conn_id, &credential, &tx, text.as_str()).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.hub.unsubscribe_all(conn_id);
    state.connections.remove(&conn_id);
    debug!(conn_id, "websocket session ended");
}

/// Queue a message on this connection's own outbound channel. A full queue
/// means the client is not draining; the connection is done.
fn enqueue(tx: &mpsc::Sender<ServerMessage>, msg: ServerMessage) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => false,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Returns false when the connection should be torn down.
async fn handle_frame(
    state: &Arc<AppState>,
    conn_id: u64,
    credential: &Credential,
    tx: &mpsc::Sender<ServerMessage>,
    text: &str,
) -> bool {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            // Salvage the seq so the sender's callback still fires.
            let seq = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("seq").and_then(|s| s.as_u64()));
            return enqueue(
                tx,
                ServerMessage::AckError {
                    seq,
                    code: ErrorCode::ValidationError,
                    message: format!("invalid frame: {e}"),
                    retry_after: None,
                },
            );
        }
    };

    let seq = frame.seq;

    // The handshake credential is re-verified on every frame: a token that
    // expired or was disabled mid-session fails here, before any state is
    // read or written.
    let user_id = match state.tokens.reverify(credential) {
        Ok(user) => user,
        Err(e) => {
            debug!(conn_id, "credential no longer valid");
            return enqueue(
                tx,
                ServerMessage::AckError {
                    seq,
                    code: ErrorCode::Unauthenticated,
                    message: e.to_string(),
                    retry_after: None,
                },
            );
        }
    };

    match dispatch(state, conn_id, &user_id, tx, seq, frame.cmd).await {
        Ok(Some(msg)) => enqueue(tx, msg),
        Ok(None) => true,
        Err(Error::Backpressure) => false,
        Err(err) => {
            let retry_after = match &err {
                Error::RateLimited { retry_after_secs } => Some(*retry_after_secs),
                _ => None,
            };
            enqueue(
                tx,
                ServerMessage::AckError {
                    seq,
                    code: err.code(),
                    message: err.to_string(),
                    retry_after,
                },
            )
        }
    }
}

async fn with_deadline<T>(
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    tokio::time::timeout(SYNC_DEADLINE, fut)
        .await
        .map_err(|_| Error::Timeout)?
}

async fn dispatch(
    state: &Arc<AppState>,
    conn_id: u64,
    user_id: &str,
    tx: &mpsc::Sender<ServerMessage>,
    seq: Option<u64>,
    cmd: ClientCommand,
) -> Result<Option<ServerMessage>, Error> {
    match cmd {
        ClientCommand::JoinGame { game_id } => {
            authz::authorize_game(&state.db, user_id, &game_id).await?;
            state.hub.subscribe(&game_topic(&game_id), conn_id, tx.clone());
            debug!(conn_id, game_id, "subscribed");
            Ok(seq.map(|seq| ServerMessage::Ack { seq }))
        }

        ClientCommand::LeaveGame { game_id } => {
            state.hub.unsubscribe(&game_topic(&game_id), conn_id);
            Ok(seq.map(|seq| ServerMessage::Ack { seq }))
        }

        ClientCommand::SyncAllGameEvents { game_id } => {
            authz::authorize_game(&state.db, user_id, &game_id).await?;
            let (events, total) =
                with_deadline(db::get_game_events(&state.db, &game_id, None, None)).await?;
            Ok(Some(ServerMessage::SyncResult {
                seq: seq.unwrap_or(0),
                events,
                total,
            }))
        }

        ClientCommand::SyncRecentGameEvents { game_id, limit } => {
            authz::authorize_game(&state.db, user_id, &game_id).await?;
            let limit = limit.min(MAX_SYNC_LIMIT);
            let (events, total) =
                with_deadline(db::get_recent_game_events(&state.db, &game_id, limit)).await?;
            Ok(Some(ServerMessage::SyncResult {
                seq: seq.unwrap_or(0),
                events,
                total,
            }))
        }

        ClientCommand::SyncArchivedGameEvents {
            game_id,
            offset,
            limit,
        } => {
            authz::authorize_game(&state.db, user_id, &game_id).await?;
            let limit = limit.min(MAX_SYNC_LIMIT);
            // Two-phase: count, then page backwards from just before the
            // recent window.
            let total = with_deadline(db::count_game_events(&state.db, &game_id)).await?;
            let archived_offset =
                (total as i64 - i64::from(ARCHIVE_WINDOW) - i64::from(offset)).max(0) as u32;
            let (events, _) = with_deadline(db::get_game_events(
                &state.db,
                &game_id,
                Some(limit),
                Some(archived_offset),
            ))
            .await?;
            Ok(Some(ServerMessage::SyncResult {
                seq: seq.unwrap_or(0),
                events,
                total,
            }))
        }

        ClientCommand::GameEvent { game_id, event } => {
            let mut event = event.coerce(db::now_ms());
            // The authenticated identity wins over whatever the client put
            // in the event body.
            event.user = Some(user_id.to_string());
            validate_game_event(&event)?;

            match &event.kind {
                EventKind::Create(_) => {
                    if db::has_create(&state.db, &game_id).await? {
                        return Err(Error::Conflict(format!("game {game_id} already exists")));
                    }
                }
                _ => {
                    authz::authorize_game(&state.db, user_id, &game_id).await?;
                }
            }

            db::append_game_event(&state.db, &game_id, &event).await?;

            // Ack after persistence, before fan-out, so the sender's callback
            // fires ahead of its own echo.
            if let Some(seq) = seq {
                if !enqueue(tx, ServerMessage::Ack { seq }) {
                    return Err(Error::Backpressure);
                }
            }
            let overflowed = state.hub.publish(
                &game_topic(&game_id),
                &ServerMessage::GameUpdate { game_id, event },
            );
            state.kill_overflowed(overflowed);
            Ok(None)
        }

        ClientCommand::JoinRoom { room_id } => {
            authz::authorize_room(&state.db, user_id, &room_id).await?;
            state.hub.subscribe(&room_topic(&room_id), conn_id, tx.clone());
            Ok(seq.map(|seq| ServerMessage::Ack { seq }))
        }

        ClientCommand::LeaveRoom { room_id } => {
            state.hub.unsubscribe(&room_topic(&room_id), conn_id);
            Ok(seq.map(|seq| ServerMessage::Ack { seq }))
        }

        ClientCommand::SyncAllRoomEvents { room_id } => {
            authz::authorize_room(&state.db, user_id, &room_id).await?;
            let (events, total) =
                with_deadline(db::get_room_events(&state.db, &room_id, None, None)).await?;
            Ok(Some(ServerMessage::RoomSyncResult {
                seq: seq.unwrap_or(0),
                events,
                total,
            }))
        }

        ClientCommand::RoomEvent { room_id, event } => {
            let mut event = event.coerce(db::now_ms());
            event.user = Some(user_id.to_string());
            validate_room_event(&event)?;

            // The first event writes the room into existence; after that,
            // membership is checked like any other access.
            if db::room_exists(&state.db, &room_id).await? {
                authz::authorize_room(&state.db, user_id, &room_id).await?;
            }

            db::append_room_event(&state.db, &room_id, &event).await?;

            if let Some(seq) = seq {
                if !enqueue(tx, ServerMessage::Ack { seq }) {
                    return Err(Error::Backpressure);
                }
            }
            let overflowed = state.hub.publish(
                &room_topic(&room_id),
                &ServerMessage::RoomUpdate { room_id, event },
            );
            state.kill_overflowed(overflowed);
            Ok(None)
        }

        ClientCommand::LatencyPing { client_ts } => {
            if !client_ts.is_finite() {
                // Malformed pings are dropped without a reply.
                return Ok(None);
            }
            Ok(Some(ServerMessage::Pong {
                client_ts,
                server_ts: db::now_ms(),
            }))
        }
    }
}
