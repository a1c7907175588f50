use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use xword_core::error::{Error, Result};
use xword_core::event::{GameEvent, RawGameEvent, RawTimestamp, RoomEvent};
use xword_core::protocol::{ClientCommand, ClientFrame, ServerMessage};

use crate::history::History;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>>;

/// One realtime connection: request/ack correlation on top of the socket,
/// with fan-out messages surfaced on `updates`.
pub struct Session {
    out: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_seq: AtomicU64,
    /// GameUpdate / RoomUpdate / Pong traffic, in arrival order.
    pub updates: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Session {
    /// Connect and split the socket into a writer task and a reader task
    /// that routes acks back to their callers.
    pub async fn connect(url: &str) -> Result<Session> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::internal(format!("connect failed: {e}")))?;
        let (mut sink, mut stream) = stream.split();

        let (out, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (update_tx, updates) = mpsc::unbounded_channel::<ServerMessage>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let Ok(server_msg) = serde_json::from_str::<ServerMessage>(text.as_str()) else {
                    debug!("dropping unparsable server message");
                    continue;
                };
                let seq = match &server_msg {
                    ServerMessage::Ack { seq } => Some(*seq),
                    ServerMessage::AckError { seq, .. } => *seq,
                    ServerMessage::SyncResult { seq, .. } => Some(*seq),
                    ServerMessage::RoomSyncResult { seq, .. } => Some(*seq),
                    _ => None,
                };
                match seq.and_then(|s| {
                    reader_pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&s)
                }) {
                    // Exactly one callback per request.
                    Some(waiter) => {
                        let _ = waiter.send(server_msg);
                    }
                    None => {
                        if update_tx.send(server_msg).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Session {
            out,
            pending,
            next_seq: AtomicU64::new(1),
            updates,
        })
    }

    fn send_frame(&self, frame: &ClientFrame) -> Result<()> {
        let json = serde_json::to_string(frame).map_err(|e| Error::internal(e.to_string()))?;
        self.out
            .send(Message::Text(json.into()))
            .map_err(|_| Error::internal("connection closed"))
    }

    /// Issue one RPC and wait for its ack.
    pub async fn request(&self, cmd: ClientCommand) -> Result<ServerMessage> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(seq, ack_tx);

        self.send_frame(&ClientFrame {
            seq: Some(seq),
            cmd,
        })?;

        let reply = tokio::time::timeout(REQUEST_TIMEOUT, ack_rx)
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|_| Error::internal("connection closed"))?;

        match reply {
            ServerMessage::AckError {
                code,
                message,
                retry_after,
                ..
            } => Err(code.into_error(message, retry_after)),
            other => Ok(other),
        }
    }

    pub async fn join_game(&self, game_id: &str) -> Result<()> {
        self.request(ClientCommand::JoinGame {
            game_id: game_id.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn sync_all_game_events(&self, game_id: &str) -> Result<(Vec<GameEvent>, u64)> {
        match self
            .request(ClientCommand::SyncAllGameEvents {
                game_id: game_id.to_string(),
            })
            .await?
        {
            ServerMessage::SyncResult { events, total, .. } => Ok((events, total)),
            other => Err(Error::internal(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn sync_all_room_events(&self, room_id: &str) -> Result<(Vec<RoomEvent>, u64)> {
        match self
            .request(ClientCommand::SyncAllRoomEvents {
                room_id: room_id.to_string(),
            })
            .await?
        {
            ServerMessage::RoomSyncResult { events, total, .. } => Ok((events, total)),
            other => Err(Error::internal(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn send_game_event(&self, game_id: &str, event: &GameEvent) -> Result<()> {
        let raw = RawGameEvent {
            timestamp: Some(RawTimestamp::Millis(event.timestamp)),
            user: event.user.clone(),
            kind: event.kind.clone(),
        };
        self.request(ClientCommand::GameEvent {
            game_id: game_id.to_string(),
            event: raw,
        })
        .await
        .map(|_| ())
    }

    pub fn latency_ping(&self, client_ts: f64) -> Result<()> {
        self.send_frame(&ClientFrame {
            seq: None,
            cmd: ClientCommand::LatencyPing { client_ts },
        })
    }
}

/// A joined game: history engine fed by one session, with reconnect-and-
/// resync when the optimistic watchdog fires.
pub struct GameClient {
    url: String,
    game_id: String,
    pub session: Session,
    pub history: History,
}

impl GameClient {
    /// Connect, join and pull the full log.
    pub async fn connect(url: &str, game_id: &str) -> Result<GameClient> {
        let session = Session::connect(url).await?;
        let mut client = GameClient {
            url: url.to_string(),
            game_id: game_id.to_string(),
            session,
            history: History::new(),
        };
        client.resync().await?;
        Ok(client)
    }

    /// Rebuild local state from the server: join, fetch the ordered log,
    /// replay. Any provisional events are gone; the caller re-enters them.
    pub async fn resync(&mut self) -> Result<()> {
        self.session.join_game(&self.game_id).await?;
        let (events, _total) = self.session.sync_all_game_events(&self.game_id).await?;
        self.history = History::new();
        for event in events {
            self.history.add_event(event)?;
        }
        Ok(())
    }

    /// Drain any fan-out received so far into the history engine.
    pub fn pump(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Ok(msg) = self.session.updates.try_recv() {
            if let ServerMessage::GameUpdate { game_id, event } = msg {
                if game_id == self.game_id {
                    self.history.add_event(event)?;
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }

    /// Apply locally and send; the echo from the server replaces the
    /// optimistic copy.
    pub async fn send(&mut self, event: GameEvent) -> Result<u64> {
        let id = self.history.add_optimistic(event.clone(), now_ms());
        self.session.send_game_event(&self.game_id, &event).await?;
        Ok(id)
    }

    /// Watchdog tick; on a dropped transport, reconnect and resync.
    pub async fn tick(&mut self) -> Result<bool> {
        if !self.history.check_watchdog(now_ms()) {
            return Ok(false);
        }
        debug!(game_id = %self.game_id, "optimistic watchdog fired, reconnecting");
        self.history.clear_optimistic();
        self.session = Session::connect(&self.url).await?;
        self.resync().await?;
        Ok(true)
    }
}
