use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::event::{GameEvent, RawGameEvent, RawRoomEvent, RoomEvent};

pub const DEFAULT_SYNC_LIMIT: u32 = 1000;
pub const MAX_SYNC_LIMIT: u32 = 1000;

fn default_sync_limit() -> u32 {
    DEFAULT_SYNC_LIMIT
}

/// RPCs a client may issue over the realtime connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinGame {
        game_id: String,
    },
    LeaveGame {
        game_id: String,
    },
    SyncAllGameEvents {
        game_id: String,
    },
    SyncRecentGameEvents {
        game_id: String,
        #[serde(default = "default_sync_limit")]
        limit: u32,
    },
    /// Two-phase tail query for paging backwards into the archive beyond the
    /// recent window.
    SyncArchivedGameEvents {
        game_id: String,
        #[serde(default)]
        offset: u32,
        #[serde(default = "default_sync_limit")]
        limit: u32,
    },
    GameEvent {
        game_id: String,
        event: RawGameEvent,
    },
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    SyncAllRoomEvents {
        room_id: String,
    },
    RoomEvent {
        room_id: String,
        event: RawRoomEvent,
    },
    LatencyPing {
        client_ts: f64,
    },
}

/// One inbound frame: an optional ack correlation number plus the command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub cmd: ClientCommand,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack {
        seq: u64,
    },
    AckError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after: Option<u64>,
    },
    SyncResult {
        seq: u64,
        events: Vec<GameEvent>,
        total: u64,
    },
    RoomSyncResult {
        seq: u64,
        events: Vec<RoomEvent>,
        total: u64,
    },
    /// Fan-out of a committed game event to every subscriber of its topic.
    GameUpdate {
        game_id: String,
        event: GameEvent,
    },
    RoomUpdate {
        room_id: String,
        event: RoomEvent,
    },
    Pong {
        client_ts: f64,
        server_ts: i64,
    },
}
