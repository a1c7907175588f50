use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::GameState;

/// A single cell address on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRef {
    pub r: u32,
    pub c: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub game: GameState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCellParams {
    pub cell: CellRef,
    pub value: String,
    #[serde(default)]
    pub autocheck: bool,
    pub id: String,
    #[serde(default)]
    pub pencil: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCursorParams {
    pub cell: CellRef,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Params for `check` and `reveal`. The scope must name exactly one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeParams {
    pub scope: Vec<CellRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetParams {
    pub scope: Vec<CellRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatParams {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayNameParams {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamNameParams {
    pub id: String,
    pub team_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamIdParams {
    pub id: String,
    pub team_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyParams {}

/// The typed event body: `{"type": ..., "params": {...}}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum EventKind {
    #[serde(rename = "create")]
    Create(CreateParams),
    #[serde(rename = "updateCell")]
    UpdateCell(UpdateCellParams),
    #[serde(rename = "updateCursor")]
    UpdateCursor(UpdateCursorParams),
    #[serde(rename = "check")]
    Check(ScopeParams),
    #[serde(rename = "reveal")]
    Reveal(ScopeParams),
    #[serde(rename = "reset")]
    Reset(ResetParams),
    #[serde(rename = "revealAllClues")]
    RevealAllClues(EmptyParams),
    #[serde(rename = "startGame")]
    StartGame(EmptyParams),
    #[serde(rename = "sendChatMessage")]
    SendChatMessage(ChatParams),
    #[serde(rename = "updateDisplayName")]
    UpdateDisplayName(DisplayNameParams),
    #[serde(rename = "updateTeamName")]
    UpdateTeamName(TeamNameParams),
    #[serde(rename = "updateTeamId")]
    UpdateTeamId(TeamIdParams),
    #[serde(rename = "clockStart")]
    ClockStart(EmptyParams),
    #[serde(rename = "clockPause")]
    ClockPause(EmptyParams),
    #[serde(rename = "clockReset")]
    ClockReset(EmptyParams),
    #[serde(rename = "markSolved")]
    MarkSolved(EmptyParams),
    #[serde(rename = "unmarkSolved")]
    UnmarkSolved(EmptyParams),
}

impl EventKind {
    /// The wire tag, also used as the store's event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::Create(_) => "create",
            EventKind::UpdateCell(_) => "updateCell",
            EventKind::UpdateCursor(_) => "updateCursor",
            EventKind::Check(_) => "check",
            EventKind::Reveal(_) => "reveal",
            EventKind::Reset(_) => "reset",
            EventKind::RevealAllClues(_) => "revealAllClues",
            EventKind::StartGame(_) => "startGame",
            EventKind::SendChatMessage(_) => "sendChatMessage",
            EventKind::UpdateDisplayName(_) => "updateDisplayName",
            EventKind::UpdateTeamName(_) => "updateTeamName",
            EventKind::UpdateTeamId(_) => "updateTeamId",
            EventKind::ClockStart(_) => "clockStart",
            EventKind::ClockPause(_) => "clockPause",
            EventKind::ClockReset(_) => "clockReset",
            EventKind::MarkSolved(_) => "markSolved",
            EventKind::UnmarkSolved(_) => "unmarkSolved",
        }
    }
}

/// A fully coerced game event: timestamp is always a positive ms integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Game-clock time at this event's position in the log. Backfilled by the
    /// history engine, never sent by clients.
    #[serde(
        rename = "gameTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub game_timestamp: Option<i64>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl GameEvent {
    /// Equality ignoring timestamps: the server re-stamps every event, so an
    /// optimistic local copy can only be matched on (type, user, params).
    pub fn same_action(&self, other: &GameEvent) -> bool {
        self.user == other.user && self.kind == other.kind
    }
}

/// Raw timestamp as clients may send it: integer ms, a float, or the
/// `{".sv": "timestamp"}` sentinel meaning "server now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Float(f64),
    Sentinel(SentinelTimestamp),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelTimestamp {
    #[serde(rename = ".sv")]
    pub sv: String,
}

/// Normalize a raw timestamp: anything that is not a positive finite number
/// becomes the server clock.
pub fn coerce_timestamp(raw: Option<&RawTimestamp>, now_ms: i64) -> i64 {
    match raw {
        Some(RawTimestamp::Millis(n)) if *n > 0 => *n,
        Some(RawTimestamp::Float(f)) if f.is_finite() && *f > 0.0 => *f as i64,
        _ => now_ms,
    }
}

/// A game event as received from a client, before timestamp coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGameEvent {
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl RawGameEvent {
    pub fn coerce(self, now_ms: i64) -> GameEvent {
        GameEvent {
            timestamp: coerce_timestamp(self.timestamp.as_ref(), now_ms),
            user: self.user,
            game_timestamp: None,
            kind: self.kind,
        }
    }
}

/// Room event types. Rooms are containers for a sequence of games; their log
/// is stored and fanned out but never reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEventKind {
    UserJoin,
    UserLeave,
    UserPing,
    SetGame,
    Chat,
    Presence,
}

impl RoomEventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RoomEventKind::UserJoin => "USER_JOIN",
            RoomEventKind::UserLeave => "USER_LEAVE",
            RoomEventKind::UserPing => "USER_PING",
            RoomEventKind::SetGame => "SET_GAME",
            RoomEventKind::Chat => "CHAT",
            RoomEventKind::Presence => "PRESENCE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(rename = "type")]
    pub kind: RoomEventKind,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRoomEvent {
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(rename = "type")]
    pub kind: RoomEventKind,
    #[serde(default)]
    pub params: Value,
}

impl RawRoomEvent {
    pub fn coerce(self, now_ms: i64) -> RoomEvent {
        RoomEvent {
            timestamp: coerce_timestamp(self.timestamp.as_ref(), now_ms),
            user: self.user,
            kind: self.kind,
            params: self.params,
        }
    }
}
