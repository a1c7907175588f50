pub mod error;
pub mod event;
pub mod protocol;
pub mod puzzle;
pub mod reducer;
pub mod state;
pub mod validation;

pub use error::{Error, ErrorCode};
pub use event::{EventKind, GameEvent, RawGameEvent, RawRoomEvent, RoomEvent, RoomEventKind};
pub use protocol::{ClientCommand, ClientFrame, ServerMessage};
pub use reducer::{reduce, replay, MAX_CLOCK_INCREMENT_MS};
pub use state::{Cell, GameState};
