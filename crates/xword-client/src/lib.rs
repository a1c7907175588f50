pub mod history;
pub mod session;

pub use history::{History, MEMO_RATE, OPTIMISTIC_DEADLINE_MS};
pub use session::{GameClient, Session};
