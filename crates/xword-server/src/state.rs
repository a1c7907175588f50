use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::Mutex;

use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::{Notify, mpsc};

use xword_core::ServerMessage;

use crate::auth::TokenService;
use crate::config::Config;
use crate::hub::Hub;
use crate::rate_limit::RateLimiter;

/// One-shot close signal with a reason, shared between the connection task
/// and whoever decides the connection has to go.
#[derive(Default)]
pub struct Kill {
    reason: Mutex<Option<&'static str>>,
    notify: Notify,
}

impl Kill {
    pub fn kill(&self, reason: &'static str) {
        let mut slot = self.reason.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(reason);
        }
        drop(slot);
        self.notify.notify_one();
    }

    pub async fn wait(&self) -> &'static str {
        self.notify.notified().await;
        self.reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or("CLOSED")
    }
}

/// Handle to push messages to a connected client.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub conn_id: u64,
    pub user_id: String,
    pub tx: mpsc::Sender<ServerMessage>,
    pub kill: Arc<Kill>,
}

/// Shared application state.
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub tokens: TokenService,
    pub hub: Hub,
    pub connections: DashMap<u64, ConnectionHandle>,
    pub rate: RateLimiter,
    pub next_conn_id: AtomicU64,
}

impl AppState {
    /// Disconnect subscribers whose outbound queue overflowed during a
    /// publish. Other subscribers are unaffected.
    pub fn kill_overflowed(&self, conn_ids: Vec<u64>) {
        for conn_id in conn_ids {
            tracing::warn!(conn_id, "subscriber queue overflow, disconnecting");
            self.hub.unsubscribe_all(conn_id);
            if let Some(conn) = self.connections.get(&conn_id) {
                conn.kill.kill("BACKPRESSURE");
            }
        }
    }
}
