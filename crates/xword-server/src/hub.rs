use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;

use xword_core::ServerMessage;

/// Outbound queue depth per subscriber. A client that cannot drain this many
/// messages is disconnected rather than allowed to stall the publisher.
pub const SUBSCRIBER_QUEUE: usize = 256;

pub fn game_topic(gid: &str) -> String {
    format!("game:{gid}")
}

pub fn room_topic(rid: &str) -> String {
    format!("room:{rid}")
}

/// Topic registry: `game:<gid>` / `room:<rid>` to the bounded senders of the
/// connections subscribed to it.
#[derive(Default)]
pub struct Hub {
    topics: DashMap<String, HashMap<u64, mpsc::Sender<ServerMessage>>>,
}

impl Hub {
    pub fn new() -> Hub {
        Hub::default()
    }

    pub fn subscribe(&self, topic: &str, conn_id: u64, tx: mpsc::Sender<ServerMessage>) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(conn_id, tx);
    }

    /// Idempotent.
    pub fn unsubscribe(&self, topic: &str, conn_id: u64) {
        if let Some(mut subs) = self.topics.get_mut(topic) {
            subs.remove(&conn_id);
        }
        self.topics.remove_if(topic, |_, subs| subs.is_empty());
    }

    pub fn unsubscribe_all(&self, conn_id: u64) {
        for mut entry in self.topics.iter_mut() {
            entry.value_mut().remove(&conn_id);
        }
        self.topics.retain(|_, subs| !subs.is_empty());
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    /// Best-effort fan-out. Senders are cloned out of the map entry first so
    /// no lock is held while enqueueing. Returns the connections whose queue
    /// overflowed; the caller disconnects them.
    pub fn publish(&self, topic: &str, msg: &ServerMessage) -> Vec<u64> {
        let senders: Vec<(u64, mpsc::Sender<ServerMessage>)> = match self.topics.get(topic) {
            Some(subs) => subs.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
            None => return Vec::new(),
        };

        let mut overflowed = Vec::new();
        for (conn_id, tx) in senders {
            match tx.try_send(msg.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => overflowed.push(conn_id),
                // Receiver already gone; its connection is tearing down.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        overflowed
    }
}
