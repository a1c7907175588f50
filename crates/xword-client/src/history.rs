use std::cmp::Reverse;
use std::collections::BinaryHeap;

use xword_core::error::{Error, Result};
use xword_core::event::{EventKind, GameEvent};
use xword_core::reducer::reduce;
use xword_core::state::GameState;

/// A memo checkpoint is dropped every this many events.
pub const MEMO_RATE: usize = 10;

/// Provisional timestamps lead the last server timestamp by this much.
pub const OPTIMISTIC_TS_LEAD_MS: i64 = 1_000;

/// An optimistic event unacknowledged for this long means the transport is
/// dropped and the session should reconnect.
pub const OPTIMISTIC_DEADLINE_MS: i64 = 5_000;

struct MemoEntry {
    /// Index of the last event folded into `state`; -1 is the empty base.
    index: i64,
    state: GameState,
}

/// Client-side memoized replay of the event log, with optimistic local
/// events layered on top.
///
/// The reducer is pure, so every memo entry is a cache and never
/// authoritative: any snapshot must equal a from-scratch replay of the same
/// prefix.
pub struct History {
    history: Vec<GameEvent>,
    optimistic: Vec<(u64, GameEvent)>,
    memo: Vec<MemoEntry>,
    watchdog: BinaryHeap<Reverse<(i64, u64)>>,
    next_optimistic_id: u64,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> History {
        History {
            history: Vec::new(),
            optimistic: Vec::new(),
            memo: vec![MemoEntry {
                index: -1,
                state: GameState::default(),
            }],
            watchdog: BinaryHeap::new(),
            next_optimistic_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn events(&self) -> &[GameEvent] {
        &self.history
    }

    pub fn optimistic_len(&self) -> usize {
        self.optimistic.len()
    }

    pub fn last_server_timestamp(&self) -> i64 {
        self.history.last().map(|e| e.timestamp).unwrap_or(0)
    }

    /// Insert a server-confirmed event in timestamp order (after any equal
    /// timestamps, preserving arrival order). Matching optimistic events are
    /// discarded, invalidated memo entries dropped, and the event's
    /// game-clock timestamp backfilled. Returns the insertion index.
    pub fn add_event(&mut self, event: GameEvent) -> Result<usize> {
        // An insert that predates an already-applied create can never reduce
        // meaningfully; reject it outright.
        if let Some(first) = self.history.first() {
            if matches!(first.kind, EventKind::Create(_)) && event.timestamp < first.timestamp {
                return Err(Error::validation("event predates the create event"));
            }
        }

        let idx = self
            .history
            .partition_point(|e| e.timestamp <= event.timestamp);

        // Dedup against events already synced (same type, user and params at
        // the same timestamp).
        let mut probe = idx;
        while probe > 0 && self.history[probe - 1].timestamp == event.timestamp {
            probe -= 1;
            if self.history[probe].same_action(&event) {
                return Ok(probe);
            }
        }

        // The server confirmed this action; drop the provisional copy.
        self.optimistic.retain(|(_, o)| !o.same_action(&event));

        self.memo.retain(|m| m.index < idx as i64);
        self.history.insert(idx, GameEvent {
            game_timestamp: None,
            ..event
        });

        // Walk forward from the last surviving checkpoint, re-memoizing and
        // capturing the game clock at the insertion point.
        let (mut state, from) = match self.memo.last() {
            Some(base) => (base.state.clone(), (base.index + 1) as usize),
            None => (GameState::default(), 0),
        };
        for i in from..self.history.len() {
            state = reduce(Some(&state), &self.history[i], false);
            if i == idx {
                self.history[i].game_timestamp = Some(state.clock.true_total_time);
            }
            if (i + 1) % MEMO_RATE == 0 {
                self.memo.push(MemoEntry {
                    index: i as i64,
                    state: state.clone(),
                });
            }
        }

        Ok(idx)
    }

    /// Snapshot after applying events `[0..=index]`, optionally with the
    /// optimistic queue applied on top.
    pub fn snapshot_at_index(&self, index: i64, optimistic: bool) -> GameState {
        let index = index.min(self.history.len() as i64 - 1);

        // Largest memoized prefix not beyond the requested index. The
        // index -1 base entry always matches.
        let pos = self.memo.partition_point(|m| m.index <= index).max(1);
        let entry = &self.memo[pos - 1];

        let mut state = entry.state.clone();
        if index >= 0 {
            for i in (entry.index + 1) as usize..=index as usize {
                state = reduce(Some(&state), &self.history[i], false);
            }
        }

        if optimistic {
            for (_, e) in &self.optimistic {
                state = reduce(Some(&state), e, true);
            }
        }
        state
    }

    /// Snapshot as of a game-clock timestamp.
    pub fn snapshot_at(&self, game_timestamp: i64, optimistic: bool) -> GameState {
        let idx = self
            .history
            .partition_point(|e| e.game_timestamp.unwrap_or(0) < game_timestamp);
        self.snapshot_at_index(idx as i64 - 1, optimistic)
    }

    /// Current head snapshot including optimistic events.
    pub fn snapshot(&self) -> GameState {
        self.snapshot_at_index(self.history.len() as i64 - 1, true)
    }

    /// Queue a locally generated event ahead of server confirmation. The
    /// provisional timestamp sorts after everything already synced; the
    /// watchdog deadline is armed off `now_ms`.
    pub fn add_optimistic(&mut self, mut event: GameEvent, now_ms: i64) -> u64 {
        event.timestamp =
            self.last_server_timestamp() + OPTIMISTIC_TS_LEAD_MS + self.optimistic.len() as i64;
        let id = self.next_optimistic_id;
        self.next_optimistic_id += 1;
        self.optimistic.push((id, event));
        self.watchdog
            .push(Reverse((now_ms + OPTIMISTIC_DEADLINE_MS, id)));
        id
    }

    /// Scan expired watchdog deadlines. Returns true when some optimistic
    /// event has outlived its deadline unacknowledged -- the transport is
    /// considered dropped and the caller should reconnect.
    pub fn check_watchdog(&mut self, now_ms: i64) -> bool {
        while let Some(Reverse((deadline, id))) = self.watchdog.peek().copied() {
            if deadline > now_ms {
                return false;
            }
            self.watchdog.pop();
            if self.optimistic.iter().any(|(oid, _)| *oid == id) {
                return true;
            }
        }
        false
    }

    /// Drop all provisional state, on explicit reset or reconnection.
    pub fn clear_optimistic(&mut self) {
        self.optimistic.clear();
        self.watchdog.clear();
    }
}
