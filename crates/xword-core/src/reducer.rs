use serde_json::Value;

use crate::event::{EventKind, GameEvent, ScopeParams};
use crate::state::{ChatMessage, Clock, Cursor, GameState};

/// Ceiling on the clock delta a single event may contribute. A laptop waking
/// from sleep replays with a huge timestamp gap; the cap keeps one gap from
/// dominating the total.
pub const MAX_CLOCK_INCREMENT_MS: i64 = 30_000;

/// Advance the clock to `now`, then apply the requested pause transition.
fn tick(clock: &mut Clock, now: i64, paused_next: Option<bool>) {
    let delta = (now - clock.last_updated).clamp(0, MAX_CLOCK_INCREMENT_MS);
    if !clock.paused {
        clock.total_time += delta;
        clock.true_total_time += delta;
    }
    if let Some(p) = paused_next {
        clock.paused = p;
    }
    clock.last_updated = now;
}

fn recompute_solved(state: &mut GameState) {
    if state.contest {
        state.solved = state.contest_solved;
    } else if state.has_solution() {
        state.solved = state.grid_matches_solution();
    }
}

fn check_scope(state: &mut GameState, params: &ScopeParams) {
    for cr in &params.scope {
        let Some(sol) = state.solution_at(cr.r, cr.c).map(str::to_owned) else {
            continue;
        };
        let Some(cell) = state.cell_mut(cr.r, cr.c) else {
            continue;
        };
        if cell.black || cell.value.is_empty() {
            continue;
        }
        if cell.value == sol {
            cell.good = true;
            cell.bad = false;
        } else {
            cell.bad = true;
            cell.good = false;
        }
    }
}

fn reveal_scope(state: &mut GameState, params: &ScopeParams) {
    for cr in &params.scope {
        let Some(sol) = state.solution_at(cr.r, cr.c).map(str::to_owned) else {
            continue;
        };
        let Some(cell) = state.cell_mut(cr.r, cr.c) else {
            continue;
        };
        if cell.black {
            continue;
        }
        if cell.value != sol {
            cell.revealed = true;
        }
        cell.value = sol;
        cell.good = true;
        cell.bad = false;
    }
}

/// Pure reducer: `(state, event) -> state`.
///
/// `optimistic` marks a provisional local application; the transition logic
/// is identical either way, the caller just treats the result as tentative.
pub fn reduce(prev: Option<&GameState>, event: &GameEvent, optimistic: bool) -> GameState {
    let _ = optimistic;

    if let EventKind::Create(params) = &event.kind {
        if let Some(p) = prev {
            if p.is_initialized() {
                // A log carries exactly one create; replays of a duplicate
                // leave the state untouched.
                return p.clone();
            }
        }
        let mut state = params.game.clone();
        if !state.contest {
            state.contest = state
                .info
                .get("contest")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        }
        if state.clock.last_updated == 0 {
            state.clock = Clock {
                paused: true,
                total_time: 0,
                true_total_time: 0,
                last_updated: event.timestamp,
            };
        }
        state.solved = false;
        return state;
    }

    let Some(prev) = prev else {
        return GameState::default();
    };
    if !prev.is_initialized() {
        return prev.clone();
    }
    let mut state = prev.clone();

    let paused_next = match &event.kind {
        EventKind::ClockStart(_) | EventKind::StartGame(_) => Some(false),
        EventKind::ClockPause(_) => Some(true),
        _ => None,
    };
    tick(&mut state.clock, event.timestamp, paused_next);

    match &event.kind {
        EventKind::Create(_) => unreachable!("handled above"),

        EventKind::UpdateCell(p) => {
            let sol = state.solution_at(p.cell.r, p.cell.c).map(str::to_owned);
            if let Some(cell) = state.cell_mut(p.cell.r, p.cell.c) {
                // Black cells never take a value; a cell confirmed good is
                // locked for the rest of the game.
                if !cell.black && !cell.good {
                    cell.value = p.value.clone();
                    cell.bad = false;
                    cell.pencil = p.pencil;
                    cell.solved_by_user = Some(p.id.clone());
                    if p.autocheck {
                        match sol {
                            Some(s) if cell.value == s => {
                                cell.good = true;
                                cell.bad = false;
                            }
                            Some(_) => {
                                cell.bad = true;
                                cell.good = false;
                            }
                            None => {}
                        }
                    }
                    recompute_solved(&mut state);
                }
            }
        }

        EventKind::UpdateCursor(p) => {
            let cursor = Cursor {
                id: p.id.clone(),
                r: p.cell.r,
                c: p.cell.c,
                timestamp: p.timestamp.unwrap_or(event.timestamp),
            };
            match state.cursors.iter_mut().find(|c| c.id == p.id) {
                Some(existing) => *existing = cursor,
                None => state.cursors.push(cursor),
            }
        }

        EventKind::Check(p) => {
            if !state.contest {
                check_scope(&mut state, p);
                recompute_solved(&mut state);
            }
        }

        EventKind::Reveal(p) => {
            if !state.contest {
                reveal_scope(&mut state, p);
                recompute_solved(&mut state);
            }
        }

        EventKind::Reset(p) => {
            for cr in &p.scope {
                if let Some(cell) = state.cell_mut(cr.r, cr.c) {
                    if cell.black {
                        continue;
                    }
                    cell.value.clear();
                    cell.good = false;
                    cell.bad = false;
                    cell.revealed = false;
                }
            }
            recompute_solved(&mut state);
        }

        EventKind::RevealAllClues(_) => {
            state.clues_revealed = true;
        }

        EventKind::SendChatMessage(p) => {
            state.chat.messages.push(ChatMessage {
                id: p.id.clone(),
                text: p.message.clone(),
                timestamp: event.timestamp,
            });
        }

        EventKind::UpdateDisplayName(p) => {
            state.users.entry(p.id.clone()).or_default().display_name = Some(p.display_name.clone());
        }

        EventKind::UpdateTeamName(p) => {
            state.users.entry(p.id.clone()).or_default().team_name = Some(p.team_name.clone());
        }

        EventKind::UpdateTeamId(p) => {
            state.users.entry(p.id.clone()).or_default().team_id = Some(p.team_id);
        }

        // Pause transitions are fully handled by the tick above.
        EventKind::StartGame(_) | EventKind::ClockStart(_) | EventKind::ClockPause(_) => {}

        EventKind::ClockReset(_) => {
            state.clock.total_time = 0;
            state.clock.true_total_time = 0;
        }

        EventKind::MarkSolved(_) => {
            if state.contest {
                state.contest_solved = true;
                state.solved = true;
            }
        }

        EventKind::UnmarkSolved(_) => {
            if state.contest {
                state.contest_solved = false;
                state.solved = false;
            }
        }
    }

    state
}

/// Replay a whole log from scratch. Memoization layers above this must agree
/// with it exactly.
pub fn replay(events: &[GameEvent]) -> GameState {
    let mut state: Option<GameState> = None;
    for e in events {
        state = Some(reduce(state.as_ref(), e, false));
    }
    state.unwrap_or_default()
}
