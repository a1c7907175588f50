use serde_json::json;

use xword_core::event::{
    CellRef, ChatParams, CreateParams, EmptyParams, EventKind, GameEvent, ScopeParams,
    TeamIdParams, UpdateCellParams, UpdateCursorParams,
};
use xword_core::puzzle::{PuzzleDef, build_initial_state};
use xword_core::reducer::{MAX_CLOCK_INCREMENT_MS, reduce, replay};
use xword_core::state::GameState;

fn puzzle_2x2() -> PuzzleDef {
    serde_json::from_value(json!({
        "info": { "title": "tiny" },
        "solution": [["A", "B"], ["C", "."]],
        "puzzle": [[1, 2], [3, "#"]],
        "clues": {
            "across": [[1, "first row"]],
            "down": [[1, "first column"]]
        }
    }))
    .unwrap()
}

fn create_event(ts: i64) -> GameEvent {
    GameEvent {
        timestamp: ts,
        user: Some("u1".into()),
        game_timestamp: None,
        kind: EventKind::Create(CreateParams {
            pid: Some("p1".into()),
            version: Some(1),
            game: build_initial_state(&puzzle_2x2()).unwrap(),
        }),
    }
}

fn update_cell(ts: i64, r: u32, c: u32, value: &str, id: &str) -> GameEvent {
    GameEvent {
        timestamp: ts,
        user: Some(id.into()),
        game_timestamp: None,
        kind: EventKind::UpdateCell(UpdateCellParams {
            cell: CellRef { r, c },
            value: value.into(),
            autocheck: false,
            id: id.into(),
            pencil: false,
        }),
    }
}

fn simple(ts: i64, kind: EventKind) -> GameEvent {
    GameEvent {
        timestamp: ts,
        user: Some("u1".into()),
        game_timestamp: None,
        kind,
    }
}

fn check(ts: i64, r: u32, c: u32) -> GameEvent {
    simple(
        ts,
        EventKind::Check(ScopeParams {
            scope: vec![CellRef { r, c }],
            id: Some("u1".into()),
        }),
    )
}

#[test]
fn basic_solve() {
    let events = vec![
        create_event(1000),
        update_cell(2000, 0, 0, "A", "u1"),
        update_cell(3000, 0, 1, "B", "u2"),
        update_cell(4000, 1, 0, "C", "u1"),
    ];
    let state = replay(&events);
    assert!(state.solved);
    assert!(state.grid[1][1].black);
    assert_eq!(state.grid[0][1].solved_by_user.as_deref(), Some("u2"));
}

#[test]
fn not_solved_with_wrong_letter() {
    let events = vec![
        create_event(1000),
        update_cell(2000, 0, 0, "A", "u1"),
        update_cell(3000, 0, 1, "X", "u1"),
        update_cell(4000, 1, 0, "C", "u1"),
    ];
    assert!(!replay(&events).solved);
}

#[test]
fn good_is_sticky() {
    let events = vec![
        create_event(1000),
        update_cell(2000, 0, 0, "A", "u1"),
        check(3000, 0, 0),
        update_cell(4000, 0, 0, "Z", "u2"),
    ];
    let state = replay(&events);
    let cell = &state.grid[0][0];
    assert_eq!(cell.value, "A");
    assert!(cell.good);
    assert!(!cell.bad);
    // The overwrite was ignored entirely.
    assert_eq!(cell.solved_by_user.as_deref(), Some("u1"));
}

#[test]
fn check_marks_wrong_cell_bad() {
    let events = vec![
        create_event(1000),
        update_cell(2000, 0, 0, "Q", "u1"),
        check(3000, 0, 0),
    ];
    let state = replay(&events);
    assert!(state.grid[0][0].bad);
    assert!(!state.grid[0][0].good);
}

#[test]
fn check_on_empty_cell_is_noop() {
    let events = vec![create_event(1000), check(2000, 0, 0)];
    let state = replay(&events);
    assert!(!state.grid[0][0].good);
    assert!(!state.grid[0][0].bad);
}

#[test]
fn good_and_bad_never_both_set() {
    let events = vec![
        create_event(1000),
        update_cell(2000, 0, 0, "Q", "u1"),
        check(3000, 0, 0),
        update_cell(4000, 0, 0, "A", "u1"),
        check(5000, 0, 0),
    ];
    let mut state: Option<GameState> = None;
    for e in &events {
        state = Some(reduce(state.as_ref(), e, false));
        let s = state.as_ref().unwrap();
        for row in &s.grid {
            for cell in row {
                assert!(!(cell.good && cell.bad));
                if cell.black {
                    assert!(cell.value.is_empty());
                }
            }
        }
    }
    assert!(state.unwrap().grid[0][0].good);
}

#[test]
fn black_cell_ignores_updates() {
    let events = vec![create_event(1000), update_cell(2000, 1, 1, "Z", "u1")];
    let state = replay(&events);
    assert!(state.grid[1][1].black);
    assert_eq!(state.grid[1][1].value, "");
}

#[test]
fn out_of_bounds_update_is_ignored() {
    let events = vec![create_event(1000), update_cell(2000, 9, 9, "Z", "u1")];
    let state = replay(&events);
    assert!(!state.solved);
}

#[test]
fn reveal_sets_solution_and_marks_revealed() {
    let events = vec![
        create_event(1000),
        update_cell(2000, 0, 0, "Q", "u1"),
        simple(
            3000,
            EventKind::Reveal(ScopeParams {
                scope: vec![CellRef { r: 0, c: 0 }],
                id: Some("u1".into()),
            }),
        ),
    ];
    let state = replay(&events);
    let cell = &state.grid[0][0];
    assert_eq!(cell.value, "A");
    assert!(cell.good);
    assert!(cell.revealed);
}

#[test]
fn reveal_of_correct_cell_is_not_marked_revealed() {
    let events = vec![
        create_event(1000),
        update_cell(2000, 0, 0, "A", "u1"),
        simple(
            3000,
            EventKind::Reveal(ScopeParams {
                scope: vec![CellRef { r: 0, c: 0 }],
                id: Some("u1".into()),
            }),
        ),
    ];
    let state = replay(&events);
    assert!(state.grid[0][0].good);
    assert!(!state.grid[0][0].revealed);
}

#[test]
fn reset_clears_cell_state() {
    let events = vec![
        create_event(1000),
        update_cell(2000, 0, 0, "A", "u1"),
        check(3000, 0, 0),
        simple(
            4000,
            EventKind::Reset(xword_core::event::ResetParams {
                scope: vec![CellRef { r: 0, c: 0 }],
            }),
        ),
    ];
    let state = replay(&events);
    let cell = &state.grid[0][0];
    assert_eq!(cell.value, "");
    assert!(!cell.good && !cell.bad && !cell.revealed);
    assert!(!state.solved);
}

#[test]
fn autocheck_marks_on_entry() {
    let mut e = update_cell(2000, 0, 0, "A", "u1");
    if let EventKind::UpdateCell(p) = &mut e.kind {
        p.autocheck = true;
    }
    let state = replay(&[create_event(1000), e]);
    assert!(state.grid[0][0].good);
}

#[test]
fn cursor_replaced_in_place() {
    let cursor = |ts, r, c, id: &str| {
        simple(
            ts,
            EventKind::UpdateCursor(UpdateCursorParams {
                cell: CellRef { r, c },
                id: id.into(),
                timestamp: None,
            }),
        )
    };
    let state = replay(&[
        create_event(1000),
        cursor(2000, 0, 0, "u1"),
        cursor(3000, 0, 1, "u2"),
        cursor(4000, 1, 0, "u1"),
    ]);
    assert_eq!(state.cursors.len(), 2);
    let u1 = state.cursors.iter().find(|c| c.id == "u1").unwrap();
    assert_eq!((u1.r, u1.c), (1, 0));
}

#[test]
fn chat_appends_in_order() {
    let chat = |ts, text: &str| {
        simple(
            ts,
            EventKind::SendChatMessage(ChatParams {
                id: "u1".into(),
                message: text.into(),
            }),
        )
    };
    let state = replay(&[create_event(1000), chat(2000, "hi"), chat(3000, "there")]);
    assert_eq!(state.chat.messages.len(), 2);
    assert_eq!(state.chat.messages[0].text, "hi");
    assert_eq!(state.chat.messages[1].timestamp, 3000);
}

#[test]
fn team_id_recorded() {
    let state = replay(&[
        create_event(1000),
        simple(
            2000,
            EventKind::UpdateTeamId(TeamIdParams {
                id: "u1".into(),
                team_id: 2,
            }),
        ),
    ]);
    assert_eq!(state.users["u1"].team_id, Some(2));
}

#[test]
fn clock_starts_paused_and_runs_after_start() {
    let state = replay(&[create_event(1000)]);
    assert!(state.clock.paused);
    assert_eq!(state.clock.total_time, 0);

    let state = replay(&[
        create_event(1000),
        simple(2000, EventKind::ClockStart(EmptyParams {})),
        update_cell(7000, 0, 0, "A", "u1"),
    ]);
    assert!(!state.clock.paused);
    assert_eq!(state.clock.total_time, 5000);
    assert_eq!(state.clock.true_total_time, 5000);
}

#[test]
fn clock_single_tick_is_capped() {
    let state = replay(&[
        create_event(1000),
        simple(2000, EventKind::ClockStart(EmptyParams {})),
        update_cell(2000 + MAX_CLOCK_INCREMENT_MS + 50_000, 0, 0, "A", "u1"),
    ]);
    assert_eq!(state.clock.total_time, MAX_CLOCK_INCREMENT_MS);
}

#[test]
fn clock_total_time_is_monotonic() {
    let events = vec![
        create_event(1000),
        simple(2000, EventKind::ClockStart(EmptyParams {})),
        update_cell(5000, 0, 0, "A", "u1"),
        simple(6000, EventKind::ClockPause(EmptyParams {})),
        update_cell(9000, 0, 1, "B", "u1"),
        simple(9500, EventKind::ClockStart(EmptyParams {})),
        update_cell(11_000, 1, 0, "X", "u1"),
    ];
    let mut state: Option<GameState> = None;
    let mut last_total = 0;
    for e in &events {
        state = Some(reduce(state.as_ref(), e, false));
        let total = state.as_ref().unwrap().clock.total_time;
        assert!(total >= last_total);
        last_total = total;
    }
    // Paused stretch (6000..9500) contributed nothing.
    assert_eq!(last_total, 4000 + 1500);
}

#[test]
fn clock_reset_zeroes_both_times() {
    let state = replay(&[
        create_event(1000),
        simple(2000, EventKind::StartGame(EmptyParams {})),
        update_cell(5000, 0, 0, "A", "u1"),
        simple(6000, EventKind::ClockReset(EmptyParams {})),
    ]);
    assert_eq!(state.clock.total_time, 0);
    assert_eq!(state.clock.true_total_time, 0);
}

#[test]
fn start_game_unpauses() {
    let state = replay(&[
        create_event(1000),
        simple(2000, EventKind::StartGame(EmptyParams {})),
    ]);
    assert!(!state.clock.paused);
}

#[test]
fn contest_ignores_check_and_reveal() {
    let mut def = puzzle_2x2();
    def.info = json!({ "title": "tiny", "contest": true });
    let create = GameEvent {
        timestamp: 1000,
        user: Some("u1".into()),
        game_timestamp: None,
        kind: EventKind::Create(CreateParams {
            pid: None,
            version: Some(1),
            game: build_initial_state(&def).unwrap(),
        }),
    };
    let state = replay(&[
        create.clone(),
        update_cell(2000, 0, 0, "A", "u1"),
        check(3000, 0, 0),
    ]);
    assert!(state.contest);
    assert!(!state.grid[0][0].good);

    // A full correct grid does not flip solved in contest mode...
    let state = replay(&[
        create.clone(),
        update_cell(2000, 0, 0, "A", "u1"),
        update_cell(3000, 0, 1, "B", "u1"),
        update_cell(4000, 1, 0, "C", "u1"),
    ]);
    assert!(!state.solved);

    // ...only markSolved does, and unmarkSolved undoes it.
    let state = replay(&[
        create.clone(),
        simple(2000, EventKind::MarkSolved(EmptyParams {})),
    ]);
    assert!(state.solved && state.contest_solved);
    let state = replay(&[
        create,
        simple(2000, EventKind::MarkSolved(EmptyParams {})),
        simple(3000, EventKind::UnmarkSolved(EmptyParams {})),
    ]);
    assert!(!state.solved && !state.contest_solved);
}

#[test]
fn mark_solved_is_noop_outside_contest() {
    let state = replay(&[
        create_event(1000),
        simple(2000, EventKind::MarkSolved(EmptyParams {})),
    ]);
    assert!(!state.solved);
}

#[test]
fn reveal_all_clues_sets_flag() {
    let state = replay(&[
        create_event(1000),
        simple(2000, EventKind::RevealAllClues(EmptyParams {})),
    ]);
    assert!(state.clues_revealed);
}

#[test]
fn duplicate_create_leaves_state_untouched() {
    let state = replay(&[
        create_event(1000),
        update_cell(2000, 0, 0, "A", "u1"),
        create_event(3000),
    ]);
    assert_eq!(state.grid[0][0].value, "A");
}

#[test]
fn event_before_create_reduces_to_empty_state() {
    let state = reduce(None, &update_cell(1000, 0, 0, "A", "u1"), false);
    assert!(!state.is_initialized());
}

#[test]
fn optimistic_flag_does_not_change_result() {
    let e = update_cell(2000, 0, 0, "A", "u1");
    let base = replay(&[create_event(1000)]);
    assert_eq!(
        reduce(Some(&base), &e, false),
        reduce(Some(&base), &e, true)
    );
}
