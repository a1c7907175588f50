use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::{Cell, Clues, GameState};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PuzzleError {
    #[error("EMPTY_GRID: solution has no rows or a zero-width row")]
    EmptyGrid,
    #[error("solution rows have unequal widths")]
    RaggedGrid,
    #[error("puzzle and solution grids disagree on black cells at ({r},{c})")]
    BlackMismatch { r: usize, c: usize },
    #[error("clue number {0} does not start a word")]
    BadClueNumber(u32),
}

/// The puzzle artifact as uploaded. Consumed once, at game creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PuzzleDef {
    pub info: Value,
    pub solution: Vec<Vec<Option<String>>>,
    pub puzzle: Vec<Vec<PuzzleCell>>,
    pub clues: PuzzleClues,
}

/// One entry of the `puzzle` grid: a cell number, a `"#"` black marker, or a
/// styled object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PuzzleCell {
    Number(u32),
    Label(String),
    Styled(StyledCell),
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyledCell {
    pub cell: Option<u32>,
    pub style: Option<CellStyle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellStyle {
    pub shapebg: Option<String>,
    pub fillbg: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PuzzleClues {
    pub across: ClueList,
    pub down: ClueList,
}

/// Clues arrive in one of three legacy shapes: `[number, text]` pairs, a
/// sparse array indexed by number, or `{number, clue}` objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClueList {
    Pairs(Vec<(Value, Value)>),
    Sparse(Vec<Option<String>>),
    Objects(Vec<ClueObj>),
}

impl Default for ClueList {
    fn default() -> Self {
        ClueList::Sparse(Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClueObj {
    pub number: Value,
    pub clue: Value,
}

fn as_number(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten any clue shape into `(number, text)` pairs sorted by number.
/// When an object's `number` field is non-numeric but its `clue` is numeric,
/// the two are swapped (a long-standing bug in one upstream exporter).
pub fn normalize_clues(list: &ClueList) -> Vec<(u32, String)> {
    let mut out: Vec<(u32, String)> = match list {
        ClueList::Pairs(pairs) => pairs
            .iter()
            .filter_map(|(n, t)| Some((as_number(n)?, as_text(t))))
            .collect(),
        ClueList::Sparse(entries) => entries
            .iter()
            .enumerate()
            .filter_map(|(i, t)| Some((i as u32, t.clone()?)))
            .collect(),
        ClueList::Objects(objs) => objs
            .iter()
            .filter_map(|o| {
                if as_number(&o.number).is_none() && as_number(&o.clue).is_some() {
                    Some((as_number(&o.clue)?, as_text(&o.number)))
                } else {
                    Some((as_number(&o.number)?, as_text(&o.clue)))
                }
            })
            .collect(),
    };
    out.sort_by_key(|(n, _)| *n);
    out
}

fn sparse(pairs: &[(u32, String)]) -> Vec<Option<String>> {
    let max = pairs.iter().map(|(n, _)| *n).max().unwrap_or(0);
    let mut v = vec![None; max as usize + 1];
    for (n, text) in pairs {
        v[*n as usize] = Some(text.clone());
    }
    v
}

fn is_black_solution(cell: &Option<String>) -> bool {
    match cell.as_deref() {
        None | Some(".") | Some("#") => true,
        _ => false,
    }
}

/// Build the initial game state a `create` event snapshots into the log.
///
/// Detects black cells from the solution grid, assigns word-start numbers in
/// row-major order, extracts circles and shades from cell styles, and
/// normalizes clues into sparse arrays indexed by cell number.
pub fn build_initial_state(def: &PuzzleDef) -> Result<GameState, PuzzleError> {
    let h = def.solution.len();
    if h == 0 {
        return Err(PuzzleError::EmptyGrid);
    }
    let w = def.solution[0].len();
    if w == 0 {
        return Err(PuzzleError::EmptyGrid);
    }
    for row in &def.solution {
        if row.is_empty() {
            return Err(PuzzleError::EmptyGrid);
        }
        if row.len() != w {
            return Err(PuzzleError::RaggedGrid);
        }
    }

    let black: Vec<Vec<bool>> = def
        .solution
        .iter()
        .map(|row| row.iter().map(is_black_solution).collect())
        .collect();

    // The puzzle grid, when present, must agree on which cells are black.
    if !def.puzzle.is_empty() {
        if def.puzzle.len() != h || def.puzzle.iter().any(|row| row.len() != w) {
            return Err(PuzzleError::RaggedGrid);
        }
        for (r, row) in def.puzzle.iter().enumerate() {
            for (c, pc) in row.iter().enumerate() {
                let puzzle_black = matches!(pc, PuzzleCell::Label(s) if s == "#");
                if puzzle_black != black[r][c] {
                    return Err(PuzzleError::BlackMismatch { r, c });
                }
            }
        }
    }

    // Word-start numbering, scanning top-left to bottom-right.
    let mut next = 0u32;
    let mut numbers = vec![vec![None; w]; h];
    for r in 0..h {
        for c in 0..w {
            if black[r][c] {
                continue;
            }
            let starts_across = (c == 0 || black[r][c - 1]) && c + 1 < w && !black[r][c + 1];
            let starts_down = (r == 0 || black[r - 1][c]) && r + 1 < h && !black[r + 1][c];
            if starts_across || starts_down {
                next += 1;
                numbers[r][c] = Some(next);
            }
        }
    }

    let mut circles = Vec::new();
    let mut shades = Vec::new();
    for (r, row) in def.puzzle.iter().enumerate() {
        for (c, pc) in row.iter().enumerate() {
            if let PuzzleCell::Styled(styled) = pc {
                if let Some(style) = &styled.style {
                    let idx = (r * w + c) as u32;
                    if style.shapebg.as_deref() == Some("circle") {
                        circles.push(idx);
                    }
                    if style.fillbg.as_deref().is_some_and(|f| !f.is_empty()) {
                        shades.push(idx);
                    }
                }
            }
        }
    }

    let across = normalize_clues(&def.clues.across);
    let down = normalize_clues(&def.clues.down);
    for (n, _) in across.iter().chain(down.iter()) {
        if *n > next {
            return Err(PuzzleError::BadClueNumber(*n));
        }
    }

    let grid = (0..h)
        .map(|r| {
            (0..w)
                .map(|c| Cell {
                    black: black[r][c],
                    number: numbers[r][c],
                    ..Cell::default()
                })
                .collect()
        })
        .collect();

    let solution = def
        .solution
        .iter()
        .map(|row| {
            row.iter()
                .map(|s| s.clone().unwrap_or_default())
                .collect()
        })
        .collect();

    let contest = def
        .info
        .get("contest")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(GameState {
        info: def.info.clone(),
        grid,
        solution,
        clues: Clues {
            across: sparse(&across),
            down: sparse(&down),
        },
        circles,
        shades,
        contest,
        ..GameState::default()
    })
}
