use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn is_false(b: &bool) -> bool {
    !*b
}

/// One grid square at runtime.
///
/// Invariants: `black` cells carry no value and are never good/bad/revealed;
/// `good` and `bad` are mutually exclusive; a cell that has gone `good` stays
/// that way for the rest of the game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cell {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solved_by_user: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub good: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub bad: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub revealed: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub pencil: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub black: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

/// Clues as sparse arrays indexed by cell number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Clues {
    pub across: Vec<Option<String>>,
    pub down: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chat {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub id: String,
    pub r: u32,
    pub c: u32,
    pub timestamp: i64,
}

/// Per-user display metadata, mutated by the updateDisplayName /
/// updateTeamName / updateTeamId events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
}

/// Game clock. `total_time` and `true_total_time` advance together while the
/// clock runs; a single tick never adds more than the configured increment
/// cap, so a stale client clock cannot dominate the total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Clock {
    pub paused: bool,
    pub total_time: i64,
    pub true_total_time: i64,
    pub last_updated: i64,
}

impl Default for Clock {
    fn default() -> Self {
        Clock {
            paused: true,
            total_time: 0,
            true_total_time: 0,
            last_updated: 0,
        }
    }
}

/// The live snapshot a log reduces to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    pub info: Value,
    pub grid: Vec<Vec<Cell>>,
    pub solution: Vec<Vec<String>>,
    pub clues: Clues,
    pub circles: Vec<u32>,
    pub shades: Vec<u32>,
    pub chat: Chat,
    pub cursors: Vec<Cursor>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub users: BTreeMap<String, UserMeta>,
    pub clock: Clock,
    pub solved: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub contest: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub contest_solved: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub clues_revealed: bool,
}

impl GameState {
    pub fn height(&self) -> usize {
        self.grid.len()
    }

    pub fn width(&self) -> usize {
        self.grid.first().map(Vec::len).unwrap_or(0)
    }

    /// Whether a create event has been applied yet.
    pub fn is_initialized(&self) -> bool {
        !self.grid.is_empty()
    }

    pub fn cell(&self, r: u32, c: u32) -> Option<&Cell> {
        self.grid.get(r as usize)?.get(c as usize)
    }

    pub fn cell_mut(&mut self, r: u32, c: u32) -> Option<&mut Cell> {
        self.grid.get_mut(r as usize)?.get_mut(c as usize)
    }

    /// Solution letter for a cell, if one is known.
    pub fn solution_at(&self, r: u32, c: u32) -> Option<&str> {
        let s = self.solution.get(r as usize)?.get(c as usize)?;
        if s.is_empty() { None } else { Some(s.as_str()) }
    }

    pub fn has_solution(&self) -> bool {
        self.solution.iter().flatten().any(|s| !s.is_empty())
    }

    /// True when every non-black cell matches its solution letter.
    pub fn grid_matches_solution(&self) -> bool {
        for (r, row) in self.grid.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if cell.black {
                    continue;
                }
                match self.solution_at(r as u32, c as u32) {
                    Some(want) if cell.value == want => {}
                    _ => return false,
                }
            }
        }
        true
    }
}
