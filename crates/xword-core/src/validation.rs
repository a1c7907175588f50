use crate::error::{Error, Result};
use crate::event::{EventKind, GameEvent, RoomEvent};

pub const MAX_CHAT_LEN: usize = 1000;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_USER_ID_LEN: usize = 128;

/// User ids are opaque but bounded: 1..=128 printable characters.
pub fn valid_user_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_USER_ID_LEN
        && id.chars().all(|ch| !ch.is_control())
}

fn require_user_id(id: &str) -> Result<()> {
    if valid_user_id(id) {
        Ok(())
    } else {
        Err(Error::validation("bad user id"))
    }
}

/// Schema check for one game event. Anything that fails here is rejected
/// before persistence and never broadcast.
pub fn validate_game_event(event: &GameEvent) -> Result<()> {
    if event.timestamp <= 0 {
        return Err(Error::validation("timestamp must be a positive integer"));
    }
    if let Some(user) = &event.user {
        require_user_id(user)?;
    }

    match &event.kind {
        EventKind::Create(p) => {
            let h = p.game.grid.len();
            if h == 0 || p.game.grid.iter().any(|row| row.is_empty()) {
                return Err(Error::validation("create carries an empty grid"));
            }
            let w = p.game.grid[0].len();
            if p.game.grid.iter().any(|row| row.len() != w) {
                return Err(Error::validation("create grid rows have unequal widths"));
            }
        }
        EventKind::UpdateCell(p) => require_user_id(&p.id)?,
        EventKind::UpdateCursor(p) => require_user_id(&p.id)?,
        EventKind::Check(p) | EventKind::Reveal(p) => {
            if p.scope.len() != 1 {
                return Err(Error::validation("scope must contain exactly one cell"));
            }
            if let Some(id) = &p.id {
                require_user_id(id)?;
            }
        }
        EventKind::Reset(_) => {}
        EventKind::SendChatMessage(p) => {
            require_user_id(&p.id)?;
            let len = p.message.chars().count();
            if len == 0 || len > MAX_CHAT_LEN {
                return Err(Error::validation("message length out of range"));
            }
        }
        EventKind::UpdateDisplayName(p) => {
            require_user_id(&p.id)?;
            if p.display_name.chars().count() > MAX_NAME_LEN {
                return Err(Error::validation("display name too long"));
            }
        }
        EventKind::UpdateTeamName(p) => {
            require_user_id(&p.id)?;
            if p.team_name.chars().count() > MAX_NAME_LEN {
                return Err(Error::validation("team name too long"));
            }
        }
        EventKind::UpdateTeamId(p) => {
            require_user_id(&p.id)?;
            if !(0..=2).contains(&p.team_id) {
                return Err(Error::validation("teamId must be 0, 1 or 2"));
            }
        }
        EventKind::RevealAllClues(_)
        | EventKind::StartGame(_)
        | EventKind::ClockStart(_)
        | EventKind::ClockPause(_)
        | EventKind::ClockReset(_)
        | EventKind::MarkSolved(_)
        | EventKind::UnmarkSolved(_) => {}
    }

    Ok(())
}

pub fn validate_room_event(event: &RoomEvent) -> Result<()> {
    if event.timestamp <= 0 {
        return Err(Error::validation("timestamp must be a positive integer"));
    }
    if let Some(user) = &event.user {
        require_user_id(user)?;
    }
    if !event.params.is_object() && !event.params.is_null() {
        return Err(Error::validation("params must be an object"));
    }
    Ok(())
}
