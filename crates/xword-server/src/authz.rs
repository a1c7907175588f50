use sqlx::SqlitePool;

use xword_core::Error;
use xword_core::validation::valid_user_id;

use crate::db;

/// How an authorized user relates to a game or room. Every existing game is
/// collaborative, so any authenticated user is at least a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Owner,
    Participant,
}

pub async fn authorize_game(
    pool: &SqlitePool,
    user_id: &str,
    game_id: &str,
) -> Result<Access, Error> {
    if !valid_user_id(user_id) {
        return Err(Error::validation("bad user id"));
    }
    // Store failures surface as Internal and deny access (fail closed).
    match db::get_game_creator(pool, game_id).await? {
        Some(creator) if creator == user_id => Ok(Access::Owner),
        Some(_) => Ok(Access::Participant),
        None => {
            // Legacy logs may predate creator stamping.
            if db::game_exists(pool, game_id).await? {
                Ok(Access::Participant)
            } else {
                Err(Error::NotFound(format!("game {game_id}")))
            }
        }
    }
}

pub async fn authorize_room(
    pool: &SqlitePool,
    user_id: &str,
    room_id: &str,
) -> Result<Access, Error> {
    if !valid_user_id(user_id) {
        return Err(Error::validation("bad user id"));
    }
    match db::get_room_creator(pool, room_id).await? {
        Some(creator) if creator == user_id => Ok(Access::Owner),
        Some(_) => Ok(Access::Participant),
        None => {
            if db::room_exists(pool, room_id).await? {
                Ok(Access::Participant)
            } else {
                Err(Error::NotFound(format!("room {room_id}")))
            }
        }
    }
}
