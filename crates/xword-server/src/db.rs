use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use xword_core::Error;
use xword_core::event::{CreateParams, EventKind, GameEvent, RoomEvent};
use xword_core::puzzle::{PuzzleDef, build_initial_state};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn iso_from_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn store_err(e: sqlx::Error) -> Error {
    tracing::error!(error = %e, "event store failure");
    Error::internal("event store failure")
}

// ── Migrations ──────────────────────────────────────────────────────────

struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_game_events.sql",
        sql: include_str!("../migrations/0001_game_events.sql"),
    },
    Migration {
        name: "0002_room_events.sql",
        sql: include_str!("../migrations/0002_room_events.sql"),
    },
];

fn checksum(sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Apply missing migrations in lexicographic order, one transaction each.
/// A checksum mismatch on an already-applied migration is only a warning:
/// the file was edited after the fact, the schema itself is in place.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL,
            checksum TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    for m in MIGRATIONS {
        let sum = checksum(m.sql);
        let applied = sqlx::query("SELECT checksum FROM schema_migrations WHERE name = ?1")
            .bind(m.name)
            .fetch_optional(pool)
            .await?;

        if let Some(row) = applied {
            let recorded: String = row.get("checksum");
            if recorded != sum {
                warn!(migration = m.name, "migration checksum mismatch");
            }
            continue;
        }

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(m.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (name, applied_at, checksum) VALUES (?1, ?2, ?3)")
            .bind(m.name)
            .bind(iso_from_ms(now_ms()))
            .bind(&sum)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(migration = m.name, "applied migration");
    }

    Ok(())
}

// ── Game events ─────────────────────────────────────────────────────────

pub async fn append_game_event(pool: &SqlitePool, gid: &str, event: &GameEvent) -> Result<(), Error> {
    let payload = serde_json::to_string(event).map_err(|e| Error::internal(e.to_string()))?;
    sqlx::query(
        "INSERT INTO game_events (gid, user, ts_ms, ts_iso, event_type, event_payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(gid)
    .bind(&event.user)
    .bind(event.timestamp)
    .bind(iso_from_ms(event.timestamp))
    .bind(event.kind.type_name())
    .bind(&payload)
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(())
}

fn parse_game_rows(rows: Vec<sqlx::sqlite::SqliteRow>, gid: &str) -> Vec<GameEvent> {
    rows.into_iter()
        .filter_map(|row| {
            let payload: String = row.get("event_payload");
            match serde_json::from_str(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(gid, error = %e, "skipping unparsable stored event");
                    None
                }
            }
        })
        .collect()
}

/// Events for a game in `(timestamp ASC, insertion ASC)` order, plus the
/// total count. Without pagination the whole log is returned.
pub async fn get_game_events(
    pool: &SqlitePool,
    gid: &str,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<(Vec<GameEvent>, u64), Error> {
    let total = count_game_events(pool, gid).await?;

    let rows = match (limit, offset) {
        (None, None) => {
            sqlx::query(
                "SELECT event_payload FROM game_events WHERE gid = ?1 ORDER BY ts_ms ASC, id ASC",
            )
            .bind(gid)
            .fetch_all(pool)
            .await
        }
        _ => {
            sqlx::query(
                "SELECT event_payload FROM game_events WHERE gid = ?1
                 ORDER BY ts_ms ASC, id ASC LIMIT ?2 OFFSET ?3",
            )
            .bind(gid)
            .bind(limit.map(i64::from).unwrap_or(-1))
            .bind(offset.map(i64::from).unwrap_or(0))
            .fetch_all(pool)
            .await
        }
    }
    .map_err(store_err)?;

    Ok((parse_game_rows(rows, gid), total))
}

/// The last `limit` events of a log, in ascending order.
pub async fn get_recent_game_events(
    pool: &SqlitePool,
    gid: &str,
    limit: u32,
) -> Result<(Vec<GameEvent>, u64), Error> {
    let total = count_game_events(pool, gid).await?;
    let offset = total.saturating_sub(u64::from(limit));
    let (events, _) = get_game_events(pool, gid, Some(limit), Some(offset as u32)).await?;
    Ok((events, total))
}

pub async fn count_game_events(pool: &SqlitePool, gid: &str) -> Result<u64, Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM game_events WHERE gid = ?1")
        .bind(gid)
        .fetch_one(pool)
        .await
        .map_err(store_err)?;
    Ok(row.get::<i64, _>("n") as u64)
}

pub async fn game_exists(pool: &SqlitePool, gid: &str) -> Result<bool, Error> {
    Ok(count_game_events(pool, gid).await? > 0)
}

async fn create_rows(pool: &SqlitePool, gid: &str) -> Result<Vec<GameEvent>, Error> {
    let rows = sqlx::query(
        "SELECT event_payload FROM game_events
         WHERE gid = ?1 AND event_type = 'create' ORDER BY ts_ms ASC, id ASC",
    )
    .bind(gid)
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    Ok(parse_game_rows(rows, gid))
}

/// Info record from the game's single create event. Zero or multiple create
/// events yield an empty record rather than an error.
pub async fn get_game_info(pool: &SqlitePool, gid: &str) -> Result<Value, Error> {
    let creates = create_rows(pool, gid).await?;
    if creates.len() == 1 {
        if let EventKind::Create(params) = &creates[0].kind {
            return Ok(params.game.info.clone());
        }
    }
    Ok(Value::Object(Default::default()))
}

pub async fn get_game_creator(pool: &SqlitePool, gid: &str) -> Result<Option<String>, Error> {
    let row = sqlx::query(
        "SELECT user FROM game_events
         WHERE gid = ?1 AND event_type = 'create' ORDER BY ts_ms ASC, id ASC LIMIT 1",
    )
    .bind(gid)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;
    Ok(row.and_then(|r| r.get::<Option<String>, _>("user")))
}

pub async fn has_create(pool: &SqlitePool, gid: &str) -> Result<bool, Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM game_events WHERE gid = ?1 AND event_type = 'create'")
        .bind(gid)
        .fetch_one(pool)
        .await
        .map_err(store_err)?;
    Ok(row.get::<i64, _>("n") > 0)
}

/// Build and append the create event that snapshots `puzzle` into a new log.
pub async fn create_initial_event(
    pool: &SqlitePool,
    gid: &str,
    pid: Option<String>,
    user_id: &str,
    puzzle: &PuzzleDef,
) -> Result<GameEvent, Error> {
    if has_create(pool, gid).await? {
        return Err(Error::Conflict(format!("game {gid} already exists")));
    }
    let game = build_initial_state(puzzle).map_err(|e| Error::validation(e.to_string()))?;
    let event = GameEvent {
        timestamp: now_ms(),
        user: Some(user_id.to_string()),
        game_timestamp: None,
        kind: EventKind::Create(CreateParams {
            pid,
            version: Some(1),
            game,
        }),
    };
    append_game_event(pool, gid, &event).await?;
    Ok(event)
}

// ── Room events ─────────────────────────────────────────────────────────

pub async fn append_room_event(pool: &SqlitePool, rid: &str, event: &RoomEvent) -> Result<(), Error> {
    let payload = serde_json::to_string(event).map_err(|e| Error::internal(e.to_string()))?;
    sqlx::query(
        "INSERT INTO room_events (rid, user, ts_ms, ts_iso, event_type, event_payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(rid)
    .bind(&event.user)
    .bind(event.timestamp)
    .bind(iso_from_ms(event.timestamp))
    .bind(event.kind.type_name())
    .bind(&payload)
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(())
}

pub async fn get_room_events(
    pool: &SqlitePool,
    rid: &str,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<(Vec<RoomEvent>, u64), Error> {
    let total = {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM room_events WHERE rid = ?1")
            .bind(rid)
            .fetch_one(pool)
            .await
            .map_err(store_err)?;
        row.get::<i64, _>("n") as u64
    };

    let rows = sqlx::query(
        "SELECT event_payload FROM room_events WHERE rid = ?1
         ORDER BY ts_ms ASC, id ASC LIMIT ?2 OFFSET ?3",
    )
    .bind(rid)
    .bind(limit.map(i64::from).unwrap_or(-1))
    .bind(offset.map(i64::from).unwrap_or(0))
    .fetch_all(pool)
    .await
    .map_err(store_err)?;

    let events = rows
        .into_iter()
        .filter_map(|row| {
            let payload: String = row.get("event_payload");
            match serde_json::from_str(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(rid, error = %e, "skipping unparsable stored room event");
                    None
                }
            }
        })
        .collect();

    Ok((events, total))
}

/// Rooms have no create event; the creator is whoever wrote the log's first
/// event.
pub async fn get_room_creator(pool: &SqlitePool, rid: &str) -> Result<Option<String>, Error> {
    let row = sqlx::query(
        "SELECT user FROM room_events WHERE rid = ?1 ORDER BY ts_ms ASC, id ASC LIMIT 1",
    )
    .bind(rid)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;
    Ok(row.and_then(|r| r.get::<Option<String>, _>("user")))
}

pub async fn room_exists(pool: &SqlitePool, rid: &str) -> Result<bool, Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM room_events WHERE rid = ?1")
        .bind(rid)
        .fetch_one(pool)
        .await
        .map_err(store_err)?;
    Ok(row.get::<i64, _>("n") > 0)
}
