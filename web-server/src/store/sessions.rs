// web-server/src/store/sessions.rs
//! Session rows keyed by the opaque cookie token.

use chrono::{DateTime, Utc};
use common::models::from_unix;
use common::models::session::Session;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_uuid, Result};

const SESSION_COLUMNS: &str = "id, session_token, user_id, wallet_type, expires, created_at";

fn map_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: parse_uuid(0, row.get(0)?)?,
        session_token: row.get(1)?,
        user_id: parse_uuid(2, row.get(2)?)?,
        wallet_type: row.get(3)?,
        expires: from_unix(row.get(4)?),
        created_at: from_unix(row.get(5)?),
    })
}

pub fn insert(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, session_token, user_id, wallet_type, expires, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session.id.to_string(),
            session.session_token,
            session.user_id.to_string(),
            session.wallet_type,
            session.expires.timestamp(),
            session.created_at.timestamp(),
        ],
    )?;
    Ok(())
}

pub fn get_by_token(conn: &Connection, token: &str) -> Result<Option<Session>> {
    let session = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_token = ?1"),
            params![token],
            map_session,
        )
        .optional()?;
    Ok(session)
}

pub fn delete_by_token(conn: &Connection, token: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM sessions WHERE session_token = ?1", params![token])?;
    Ok(deleted > 0)
}

pub fn list_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![user_id.to_string()], map_session)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}

/// Delete one of `user_id`'s sessions by its public id.
pub fn delete_for_user(conn: &Connection, user_id: Uuid, id: Uuid) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
    )?;
    Ok(deleted > 0)
}

pub fn delete_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM sessions WHERE expires <= ?1", params![now.timestamp()])?;
    Ok(deleted)
}
