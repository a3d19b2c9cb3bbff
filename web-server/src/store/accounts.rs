// web-server/src/store/accounts.rs
//! Linked sign-in accounts. Wallet sign-ins are recorded under the
//! `credentials` provider keyed by the user id.

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::Result;

pub const CREDENTIALS_PROVIDER: &str = "credentials";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub user_id: Uuid,
    pub account_type: String,
    pub provider: String,
    pub provider_account_id: String,
}

/// Link a credentials account to `user_id`.
pub fn insert_credentials(conn: &Connection, user_id: Uuid) -> Result<i64> {
    conn.execute(
        "INSERT INTO accounts (user_id, type, provider, provider_account_id) VALUES (?1, ?2, ?2, ?1)",
        params![user_id.to_string(), CREDENTIALS_PROVIDER],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(
        "SELECT id, type, provider, provider_account_id FROM accounts WHERE user_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        Ok(Account {
            id: row.get(0)?,
            user_id,
            account_type: row.get(1)?,
            provider: row.get(2)?,
            provider_account_id: row.get(3)?,
        })
    })?;
    let mut accounts = Vec::new();
    for row in rows {
        accounts.push(row?);
    }
    Ok(accounts)
}
