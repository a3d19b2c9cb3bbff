// web-server/src/store/wallets.rs
//! Wallets attached to a user.

use chrono::{DateTime, Utc};
use common::models::from_unix;
use common::models::wallet::{Wallet, WalletMetadata};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{parse_json_list, parse_uuid, to_json_list, Result};

fn map_wallet(row: &Row<'_>) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        id: row.get(0)?,
        user_id: parse_uuid(1, row.get(1)?)?,
        wallet_type: row.get(2)?,
        reward_address: row.get(3)?,
        change_address: row.get(4)?,
        used_addresses: parse_json_list(5, row.get(5)?)?,
        unused_addresses: parse_json_list(6, row.get(6)?)?,
        created_at: from_unix(row.get(7)?),
    })
}

/// Insert a wallet row. Returns its id.
pub fn insert(conn: &Connection, user_id: Uuid, wallet: &WalletMetadata, now: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        "INSERT INTO wallets
             (user_id, type, reward_address, change_address, used_addresses, unused_addresses, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user_id.to_string(),
            wallet.wallet_type,
            wallet.reward_address,
            wallet.change_address,
            to_json_list(&wallet.used_addresses)?,
            to_json_list(&wallet.unused_addresses)?,
            now.timestamp(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<Wallet>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, type, reward_address, change_address, used_addresses, unused_addresses, created_at
         FROM wallets WHERE user_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![user_id.to_string()], map_wallet)?;
    let mut wallets = Vec::new();
    for row in rows {
        wallets.push(row?);
    }
    Ok(wallets)
}
