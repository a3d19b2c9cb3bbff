// web-server/src/store/users.rs
//! User rows and their nonce column.

use chrono::{DateTime, Utc};
use common::models::from_unix;
use common::models::user::{User, UserStatus};
use common::models::wallet::WalletMetadata;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_enum, parse_uuid, Result, StoreError};

const USER_COLUMNS: &str =
    "u.id, u.nonce, u.default_address, u.reward_address, u.wallet_type, u.status, u.created_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(0, row.get(0)?)?,
        nonce: row.get(1)?,
        default_address: row.get(2)?,
        reward_address: row.get(3)?,
        wallet_type: row.get(4)?,
        status: parse_enum::<UserStatus>(5, row.get(5)?)?,
        created_at: from_unix(row.get(6)?),
    })
}

/// Reserve a pending user holding `nonce`.
pub fn insert_pending(conn: &Connection, id: Uuid, nonce: &str, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, nonce, status, created_at) VALUES (?1, ?2, 'pending', ?3)",
        params![id.to_string(), nonce, now.timestamp()],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
            params![id.to_string()],
            map_user,
        )
        .optional()?;
    Ok(user)
}

/// Find the active user whose wallet carries `reward_address`.
pub fn find_active_by_reward_address(conn: &Connection, reward_address: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!(
                "SELECT {USER_COLUMNS} FROM users u
                 JOIN wallets w ON w.user_id = u.id
                 WHERE w.reward_address = ?1 AND u.status = 'active'
                 ORDER BY w.id ASC LIMIT 1"
            ),
            params![reward_address],
            map_user,
        )
        .optional()?;
    Ok(user)
}

/// Set a nonce only where none is present. Returns whether a row changed.
pub fn set_nonce_if_absent(conn: &Connection, id: Uuid, nonce: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE users SET nonce = ?1 WHERE id = ?2 AND nonce IS NULL",
        params![nonce, id.to_string()],
    )?;
    Ok(updated > 0)
}

/// Replace the consumed nonce with `next`.
///
/// Compare-and-swap on the expected value: if another request already
/// consumed `expected`, or the row is gone, nothing changes and `NotFound`
/// is returned.
pub fn rotate_nonce(conn: &Connection, id: Uuid, expected: &str, next: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE users SET nonce = ?1 WHERE id = ?2 AND nonce = ?3",
        params![next, id.to_string(), expected],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound(format!("user {id} with matching nonce")));
    }
    Ok(())
}

/// Populate the canonical wallet fields and promote the user to active.
pub fn activate(conn: &Connection, id: Uuid, wallet: &WalletMetadata) -> Result<()> {
    let updated = conn.execute(
        "UPDATE users
         SET default_address = ?1, reward_address = ?2, wallet_type = ?3, status = 'active'
         WHERE id = ?4",
        params![
            wallet.display_address(),
            wallet.reward_address,
            wallet.wallet_type,
            id.to_string(),
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound(format!("user {id}")));
    }
    Ok(())
}

/// Delete a user; wallets, accounts, sessions and proofs cascade.
pub fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
    Ok(deleted > 0)
}

/// Delete `id` only while it is still pending with no wallet bound.
pub fn delete_if_pending(conn: &Connection, id: Uuid) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM users
         WHERE id = ?1 AND status = 'pending'
           AND NOT EXISTS (SELECT 1 FROM wallets w WHERE w.user_id = users.id)",
        params![id.to_string()],
    )?;
    Ok(deleted > 0)
}

/// Purge pending users reserved before `cutoff` that never bound a wallet.
pub fn delete_stale_pending(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM users
         WHERE status = 'pending' AND created_at < ?1
           AND NOT EXISTS (SELECT 1 FROM wallets w WHERE w.user_id = users.id)",
        params![cutoff.timestamp()],
    )?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{wallets, Store};
    use chrono::Duration;

    fn wallet(reward: &str) -> WalletMetadata {
        WalletMetadata {
            wallet_type: "nami".to_string(),
            reward_address: reward.to_string(),
            change_address: Some("addr_change".to_string()),
            used_addresses: vec![],
            unused_addresses: vec![],
        }
    }

    #[test]
    fn test_pending_user_round_trip() {
        let store = Store::open_memory().unwrap();
        let id = Uuid::new_v4();
        store
            .with_conn(|conn| {
                insert_pending(conn, id, "n1", Utc::now())?;
                let user = get(conn, id)?.expect("user");
                assert_eq!(user.nonce.as_deref(), Some("n1"));
                assert_eq!(user.status, UserStatus::Pending);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_rotate_nonce_is_compare_and_swap() {
        let store = Store::open_memory().unwrap();
        let id = Uuid::new_v4();
        store
            .with_conn(|conn| {
                insert_pending(conn, id, "n1", Utc::now())?;
                rotate_nonce(conn, id, "n1", "n2")?;
                // The consumed value cannot be rotated a second time
                assert!(matches!(rotate_nonce(conn, id, "n1", "n3"), Err(StoreError::NotFound(_))));
                assert_eq!(get(conn, id)?.unwrap().nonce.as_deref(), Some("n2"));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_rotate_nonce_on_missing_user_fails() {
        let store = Store::open_memory().unwrap();
        let result = store.with_conn(|conn| rotate_nonce(conn, Uuid::new_v4(), "a", "b"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_activate_and_find_by_reward_address() {
        let store = Store::open_memory().unwrap();
        let id = Uuid::new_v4();
        store
            .with_conn(|conn| {
                insert_pending(conn, id, "n1", Utc::now())?;
                assert!(find_active_by_reward_address(conn, "stake_x")?.is_none());
                activate(conn, id, &wallet("stake_x"))?;
                wallets::insert(conn, id, &wallet("stake_x"), Utc::now())?;
                let found = find_active_by_reward_address(conn, "stake_x")?.expect("found");
                assert_eq!(found.id, id);
                assert_eq!(found.default_address.as_deref(), Some("addr_change"));
                assert!(found.is_active());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_delete_stale_pending_spares_recent_and_bound_users() {
        let store = Store::open_memory().unwrap();
        let now = Utc::now();
        let stale = Uuid::new_v4();
        let recent = Uuid::new_v4();
        let bound = Uuid::new_v4();
        store
            .with_conn(|conn| {
                insert_pending(conn, stale, "a", now - Duration::hours(3))?;
                insert_pending(conn, recent, "b", now)?;
                insert_pending(conn, bound, "c", now - Duration::hours(3))?;
                wallets::insert(conn, bound, &wallet("stake_b"), now)?;

                let removed = delete_stale_pending(conn, now - Duration::hours(1))?;
                assert_eq!(removed, 1);
                assert!(get(conn, stale)?.is_none());
                assert!(get(conn, recent)?.is_some());
                assert!(get(conn, bound)?.is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_delete_if_pending_spares_active_users() {
        let store = Store::open_memory().unwrap();
        let pending = Uuid::new_v4();
        let active = Uuid::new_v4();
        store
            .with_conn(|conn| {
                insert_pending(conn, pending, "a", Utc::now())?;
                insert_pending(conn, active, "b", Utc::now())?;
                activate(conn, active, &wallet("stake_a"))?;
                assert!(delete_if_pending(conn, pending)?);
                assert!(!delete_if_pending(conn, active)?);
                assert!(get(conn, active)?.is_some());
                Ok(())
            })
            .unwrap();
    }
}
