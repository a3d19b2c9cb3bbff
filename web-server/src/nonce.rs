// web-server/src/nonce.rs
//! Sign-in challenges.
//!
//! Each user row carries at most one live nonce. A nonce is issued when a
//! client asks for a challenge and replaced atomically once a signature
//! over it has been accepted, so no signature verifies twice.

use chrono::{DateTime, Duration, Utc};
use common::messages::NonceResponse;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::store::{self, proofs, users, StoreError};
use crate::utils::token::generate_nonce;

/// Hand out a challenge.
///
/// A returning wallet (known active `reward_address`) gets the nonce already
/// stored on its user, or a fresh one if that column is empty. Anyone else
/// gets a new pending user reserved around a fresh nonce. Reissuing to a
/// returning wallet never rotates its nonce, so an unauthenticated caller
/// cannot invalidate a challenge someone else is about to sign.
///
/// Pending users older than `pending_ttl_seconds` are swept first.
pub fn issue(
    conn: &mut Connection,
    reward_address: Option<&str>,
    now: DateTime<Utc>,
    pending_ttl_seconds: i64,
) -> store::Result<NonceResponse> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let swept = users::delete_stale_pending(&tx, now - Duration::seconds(pending_ttl_seconds))?;
    if swept > 0 {
        tracing::debug!("Swept {} stale pending users", swept);
    }

    let returning = match reward_address.map(str::trim).filter(|a| !a.is_empty()) {
        Some(address) => users::find_active_by_reward_address(&tx, address)?,
        None => None,
    };

    let response = match returning {
        Some(user) => {
            let nonce = match user.nonce {
                Some(nonce) => nonce,
                None => {
                    let fresh = generate_nonce();
                    users::set_nonce_if_absent(&tx, user.id, &fresh)?;
                    users::get(&tx, user.id)?
                        .and_then(|u| u.nonce)
                        .ok_or_else(|| StoreError::NotFound(format!("nonce for user {}", user.id)))?
                }
            };
            tracing::debug!("Reissued challenge to returning user {}", user.id);
            NonceResponse { user_id: user.id, nonce }
        }
        None => {
            let user_id = Uuid::new_v4();
            let nonce = generate_nonce();
            users::insert_pending(&tx, user_id, &nonce, now)?;
            tracing::debug!("Reserved pending user {}", user_id);
            NonceResponse { user_id, nonce }
        }
    };

    tx.commit()?;
    Ok(response)
}

/// Replace the user's consumed nonce. Fails with `NotFound` if `consumed`
/// is no longer current.
pub fn rotate(conn: &Connection, user_id: Uuid, consumed: &str) -> store::Result<String> {
    let next = generate_nonce();
    users::rotate_nonce(conn, user_id, consumed, &next)?;
    Ok(next)
}

/// Replace an ErgoProof's consumed nonce.
pub fn rotate_proof(conn: &Connection, verification_id: Uuid, consumed: &str) -> store::Result<String> {
    let next = generate_nonce();
    proofs::rotate_nonce(conn, verification_id, consumed, &next)?;
    Ok(next)
}
