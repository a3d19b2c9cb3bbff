// web-server/src/store/proofs.rs
//! ErgoProof claims and the verified-address ownership table.

use chrono::{DateTime, Utc};
use common::models::ergo_proof::{ErgoProof, ProofStatus};
use common::models::from_unix;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_enum, parse_json_list, parse_uuid, to_json_list, Result, StoreError};

const PROOF_COLUMNS: &str = "verification_id, user_id, nonce, addresses, default_address, wallet_type, \
                             status, signed_message, proof, transaction_id, created_at";

fn map_proof(row: &Row<'_>) -> rusqlite::Result<ErgoProof> {
    Ok(ErgoProof {
        verification_id: parse_uuid(0, row.get(0)?)?,
        user_id: parse_uuid(1, row.get(1)?)?,
        nonce: row.get(2)?,
        addresses: parse_json_list(3, row.get(3)?)?,
        default_address: row.get(4)?,
        wallet_type: row.get(5)?,
        status: parse_enum::<ProofStatus>(6, row.get(6)?)?,
        signed_message: row.get(7)?,
        proof: row.get(8)?,
        transaction_id: row.get(9)?,
        created_at: from_unix(row.get(10)?),
    })
}

pub fn insert(conn: &Connection, proof: &ErgoProof) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO ergo_proofs ({PROOF_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        params![
            proof.verification_id.to_string(),
            proof.user_id.to_string(),
            proof.nonce,
            to_json_list(&proof.addresses)?,
            proof.default_address,
            proof.wallet_type,
            proof.status.as_str(),
            proof.signed_message,
            proof.proof,
            proof.transaction_id,
            proof.created_at.timestamp(),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, verification_id: Uuid) -> Result<Option<ErgoProof>> {
    let proof = conn
        .query_row(
            &format!("SELECT {PROOF_COLUMNS} FROM ergo_proofs WHERE verification_id = ?1"),
            params![verification_id.to_string()],
            map_proof,
        )
        .optional()?;
    Ok(proof)
}

/// Fetch a claim only if it belongs to `user_id`.
pub fn get_for_user(conn: &Connection, user_id: Uuid, verification_id: Uuid) -> Result<Option<ErgoProof>> {
    let proof = conn
        .query_row(
            &format!("SELECT {PROOF_COLUMNS} FROM ergo_proofs WHERE verification_id = ?1 AND user_id = ?2"),
            params![verification_id.to_string(), user_id.to_string()],
            map_proof,
        )
        .optional()?;
    Ok(proof)
}

pub fn list_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<ErgoProof>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROOF_COLUMNS} FROM ergo_proofs WHERE user_id = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![user_id.to_string()], map_proof)?;
    let mut proofs = Vec::new();
    for row in rows {
        proofs.push(row?);
    }
    Ok(proofs)
}

/// Move a claim from `from` to `to`. Fails with `Conflict` if the row was
/// no longer in `from`, so concurrent transitions cannot both apply.
pub fn update_status(conn: &Connection, verification_id: Uuid, from: ProofStatus, to: ProofStatus) -> Result<()> {
    let updated = conn.execute(
        "UPDATE ergo_proofs SET status = ?1 WHERE verification_id = ?2 AND status = ?3",
        params![to.as_str(), verification_id.to_string(), from.as_str()],
    )?;
    if updated == 0 {
        return Err(StoreError::Conflict(format!(
            "proof {verification_id} is not in state {from}"
        )));
    }
    Ok(())
}

pub fn set_addresses(
    conn: &Connection,
    verification_id: Uuid,
    addresses: &[String],
    default_address: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE ergo_proofs SET addresses = ?1, default_address = ?2 WHERE verification_id = ?3",
        params![to_json_list(addresses)?, default_address, verification_id.to_string()],
    )?;
    Ok(())
}

pub fn record_signature(conn: &Connection, verification_id: Uuid, signed_message: &str, proof: &str) -> Result<()> {
    conn.execute(
        "UPDATE ergo_proofs SET signed_message = ?1, proof = ?2 WHERE verification_id = ?3",
        params![signed_message, proof, verification_id.to_string()],
    )?;
    Ok(())
}

pub fn record_transaction(conn: &Connection, verification_id: Uuid, transaction_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE ergo_proofs SET transaction_id = ?1 WHERE verification_id = ?2",
        params![transaction_id, verification_id.to_string()],
    )?;
    Ok(())
}

/// Replace the claim's consumed nonce. Compare-and-swap like the user nonce.
pub fn rotate_nonce(conn: &Connection, verification_id: Uuid, expected: &str, next: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE ergo_proofs SET nonce = ?1 WHERE verification_id = ?2 AND nonce = ?3",
        params![next, verification_id.to_string(), expected],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound(format!("proof {verification_id} with matching nonce")));
    }
    Ok(())
}

pub fn delete_for_user(conn: &Connection, user_id: Uuid, verification_id: Uuid) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM ergo_proofs WHERE verification_id = ?1 AND user_id = ?2",
        params![verification_id.to_string(), user_id.to_string()],
    )?;
    Ok(deleted > 0)
}

/// Drop every unverified claim held by `user_id`.
pub fn delete_unverified_for_user(conn: &Connection, user_id: Uuid) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM ergo_proofs WHERE user_id = ?1 AND status != 'VERIFIED'",
        params![user_id.to_string()],
    )?;
    Ok(deleted)
}

/// Drop unverified claims created before `cutoff`.
pub fn delete_expired(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM ergo_proofs WHERE status != 'VERIFIED' AND created_at < ?1",
        params![cutoff.timestamp()],
    )?;
    Ok(deleted)
}

/// Current owner of a verified address: `(user_id, verification_id)`.
pub fn address_owner(conn: &Connection, address: &str) -> Result<Option<(Uuid, Uuid)>> {
    let owner = conn
        .query_row(
            "SELECT user_id, verification_id FROM verified_addresses WHERE address = ?1",
            params![address],
            |row| Ok((parse_uuid(0, row.get(0)?)?, parse_uuid(1, row.get(1)?)?)),
        )
        .optional()?;
    Ok(owner)
}

/// Addresses whose ownership row points at `verification_id`.
pub fn addresses_held_by(conn: &Connection, verification_id: Uuid) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT address FROM verified_addresses WHERE verification_id = ?1")?;
    let addresses = stmt
        .query_map(params![verification_id.to_string()], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(addresses)
}

/// Record `user_id` as the exclusive owner of `address`.
///
/// An address the user already owns keeps pointing at the claim that
/// first verified it. A claim held by anyone else is left untouched and
/// `Conflict` is returned.
pub fn claim_address(conn: &Connection, address: &str, verification_id: Uuid, user_id: Uuid) -> Result<()> {
    conn.execute(
        "INSERT INTO verified_addresses (address, verification_id, user_id) VALUES (?1, ?2, ?3)
         ON CONFLICT (address) DO NOTHING",
        params![address, verification_id.to_string(), user_id.to_string()],
    )?;
    match address_owner(conn, address)? {
        Some((owner, _)) if owner == user_id => Ok(()),
        _ => Err(StoreError::Conflict(format!("address {address} is verified by another user"))),
    }
}
