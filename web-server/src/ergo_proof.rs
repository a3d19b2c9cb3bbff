// web-server/src/ergo_proof.rs
//! Secondary address ownership claims.
//!
//! A signed-in user proves control of further Ergo addresses either by
//! signing a nonce (dApp connector) or by sending a transaction to itself
//! (ErgoPay). Claims move `Initiated -> Pending -> Signed -> Verified`, one
//! step at a time, and a verified address belongs to exactly one user.
//!
//! Unverified claims expire after the configured TTL: they are swept at
//! the start of every init and treated as absent when touched after expiry.

use chrono::{DateTime, Duration, Utc};
use common::messages::{PollStatus, SignaturePayload, VerifyProofRequest};
use common::models::ergo_proof::{ErgoProof, ProofStatus};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::error::AuthError;
use crate::nonce;
use crate::store::{proofs, StoreError};
use crate::utils::token::generate_nonce;
use crate::verifier::{self, SignatureScheme};

/// Result of `init_verification`
#[derive(Debug, Clone)]
pub enum InitOutcome {
    /// A fresh claim waiting for a signature
    Created(ErgoProof),
    /// The caller already owns the address; nothing new was written
    AlreadyVerified(ErgoProof),
}

impl InitOutcome {
    pub fn proof(&self) -> &ErgoProof {
        match self {
            InitOutcome::Created(p) | InitOutcome::AlreadyVerified(p) => p,
        }
    }
}

/// Drop unverified claims older than `ttl_seconds`.
pub fn delete_expired_proofs(conn: &Connection, now: DateTime<Utc>, ttl_seconds: i64) -> Result<usize, AuthError> {
    let removed = proofs::delete_expired(conn, now - Duration::seconds(ttl_seconds))?;
    if removed > 0 {
        tracing::debug!("Expired {} unverified proofs", removed);
    }
    Ok(removed)
}

/// Start a dApp-connector claim on `default_address`.
///
/// Re-initiating for an address the caller already owns returns the
/// existing verified claim. Any unverified claims the caller still holds
/// are discarded.
pub fn init_verification(
    conn: &mut Connection,
    user_id: Uuid,
    wallet_type: &str,
    default_address: &str,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<InitOutcome, AuthError> {
    let default_address = default_address.trim();
    if default_address.is_empty() {
        return Err(AuthError::InvalidTransition("an address is required".to_string()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    delete_expired_proofs(&tx, now, ttl_seconds)?;

    if let Some((owner, verification_id)) = proofs::address_owner(&tx, default_address)? {
        if owner != user_id {
            return Err(AuthError::AddressClaimed);
        }
        let existing = proofs::get(&tx, verification_id)?.ok_or(AuthError::NotFound("proof"))?;
        tx.commit()?;
        tracing::debug!("Address already verified by user {} in {}", user_id, verification_id);
        return Ok(InitOutcome::AlreadyVerified(existing));
    }

    proofs::delete_unverified_for_user(&tx, user_id)?;
    let proof = ErgoProof {
        verification_id: Uuid::new_v4(),
        user_id,
        nonce: generate_nonce(),
        addresses: vec![default_address.to_string()],
        default_address: Some(default_address.to_string()),
        wallet_type: Some(wallet_type.to_string()),
        status: ProofStatus::Pending,
        signed_message: None,
        proof: None,
        transaction_id: None,
        created_at: now,
    };
    proofs::insert(&tx, &proof)?;
    tx.commit()?;

    tracing::info!("User {} started verification {}", user_id, proof.verification_id);
    Ok(InitOutcome::Created(proof))
}

/// Start an ErgoPay claim. The address arrives later from the wallet.
pub fn init_verification_ergopay(
    conn: &mut Connection,
    user_id: Uuid,
    wallet_type: Option<&str>,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<ErgoProof, AuthError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    delete_expired_proofs(&tx, now, ttl_seconds)?;
    proofs::delete_unverified_for_user(&tx, user_id)?;

    let proof = ErgoProof {
        verification_id: Uuid::new_v4(),
        user_id,
        nonce: generate_nonce(),
        addresses: Vec::new(),
        default_address: None,
        wallet_type: Some(wallet_type.unwrap_or("ergopay").to_string()),
        status: ProofStatus::Initiated,
        signed_message: None,
        proof: None,
        transaction_id: None,
        created_at: now,
    };
    proofs::insert(&tx, &proof)?;
    tx.commit()?;

    tracing::info!("User {} started ErgoPay verification {}", user_id, proof.verification_id);
    Ok(proof)
}

/// Record the address an ErgoPay wallet reported and move to `Pending`.
pub fn report_ergopay_address(
    conn: &mut Connection,
    verification_id: Uuid,
    address: &str,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<ErgoProof, AuthError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AuthError::InvalidTransition("an address is required".to_string()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let proof = live_proof(&tx, proofs::get(&tx, verification_id)?, now, ttl_seconds)?;
    if proof.status != ProofStatus::Initiated {
        return Err(AuthError::InvalidTransition(format!(
            "address already reported, claim is {}",
            proof.status
        )));
    }
    if let Some((owner, _)) = proofs::address_owner(&tx, address)? {
        if owner != proof.user_id {
            return Err(AuthError::AddressClaimed);
        }
    }

    proofs::set_addresses(&tx, verification_id, &[address.to_string()], address)?;
    advance(&tx, verification_id, ProofStatus::Initiated, ProofStatus::Pending)?;
    let updated = proofs::get(&tx, verification_id)?.ok_or(AuthError::NotFound("proof"))?;
    tx.commit()?;
    Ok(updated)
}

/// Check a sigma-protocol signature for the claim and mark it verified.
///
/// The signed address must be part of the submitted address set. On
/// success the claim moves to `Verified`, every address in the set is
/// claimed for the caller, and the claim's nonce is rotated, all in one
/// transaction. A bad signature changes nothing.
///
/// Only the signing address is proven. The other addresses are taken on
/// the wallet's word, so a caller can claim an address it does not
/// control and keep other users from verifying it.
pub fn verify_proof(
    conn: &mut Connection,
    user_id: Uuid,
    request: &VerifyProofRequest,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<ErgoProof, AuthError> {
    let mut addresses: Vec<String> = Vec::new();
    for address in request.addresses.iter().chain(std::iter::once(&request.address)) {
        let address = address.trim();
        if !address.is_empty() && !addresses.iter().any(|a| a == address) {
            addresses.push(address.to_string());
        }
    }
    let signing_address = request.address.trim();
    if signing_address.is_empty() {
        return Err(AuthError::VerificationFailed);
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let proof = live_proof(
        &tx,
        proofs::get_for_user(&tx, user_id, request.verification_id)?,
        now,
        ttl_seconds,
    )?;
    if !proof.status.accepts_evidence() {
        return Err(AuthError::InvalidTransition(format!("claim is {}", proof.status)));
    }

    let payload = SignaturePayload::Sigma {
        signed_message: request.signed_message.clone(),
        proof: request.proof.clone(),
    };
    if !verifier::verify(proof.nonce.as_bytes(), signing_address, &payload, SignatureScheme::Sigma) {
        tracing::warn!("Proof signature rejected for {}", proof.verification_id);
        return Err(AuthError::VerificationFailed);
    }

    proofs::record_signature(&tx, proof.verification_id, &request.signed_message, &request.proof)?;
    proofs::set_addresses(&tx, proof.verification_id, &addresses, signing_address)?;
    finalize(&tx, &proof, &addresses)?;
    let verified = proofs::get(&tx, proof.verification_id)?.ok_or(AuthError::NotFound("proof"))?;
    tx.commit()?;

    tracing::info!(
        "User {} verified {} addresses via {}",
        user_id,
        addresses.len(),
        proof.verification_id
    );
    Ok(verified)
}

/// The caller's claim, if it is still live.
pub fn check_proof_status(
    conn: &Connection,
    user_id: Uuid,
    verification_id: Uuid,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<ErgoProof, AuthError> {
    live_proof(conn, proofs::get_for_user(conn, user_id, verification_id)?, now, ttl_seconds)
}

/// Claim that a transaction poll may act on
pub fn pollable_proof(
    conn: &Connection,
    user_id: Uuid,
    verification_id: Uuid,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<ErgoProof, AuthError> {
    let proof = check_proof_status(conn, user_id, verification_id, now, ttl_seconds)?;
    if proof.status == ProofStatus::Initiated {
        return Err(AuthError::InvalidTransition("no address reported yet".to_string()));
    }
    Ok(proof)
}

/// Apply one oracle reading for `transaction_id`.
///
/// Zero or more confirmations finishes the claim the same way a valid
/// signature does. A negative count only records that evidence was
/// submitted.
pub fn record_confirmation(
    conn: &mut Connection,
    user_id: Uuid,
    verification_id: Uuid,
    transaction_id: &str,
    num_confirmations: i64,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<(ErgoProof, PollStatus), AuthError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let proof = live_proof(&tx, proofs::get_for_user(&tx, user_id, verification_id)?, now, ttl_seconds)?;

    if proof.status == ProofStatus::Verified {
        tx.commit()?;
        return Ok((proof, PollStatus::Verified));
    }
    if !proof.status.accepts_evidence() {
        return Err(AuthError::InvalidTransition(format!("claim is {}", proof.status)));
    }

    proofs::record_transaction(&tx, verification_id, transaction_id)?;
    let status = if num_confirmations >= 0 {
        let addresses = claimable_addresses(&proof);
        finalize(&tx, &proof, &addresses)?;
        PollStatus::Verified
    } else {
        if proof.status == ProofStatus::Pending {
            advance(&tx, verification_id, ProofStatus::Pending, ProofStatus::Signed)?;
        }
        PollStatus::Pending
    };
    let updated = proofs::get(&tx, verification_id)?.ok_or(AuthError::NotFound("proof"))?;
    tx.commit()?;

    tracing::debug!(
        "Transaction {} for {} has {} confirmations",
        transaction_id,
        verification_id,
        num_confirmations
    );
    Ok((updated, status))
}

/// Live claims owned by `user_id`.
pub fn get_proofs_for_user(
    conn: &Connection,
    user_id: Uuid,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<Vec<ErgoProof>, AuthError> {
    Ok(proofs::list_for_user(conn, user_id)?
        .into_iter()
        .filter(|p| !p.is_expired(now, ttl_seconds))
        .collect())
}

/// Delete one of the caller's claims.
///
/// Addresses it owned move to another of the caller's verified claims that
/// still lists them; the rest are released.
pub fn delete_item(conn: &mut Connection, user_id: Uuid, verification_id: Uuid) -> Result<(), AuthError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let held = proofs::addresses_held_by(&tx, verification_id)?;
    if !proofs::delete_for_user(&tx, user_id, verification_id)? {
        return Err(AuthError::NotFound("proof"));
    }

    let remaining: Vec<ErgoProof> = proofs::list_for_user(&tx, user_id)?
        .into_iter()
        .filter(|p| p.status == ProofStatus::Verified)
        .collect();
    let mut released = 0;
    for address in &held {
        match remaining.iter().find(|p| claimable_addresses(p).contains(address)) {
            Some(other) => proofs::claim_address(&tx, address, other.verification_id, user_id)?,
            None => released += 1,
        }
    }
    tx.commit()?;

    tracing::info!(
        "User {} deleted proof {}, released {} of {} addresses",
        user_id,
        verification_id,
        released,
        held.len()
    );
    Ok(())
}

/// Drive the claim to `Verified`, claim `addresses` and burn its nonce.
fn finalize(conn: &Connection, proof: &ErgoProof, addresses: &[String]) -> Result<(), AuthError> {
    if proof.status == ProofStatus::Pending {
        advance(conn, proof.verification_id, ProofStatus::Pending, ProofStatus::Signed)?;
    }
    advance(conn, proof.verification_id, ProofStatus::Signed, ProofStatus::Verified)?;

    for address in addresses {
        proofs::claim_address(conn, address, proof.verification_id, proof.user_id).map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::AddressClaimed,
            other => other.into(),
        })?;
    }

    nonce::rotate_proof(conn, proof.verification_id, &proof.nonce).map_err(|e| match e {
        StoreError::NotFound(_) => AuthError::InvalidTransition("claim changed concurrently".to_string()),
        other => other.into(),
    })?;
    Ok(())
}

fn advance(conn: &Connection, verification_id: Uuid, from: ProofStatus, to: ProofStatus) -> Result<(), AuthError> {
    if !from.can_transition_to(to) {
        return Err(AuthError::InvalidTransition(format!("{} cannot follow {}", to, from)));
    }
    proofs::update_status(conn, verification_id, from, to).map_err(|e| match e {
        StoreError::Conflict(msg) => AuthError::InvalidTransition(msg),
        other => other.into(),
    })
}

fn claimable_addresses(proof: &ErgoProof) -> Vec<String> {
    let mut addresses = proof.addresses.clone();
    if let Some(default) = &proof.default_address {
        if !addresses.contains(default) {
            addresses.push(default.clone());
        }
    }
    addresses
}

/// Reject absent claims and lazily delete expired ones
fn live_proof(
    conn: &Connection,
    proof: Option<ErgoProof>,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<ErgoProof, AuthError> {
    let proof = proof.ok_or(AuthError::NotFound("proof"))?;
    if proof.is_expired(now, ttl_seconds) {
        proofs::delete_for_user(conn, proof.user_id, proof.verification_id)?;
        tracing::debug!("Proof {} expired", proof.verification_id);
        return Err(AuthError::NotFound("proof"));
    }
    Ok(proof)
}
