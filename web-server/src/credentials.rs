// web-server/src/credentials.rs
//! Wallet sign-in.
//!
//! A client that holds a nonce from `nonce::issue` signs it with its wallet
//! and posts the result here. A first-time user has its wallet, account,
//! rotated nonce and session written in one transaction; any failure on
//! that path deletes the reserved user. A returning user only gets a
//! rotated nonce and a session. A rejected returning attempt still retires
//! the nonce and leaves everything else as it was.

use chrono::{DateTime, Utc};
use common::messages::{decode_embedded, CredentialsRequest, SignaturePayload};
use common::models::session::Session;
use common::models::user::User;
use common::models::wallet::WalletMetadata;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::error::AuthError;
use crate::nonce;
use crate::session_binder;
use crate::store::{accounts, users, wallets, StoreError};
use crate::verifier::{self, SignatureScheme};

/// Validated sign-in input
#[derive(Debug, Clone)]
pub struct Credentials {
    pub nonce: String,
    pub user_id: Uuid,
    pub payload: SignaturePayload,
    pub wallet: WalletMetadata,
}

impl Credentials {
    /// Check that every field is present and well formed.
    ///
    /// Runs before any store access; all rejections read the same.
    pub fn from_request(req: &CredentialsRequest) -> Result<Self, AuthError> {
        let nonce = req
            .nonce
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(AuthError::VerificationFailed)?;
        let user_id = req
            .user_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or(AuthError::VerificationFailed)?;
        let payload: SignaturePayload = req
            .signature
            .as_ref()
            .and_then(decode_embedded)
            .ok_or(AuthError::VerificationFailed)?;
        let wallet: WalletMetadata = req
            .wallet
            .as_ref()
            .and_then(decode_embedded)
            .filter(|w: &WalletMetadata| !w.reward_address.is_empty() && !w.wallet_type.is_empty())
            .ok_or(AuthError::VerificationFailed)?;

        Ok(Self {
            nonce: nonce.to_string(),
            user_id,
            payload,
            wallet,
        })
    }
}

/// Successful sign-in
#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: User,
    pub session: Session,
    pub first_time: bool,
}

/// Verify `credentials` and open a session.
pub fn authenticate(
    conn: &mut Connection,
    credentials: &Credentials,
    now: DateTime<Utc>,
    session_ttl_seconds: i64,
) -> Result<SignIn, AuthError> {
    let user = users::get(conn, credentials.user_id)?.ok_or_else(|| {
        tracing::warn!("Sign-in for unknown user {}", credentials.user_id);
        AuthError::VerificationFailed
    })?;

    let stored_nonce = user.nonce.clone().ok_or(AuthError::NonceUnavailable)?;
    let bound = wallets::list_for_user(conn, user.id)?;

    if stored_nonce != credentials.nonce {
        tracing::warn!("Sign-in for user {} presented a stale nonce", user.id);
        if bound.is_empty() && users::delete_if_pending(conn, user.id)? {
            tracing::debug!("Discarded reservation {}", user.id);
        }
        return Err(AuthError::VerificationFailed);
    }

    if bound.is_empty() {
        first_sign_in(conn, user, &stored_nonce, credentials, now, session_ttl_seconds)
    } else {
        // Only a wallet already bound to this user may sign for it
        let Some(wallet) = bound
            .iter()
            .find(|w| w.reward_address == credentials.wallet.reward_address)
        else {
            tracing::warn!("Sign-in for user {} from an unbound wallet", user.id);
            burn_nonce(conn, user.id, &stored_nonce)?;
            return Err(AuthError::VerificationFailed);
        };
        let scheme = SignatureScheme::for_wallet_type(&wallet.wallet_type);
        if !verifier::verify(stored_nonce.as_bytes(), &wallet.reward_address, &credentials.payload, scheme) {
            tracing::warn!("Signature rejected for returning user {}", user.id);
            burn_nonce(conn, user.id, &stored_nonce)?;
            return Err(AuthError::VerificationFailed);
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        nonce::rotate(&tx, user.id, &stored_nonce).map_err(consumed)?;
        let session = session_binder::create(&tx, user.id, Some(&wallet.wallet_type), now, session_ttl_seconds)?;
        tx.commit()?;

        tracing::info!("User {} signed in with {}", user.id, wallet.wallet_type);
        Ok(SignIn {
            user,
            session,
            first_time: false,
        })
    }
}

fn first_sign_in(
    conn: &mut Connection,
    user: User,
    stored_nonce: &str,
    credentials: &Credentials,
    now: DateTime<Utc>,
    session_ttl_seconds: i64,
) -> Result<SignIn, AuthError> {
    let wallet = &credentials.wallet;
    let scheme = SignatureScheme::for_wallet_type(&wallet.wallet_type);

    if !verifier::verify(stored_nonce.as_bytes(), &wallet.reward_address, &credentials.payload, scheme) {
        tracing::warn!("Signature rejected for new user {}, discarding reservation", user.id);
        users::delete_if_pending(conn, user.id)?;
        return Err(AuthError::VerificationFailed);
    }

    match bind_first_wallet(conn, user.id, stored_nonce, wallet, now, session_ttl_seconds) {
        Ok(session) => {
            let user = users::get(conn, user.id)?.ok_or(AuthError::NotFound("user"))?;
            tracing::info!("User {} activated with {}", user.id, wallet.wallet_type);
            Ok(SignIn {
                user,
                session,
                first_time: true,
            })
        }
        Err(e) => {
            tracing::warn!("First sign-in for user {} failed: {}", user.id, e);
            if let Err(cleanup) = users::delete_if_pending(conn, user.id) {
                tracing::error!("Could not discard user {}: {}", user.id, cleanup);
            }
            Err(e)
        }
    }
}

/// All first-time writes, committed together or not at all
fn bind_first_wallet(
    conn: &mut Connection,
    user_id: Uuid,
    stored_nonce: &str,
    wallet: &WalletMetadata,
    now: DateTime<Utc>,
    session_ttl_seconds: i64,
) -> Result<Session, AuthError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    users::activate(&tx, user_id, wallet)?;
    wallets::insert(&tx, user_id, wallet, now)?;
    accounts::insert_credentials(&tx, user_id)?;
    nonce::rotate(&tx, user_id, stored_nonce).map_err(consumed)?;
    let session = session_binder::create(&tx, user_id, Some(&wallet.wallet_type), now, session_ttl_seconds)?;
    tx.commit()?;
    Ok(session)
}

/// Retire a nonce after a rejected attempt. Losing the swap is fine: the
/// nonce is already gone.
fn burn_nonce(conn: &Connection, user_id: Uuid, stored_nonce: &str) -> Result<(), AuthError> {
    match nonce::rotate(conn, user_id, stored_nonce) {
        Ok(_) | Err(StoreError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A failed nonce swap means another request consumed it first
fn consumed(e: StoreError) -> AuthError {
    match e {
        StoreError::NotFound(_) => AuthError::VerificationFailed,
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use serde_json::json;

    fn request() -> CredentialsRequest {
        CredentialsRequest {
            nonce: Some("n1".to_string()),
            user_id: Some(Uuid::new_v4().to_string()),
            signature: Some(json!({"signature": "84", "key": "a4"})),
            wallet: Some(json!({"type": "nami", "rewardAddress": "stake1u"})),
        }
    }

    #[test]
    fn test_from_request_accepts_embedded_json_strings() {
        let mut req = request();
        req.signature = Some(json!(r#"{"signature":"84","key":"a4"}"#));
        req.wallet = Some(json!(r#"{"type":"nami","rewardAddress":"stake1u"}"#));
        let creds = Credentials::from_request(&req).unwrap();
        assert_eq!(creds.wallet.reward_address, "stake1u");
    }

    #[test]
    fn test_from_request_rejects_missing_fields() {
        let mut missing_nonce = request();
        missing_nonce.nonce = None;
        let mut bad_user = request();
        bad_user.user_id = Some("not-a-uuid".to_string());
        let mut bad_signature = request();
        bad_signature.signature = Some(json!("garbage"));
        let mut no_wallet = request();
        no_wallet.wallet = None;

        for req in [missing_nonce, bad_user, bad_signature, no_wallet] {
            assert!(matches!(
                Credentials::from_request(&req),
                Err(AuthError::VerificationFailed)
            ));
        }
    }

    #[test]
    fn test_unknown_user_is_rejected() {
        let store = Store::open_memory().unwrap();
        let creds = Credentials::from_request(&request()).unwrap();
        let result = store.run(|conn| authenticate(conn, &creds, Utc::now(), 3600));
        assert!(matches!(result, Err(AuthError::VerificationFailed)));
    }

    #[test]
    fn test_bad_first_signature_discards_reserved_user() {
        let store = Store::open_memory().unwrap();
        let issued = store.with_conn(|conn| nonce::issue(conn, None, Utc::now(), 3600)).unwrap();

        let mut req = request();
        req.user_id = Some(issued.user_id.to_string());
        req.nonce = Some(issued.nonce.clone());
        let creds = Credentials::from_request(&req).unwrap();

        let result = store.run(|conn| authenticate(conn, &creds, Utc::now(), 3600));
        assert!(matches!(result, Err(AuthError::VerificationFailed)));
        assert!(store.with_conn(|conn| users::get(conn, issued.user_id)).unwrap().is_none());
    }

    #[test]
    fn test_wrong_nonce_discards_reserved_user() {
        let store = Store::open_memory().unwrap();
        let issued = store.with_conn(|conn| nonce::issue(conn, None, Utc::now(), 3600)).unwrap();

        let mut req = request();
        req.user_id = Some(issued.user_id.to_string());
        req.nonce = Some("wrong".to_string());
        let creds = Credentials::from_request(&req).unwrap();

        let result = store.run(|conn| authenticate(conn, &creds, Utc::now(), 3600));
        assert!(matches!(result, Err(AuthError::VerificationFailed)));
        assert!(store.with_conn(|conn| users::get(conn, issued.user_id)).unwrap().is_none());
    }

    #[test]
    fn test_rejected_returning_signature_retires_nonce() {
        let store = Store::open_memory().unwrap();
        let issued = store.with_conn(|conn| nonce::issue(conn, None, Utc::now(), 3600)).unwrap();
        let wallet = WalletMetadata {
            wallet_type: "nami".to_string(),
            reward_address: "stake1u".to_string(),
            change_address: None,
            used_addresses: vec![],
            unused_addresses: vec![],
        };
        store
            .with_conn(|conn| {
                users::activate(conn, issued.user_id, &wallet)?;
                wallets::insert(conn, issued.user_id, &wallet, Utc::now())?;
                Ok(())
            })
            .unwrap();

        let mut req = request();
        req.user_id = Some(issued.user_id.to_string());
        req.nonce = Some(issued.nonce.clone());
        let creds = Credentials::from_request(&req).unwrap();

        let result = store.run(|conn| authenticate(conn, &creds, Utc::now(), 3600));
        assert!(matches!(result, Err(AuthError::VerificationFailed)));

        let user = store.with_conn(|conn| users::get(conn, issued.user_id)).unwrap().unwrap();
        assert!(user.nonce.is_some());
        assert_ne!(user.nonce.as_deref(), Some(issued.nonce.as_str()));
        assert_eq!(store.with_conn(|conn| wallets::list_for_user(conn, issued.user_id)).unwrap().len(), 1);
    }

    #[test]
    fn test_null_nonce_asks_for_restart() {
        let store = Store::open_memory().unwrap();
        let user_id = Uuid::new_v4();
        store
            .with_conn(|conn| {
                users::insert_pending(conn, user_id, "n1", Utc::now())?;
                conn.execute("UPDATE users SET nonce = NULL WHERE id = ?1", [user_id.to_string()])?;
                Ok(())
            })
            .unwrap();

        let mut req = request();
        req.user_id = Some(user_id.to_string());
        let creds = Credentials::from_request(&req).unwrap();
        let result = store.run(|conn| authenticate(conn, &creds, Utc::now(), 3600));
        assert!(matches!(result, Err(AuthError::NonceUnavailable)));
    }
}
