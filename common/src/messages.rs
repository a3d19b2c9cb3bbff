// Common Crate - messages.rs
// common/src/messages.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::models::ergo_proof::{ErgoProof, ProofStatus};
use crate::models::user::User;

/// Request for a sign-in challenge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRequest {
    /// Reward address of a returning wallet, if the client knows it
    #[serde(default)]
    pub reward_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub user_id: Uuid,
    pub nonce: String,
}

/// Sign-in credentials.
///
/// `signature` and `wallet` may arrive either as JSON objects or as
/// JSON-encoded strings, the way form-style credential posts send them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub signature: Option<Value>,
    #[serde(default)]
    pub wallet: Option<Value>,
}

/// Opaque signature payload produced by a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignaturePayload {
    /// CIP-30 `signData` output: hex COSE_Sign1 and hex COSE_Key
    #[serde(rename_all = "camelCase")]
    Cip30 { signature: String, key: String },
    /// Sigma-protocol `auth` output: signed message and hex proof bytes
    #[serde(rename_all = "camelCase")]
    Sigma { signed_message: String, proof: String },
}

/// Decode a value that is either the JSON itself or a string holding JSON
pub fn decode_embedded<T: serde::de::DeserializeOwned>(value: &Value) -> Option<T> {
    match value {
        Value::String(s) => serde_json::from_str(s).ok(),
        other => serde_json::from_value(other.clone()).ok(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub default_address: Option<String>,
    pub reward_address: Option<String>,
    pub wallet_type: Option<String>,
}

impl SessionUser {
    pub fn from_user(user: &User, wallet_type: Option<String>) -> Self {
        Self {
            id: user.id,
            default_address: user.default_address.clone(),
            reward_address: user.reward_address.clone(),
            wallet_type: wallet_type.or_else(|| user.wallet_type.clone()),
        }
    }
}

/// Hydrated session returned to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitVerificationRequest {
    pub wallet_type: String,
    pub default_address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitErgopayRequest {
    #[serde(default)]
    pub wallet_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitVerificationResponse {
    pub verification_id: Uuid,
    /// Absent when the address was already verified
    pub nonce: Option<String>,
    pub status: ProofStatus,
    pub already_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErgopayAddressRequest {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyProofRequest {
    pub signed_message: String,
    pub proof: String,
    pub address: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    pub wallet_type: String,
    pub verification_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyProofResponse {
    pub verified: bool,
    pub verification_id: Uuid,
    pub status: ProofStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTxRequest {
    pub transaction_id: String,
    pub verification_id: Uuid,
}

/// Outcome of one confirmation poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Verified,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTxResponse {
    pub status: PollStatus,
    pub num_confirmations: i64,
    pub message: String,
}

/// Proof record as shown to its owner; the nonce stays server-side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofView {
    pub verification_id: Uuid,
    pub status: ProofStatus,
    pub addresses: Vec<String>,
    pub default_address: Option<String>,
    pub wallet_type: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&ErgoProof> for ProofView {
    fn from(proof: &ErgoProof) -> Self {
        Self {
            verification_id: proof.verification_id,
            status: proof.status,
            addresses: proof.addresses.clone(),
            default_address: proof.default_address.clone(),
            wallet_type: proof.wallet_type.clone(),
            transaction_id: proof.transaction_id.clone(),
            created_at: proof.created_at,
        }
    }
}
