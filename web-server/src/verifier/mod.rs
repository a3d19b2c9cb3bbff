// web-server/src/verifier/mod.rs
//! Wallet signature verification.
//!
//! Two independent schemes sit behind one contract:
//! `verify(nonce, address, payload, scheme) -> bool`. Verification is pure:
//! no store or network access, and any parse failure is reported as an
//! invalid signature rather than an error.

pub mod cip30;
pub mod sigma;

use common::messages::SignaturePayload;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wallet types whose connectors expose sigma-protocol proofs instead of
/// CIP-30 `signData`.
const SIGMA_WALLET_TYPES: &[&str] = &["nautilus", "safew", "minotaur", "ergopay"];

/// Closed set of supported signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    /// COSE_Sign1 envelope signed with an Ed25519 account key
    Cip30,
    /// Schnorr proof of knowledge of the address's discrete log
    Sigma,
}

impl SignatureScheme {
    /// Pick the scheme a wallet type signs with
    pub fn for_wallet_type(wallet_type: &str) -> Self {
        let wallet_type = wallet_type.trim().to_ascii_lowercase();
        if SIGMA_WALLET_TYPES.contains(&wallet_type.as_str()) {
            SignatureScheme::Sigma
        } else {
            SignatureScheme::Cip30
        }
    }

    /// Check `payload` over `nonce` for `address` under this scheme.
    ///
    /// A payload shaped for the other scheme fails closed.
    pub fn verify(&self, nonce: &[u8], address: &str, payload: &SignaturePayload) -> bool {
        match (self, payload) {
            (SignatureScheme::Cip30, SignaturePayload::Cip30 { signature, key }) => {
                cip30::verify(nonce, address, signature, key)
            }
            (SignatureScheme::Sigma, SignaturePayload::Sigma { signed_message, proof }) => {
                sigma::verify_auth(nonce, address, signed_message, proof)
            }
            _ => {
                tracing::debug!("Signature payload does not match scheme {}", self);
                false
            }
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureScheme::Cip30 => f.write_str("cip30"),
            SignatureScheme::Sigma => f.write_str("sigma"),
        }
    }
}

/// Stable entry point used by the authentication flows
pub fn verify(nonce: &[u8], address: &str, payload: &SignaturePayload, scheme: SignatureScheme) -> bool {
    scheme.verify(nonce, address, payload)
}
