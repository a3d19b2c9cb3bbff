// common/src/models/ergo_proof.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};

/// States of a secondary address ownership claim.
///
/// Claims only ever move forward one step at a time:
/// `Initiated -> Pending -> Signed -> Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofStatus {
    /// Created without an address (ErgoPay); waiting for the wallet to report one
    Initiated,
    /// Address known, nonce issued
    Pending,
    /// Client produced a signature or a self-transaction
    Signed,
    /// Ownership proven
    Verified,
}

impl ProofStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Initiated => "INITIATED",
            ProofStatus::Pending => "PENDING",
            ProofStatus::Signed => "SIGNED",
            ProofStatus::Verified => "VERIFIED",
        }
    }

    /// The single state reachable from this one
    pub fn next(&self) -> Option<ProofStatus> {
        match self {
            ProofStatus::Initiated => Some(ProofStatus::Pending),
            ProofStatus::Pending => Some(ProofStatus::Signed),
            ProofStatus::Signed => Some(ProofStatus::Verified),
            ProofStatus::Verified => None,
        }
    }

    pub fn can_transition_to(&self, target: ProofStatus) -> bool {
        self.next() == Some(target)
    }

    /// Whether the claim has an address and can accept a signature or transaction
    pub fn accepts_evidence(&self) -> bool {
        matches!(self, ProofStatus::Pending | ProofStatus::Signed)
    }
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProofStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(ProofStatus::Initiated),
            "PENDING" => Ok(ProofStatus::Pending),
            "SIGNED" => Ok(ProofStatus::Signed),
            "VERIFIED" => Ok(ProofStatus::Verified),
            other => Err(format!("unknown proof status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErgoProof {
    pub verification_id: Uuid,
    pub user_id: Uuid,
    pub nonce: String,
    /// Candidate address set
    pub addresses: Vec<String>,
    pub default_address: Option<String>,
    pub wallet_type: Option<String>,
    pub status: ProofStatus,
    pub signed_message: Option<String>,
    pub proof: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ErgoProof {
    /// Unverified claims expire `ttl_seconds` after creation
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_seconds: i64) -> bool {
        self.status != ProofStatus::Verified
            && self.created_at + Duration::seconds(ttl_seconds) < now
    }
}
