// common/src/models/wallet.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Wallet metadata reported by the client at sign-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletMetadata {
    #[serde(rename = "type")]
    pub wallet_type: String,
    pub reward_address: String,
    #[serde(default)]
    pub change_address: Option<String>,
    #[serde(default)]
    pub used_addresses: Vec<String>,
    #[serde(default)]
    pub unused_addresses: Vec<String>,
}

impl WalletMetadata {
    /// Address shown to the user; the change address when the wallet
    /// reported one, otherwise the reward address.
    pub fn display_address(&self) -> &str {
        self.change_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.reward_address)
    }
}

/// Persisted wallet attached to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: i64,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub wallet_type: String,
    pub reward_address: String,
    pub change_address: Option<String>,
    pub used_addresses: Vec<String>,
    pub unused_addresses: Vec<String>,
    pub created_at: DateTime<Utc>,
}
