// common/src/models/session.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Server-side session row.
///
/// The token carried in the cookie is only a lookup key; everything the
/// request needs is read back from this row and the user it points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Public identifier used to list and revoke sessions
    pub id: Uuid,
    /// Opaque cookie value
    pub session_token: String,
    pub user_id: Uuid,
    /// Wallet type denormalized for quick UI hydration
    pub wallet_type: Option<String>,
    pub expires: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// Session summary for the device list; omits the token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub wallet_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    /// Whether this is the session making the request
    pub current: bool,
}

impl SessionSummary {
    pub fn from_session(session: &Session, current_id: Uuid) -> Self {
        Self {
            id: session.id,
            wallet_type: session.wallet_type.clone(),
            created_at: session.created_at,
            expires: session.expires,
            current: session.id == current_id,
        }
    }
}
