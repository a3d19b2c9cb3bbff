// common/src/models/mod.rs
pub mod ergo_proof;
pub mod session;
pub mod user;
pub mod wallet;

use chrono::{DateTime, Utc};

/// Convert stored unix seconds back into a timestamp
pub fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
