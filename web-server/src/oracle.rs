// web-server/src/oracle.rs
//! Client for the external transaction-confirmation oracle.
//!
//! `GET {base_url}tx_status/{transaction_id}` answers
//! `{ "num_confirmations": <int> }`, negative while the transaction is
//! unknown. The oracle is untrusted: transport failures, non-2xx statuses
//! and unparseable bodies all surface as `OracleError`, never as a count.

use async_trait::async_trait;
use common::config::OracleConfig;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("invalid transaction id")]
    InvalidTransactionId,

    #[error("invalid oracle url: {0}")]
    Url(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct TxStatus {
    num_confirmations: i64,
}

/// Source of confirmation counts for submitted transactions
#[async_trait]
pub trait ConfirmationOracle: Send + Sync {
    /// Confirmation count for `transaction_id`; negative if not yet seen
    async fn num_confirmations(&self, transaction_id: &str) -> Result<i64, OracleError>;
}

/// HTTP implementation backed by `reqwest`
#[derive(Clone, Debug)]
pub struct HttpConfirmationOracle {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpConfirmationOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| OracleError::Url(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Request(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    /// URL of the status resource for `transaction_id`
    pub fn status_url(&self, transaction_id: &str) -> Result<Url, OracleError> {
        validate_transaction_id(transaction_id)?;
        self.base_url
            .join(&format!("tx_status/{}", transaction_id))
            .map_err(|e| OracleError::Url(e.to_string()))
    }
}

#[async_trait]
impl ConfirmationOracle for HttpConfirmationOracle {
    async fn num_confirmations(&self, transaction_id: &str) -> Result<i64, OracleError> {
        let url = self.status_url(transaction_id)?;
        tracing::debug!("Polling confirmation oracle at {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;
        let parsed: TxStatus =
            serde_json::from_slice(&body).map_err(|e| OracleError::Malformed(e.to_string()))?;
        Ok(parsed.num_confirmations)
    }
}

/// Transaction ids are hex digests; anything else never reaches the oracle
fn validate_transaction_id(transaction_id: &str) -> Result<(), OracleError> {
    if transaction_id.is_empty()
        || transaction_id.len() > 128
        || !transaction_id.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(OracleError::InvalidTransactionId);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle(base: &str) -> HttpConfirmationOracle {
        HttpConfirmationOracle::new(&OracleConfig {
            base_url: base.to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_status_url_joins_base() {
        let tx = "ab".repeat(32);
        let url = oracle("http://oracle.local/api").status_url(&tx).unwrap();
        assert_eq!(url.as_str(), format!("http://oracle.local/api/tx_status/{}", tx));
    }

    #[test]
    fn test_rejects_non_hex_transaction_ids() {
        let o = oracle("http://oracle.local/");
        assert!(matches!(o.status_url("../admin"), Err(OracleError::InvalidTransactionId)));
        assert!(matches!(o.status_url(""), Err(OracleError::InvalidTransactionId)));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = HttpConfirmationOracle::new(&OracleConfig {
            base_url: "not a url".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(OracleError::Url(_))));
    }
}
