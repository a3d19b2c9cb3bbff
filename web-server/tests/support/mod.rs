// web-server/tests/support/mod.rs
//! Wallet fakes and app wiring shared by the HTTP tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use async_trait::async_trait;
use bech32::{Bech32, Hrp};
use ciborium::value::Value;
use common::config::Config;
use ed25519_dalek::{Signer, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, ProjectivePoint, Scalar};
use serde_json::{json, Value as Json};
use web_server::oracle::{ConfirmationOracle, OracleError};
use web_server::verifier::sigma;

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.session.secure_cookie = false;
    config.database.workers = 1;
    config
}

/// Build an initialised test service over `$store` and `$oracle`
macro_rules! test_app {
    ($store:expr, $oracle:expr) => {{
        let config = std::sync::Arc::new($crate::support::test_config());
        let registry = web_server::start_registry($store.clone(), config.clone());
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::from(config))
                .app_data(actix_web::web::Data::new(registry))
                .app_data($crate::support::OracleData::data(&$oracle))
                .configure(web_server::api::configure),
        )
        .await
    }};
}

/// Oracle that replays queued answers and records what it was asked
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<i64, OracleError>>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: Result<i64, OracleError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

pub trait OracleData {
    fn data(&self) -> actix_web::web::Data<dyn ConfirmationOracle>;
}

impl OracleData for Arc<ScriptedOracle> {
    fn data(&self) -> actix_web::web::Data<dyn ConfirmationOracle> {
        actix_web::web::Data::from(self.clone() as Arc<dyn ConfirmationOracle>)
    }
}

#[async_trait]
impl ConfirmationOracle for ScriptedOracle {
    async fn num_confirmations(&self, transaction_id: &str) -> Result<i64, OracleError> {
        self.asked.lock().unwrap().push(transaction_id.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(OracleError::Status(503)))
    }
}

/// Session cookie set by a response, if any
pub fn session_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    let name = test_config().session.cookie_name;
    resp.response()
        .cookies()
        .find(|c| c.name() == name)
        .map(|c| c.into_owned())
}

/// Cardano wallet that answers CIP-30 `signData`
pub struct CardanoWallet {
    key: SigningKey,
}

impl CardanoWallet {
    pub fn new(seed: u8) -> Self {
        Self {
            key: SigningKey::from_bytes(&[seed; 32]),
        }
    }

    fn address_bytes(&self) -> Vec<u8> {
        let hash = blake2b_simd::Params::new()
            .hash_length(28)
            .hash(self.key.verifying_key().as_bytes());
        let mut bytes = vec![0xe1];
        bytes.extend_from_slice(hash.as_bytes());
        bytes
    }

    pub fn reward_address(&self) -> String {
        bech32::encode::<Bech32>(Hrp::parse("stake").unwrap(), &self.address_bytes()).unwrap()
    }

    pub fn metadata(&self) -> Json {
        json!({
            "type": "eternl",
            "rewardAddress": self.reward_address(),
            "changeAddress": format!("addr_change_{}", &self.reward_address()[6..16]),
        })
    }

    /// `{ signature, key }` over `message`
    pub fn sign(&self, message: &str) -> Json {
        let protected = cbor(&Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer((-8).into())),
            (Value::Text("address".to_string()), Value::Bytes(self.address_bytes())),
        ]));
        let to_sign = cbor(&Value::Array(vec![
            Value::Text("Signature1".to_string()),
            Value::Bytes(protected.clone()),
            Value::Bytes(Vec::new()),
            Value::Bytes(message.as_bytes().to_vec()),
        ]));
        let signature = self.key.sign(&to_sign);
        let envelope = Value::Array(vec![
            Value::Bytes(protected),
            Value::Map(vec![(Value::Text("hashed".to_string()), Value::Bool(false))]),
            Value::Bytes(message.as_bytes().to_vec()),
            Value::Bytes(signature.to_bytes().to_vec()),
        ]);
        let key = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(1.into())),
            (Value::Integer(3.into()), Value::Integer((-8).into())),
            (Value::Integer((-1).into()), Value::Integer(6.into())),
            (Value::Integer((-2).into()), Value::Bytes(self.key.verifying_key().to_bytes().to_vec())),
        ]);
        json!({
            "signature": hex::encode(cbor(&envelope)),
            "key": hex::encode(cbor(&key)),
        })
    }
}

/// Ergo wallet that answers sigma-protocol `auth` requests
pub struct ErgoWallet {
    secret: Scalar,
}

impl ErgoWallet {
    pub fn new(seed: u8) -> Self {
        Self {
            secret: scalar(seed),
        }
    }

    fn public_key(&self) -> [u8; 33] {
        let point = (ProjectivePoint::GENERATOR * self.secret).to_affine().to_encoded_point(true);
        let mut pk = [0u8; 33];
        pk.copy_from_slice(point.as_bytes());
        pk
    }

    pub fn address(&self) -> String {
        sigma::encode_p2pk_address(&self.public_key(), true)
    }

    /// `(signedMessage, proof)` for a challenge starting with `nonce`
    pub fn sign(&self, nonce: &str) -> (String, String) {
        let message = format!("{}launchpad.test", nonce);
        let r = scalar(0x5a);
        let a = (ProjectivePoint::GENERATOR * r).to_affine().to_encoded_point(true);
        let e_bytes = sigma::fiat_shamir_challenge(&self.public_key(), a.as_bytes(), message.as_bytes());
        let mut padded = [0u8; 32];
        padded[32 - e_bytes.len()..].copy_from_slice(&e_bytes);
        let e = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(padded))).unwrap();
        let z = r + e * self.secret;
        let mut proof = e_bytes.to_vec();
        proof.extend_from_slice(&z.to_repr());
        (message, hex::encode(proof))
    }
}

fn scalar(seed: u8) -> Scalar {
    Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from([seed; 32]))).unwrap()
}

fn cbor(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).unwrap();
    buf
}

/// Run the nonce/sign/callback exchange for `$wallet` and return the cookie
macro_rules! sign_in {
    ($app:expr, $wallet:expr) => {{
        let issued: serde_json::Value = actix_web::test::call_and_read_body_json(
            &$app,
            actix_web::test::TestRequest::post().uri("/api/auth/nonce").to_request(),
        )
        .await;
        let nonce = issued["nonce"].as_str().unwrap().to_string();
        let resp = actix_web::test::call_service(
            &$app,
            actix_web::test::TestRequest::post()
                .uri("/api/auth/callback/credentials")
                .set_json(serde_json::json!({
                    "nonce": nonce,
                    "userId": issued["userId"],
                    "signature": $wallet.sign(&nonce),
                    "wallet": $wallet.metadata(),
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
        $crate::support::session_cookie(&resp).unwrap()
    }};
}
