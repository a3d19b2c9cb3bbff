// web-server/tests/auth_api.rs
#[macro_use]
mod support;

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::{json, Value};
use support::{session_cookie, CardanoWallet, ErgoWallet, ScriptedOracle};
use uuid::Uuid;
use web_server::store::{accounts, users, wallets, Store};

fn credentials(nonce: &str, user_id: &str, signature: Value, wallet: Value) -> Value {
    json!({
        "nonce": nonce,
        "userId": user_id,
        "signature": signature,
        "wallet": wallet,
    })
}

#[actix_web::test]
async fn test_first_sign_in_binds_wallet_and_sets_cookie() {
    let store = Store::open_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let app = test_app!(store, oracle);
    let wallet = CardanoWallet::new(1);

    let issued: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post().uri("/api/auth/nonce").set_json(json!({})).to_request(),
    )
    .await;
    let nonce = issued["nonce"].as_str().unwrap().to_string();
    let user_id = issued["userId"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(credentials(&nonce, &user_id, wallet.sign(&nonce), wallet.metadata()))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp).expect("session cookie");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["id"], json!(user_id));
    assert_eq!(body["user"]["rewardAddress"], json!(wallet.reward_address()));

    // Wallet, account and rotated nonce were all written
    let id = Uuid::parse_str(&user_id).unwrap();
    let user = store.with_conn(|conn| users::get(conn, id)).unwrap().unwrap();
    assert!(user.is_active());
    assert_ne!(user.nonce.as_deref(), Some(nonce.as_str()));
    assert_eq!(store.with_conn(|conn| wallets::list_for_user(conn, id)).unwrap().len(), 1);
    assert_eq!(store.with_conn(|conn| accounts::list_for_user(conn, id)).unwrap().len(), 1);

    // The cookie resolves to the same user
    let session: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/auth/session").cookie(cookie).to_request(),
    )
    .await;
    assert_eq!(session["user"]["id"], json!(user_id));
    assert_eq!(session["user"]["walletType"], json!("eternl"));
}

#[actix_web::test]
async fn test_replayed_signature_is_rejected() {
    let store = Store::open_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let app = test_app!(store, oracle);
    let wallet = CardanoWallet::new(2);

    let issued: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post().uri("/api/auth/nonce").to_request(),
    )
    .await;
    let nonce = issued["nonce"].as_str().unwrap().to_string();
    let user_id = issued["userId"].as_str().unwrap().to_string();
    let body = credentials(&nonce, &user_id, wallet.sign(&nonce), wallet.metadata());

    let first = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/auth/callback/credentials").set_json(&body).to_request(),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    let replay = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/auth/callback/credentials").set_json(&body).to_request(),
    )
    .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_returning_wallet_signs_in_with_reissued_nonce() {
    let store = Store::open_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let app = test_app!(store, oracle);
    let wallet = CardanoWallet::new(3);

    let issued: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post().uri("/api/auth/nonce").to_request(),
    )
    .await;
    let nonce = issued["nonce"].as_str().unwrap().to_string();
    let user_id = issued["userId"].as_str().unwrap().to_string();
    let first = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(credentials(&nonce, &user_id, wallet.sign(&nonce), wallet.metadata()))
            .to_request(),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    let again: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/nonce")
            .set_json(json!({ "rewardAddress": wallet.reward_address() }))
            .to_request(),
    )
    .await;
    assert_eq!(again["userId"], json!(user_id));
    let next = again["nonce"].as_str().unwrap().to_string();
    assert_ne!(next, nonce);

    // Wallet metadata may arrive as an embedded JSON string
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(credentials(
                &next,
                &user_id,
                wallet.sign(&next),
                Value::String(wallet.metadata().to_string()),
            ))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Another wallet cannot sign for this user
    let intruder = CardanoWallet::new(4);
    let current = store
        .with_conn(|conn| users::get(conn, Uuid::parse_str(&user_id).unwrap()))
        .unwrap()
        .unwrap()
        .nonce
        .unwrap();
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(credentials(&current, &user_id, intruder.sign(&current), intruder.metadata()))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // The rejected attempt used up the nonce
    let after = store
        .with_conn(|conn| users::get(conn, Uuid::parse_str(&user_id).unwrap()))
        .unwrap()
        .unwrap()
        .nonce;
    assert!(after.is_some());
    assert_ne!(after.as_deref(), Some(current.as_str()));
}

#[actix_web::test]
async fn test_failed_first_sign_in_leaves_no_rows() {
    let store = Store::open_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let app = test_app!(store, oracle);
    let wallet = CardanoWallet::new(5);

    let issued: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post().uri("/api/auth/nonce").to_request(),
    )
    .await;
    let nonce = issued["nonce"].as_str().unwrap().to_string();
    let user_id = issued["userId"].as_str().unwrap().to_string();

    // Signed over something other than the issued nonce
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(credentials(&nonce, &user_id, wallet.sign("not-the-nonce"), wallet.metadata()))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&resp).is_none());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], json!("could not verify wallet"));

    let id = Uuid::parse_str(&user_id).unwrap();
    assert!(store.with_conn(|conn| users::get(conn, id)).unwrap().is_none());
    assert!(store.with_conn(|conn| wallets::list_for_user(conn, id)).unwrap().is_empty());
}

#[actix_web::test]
async fn test_sigma_wallet_cannot_use_cip30_payload() {
    let store = Store::open_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let app = test_app!(store, oracle);
    let cardano = CardanoWallet::new(6);
    let ergo = ErgoWallet::new(7);

    let issued: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post().uri("/api/auth/nonce").to_request(),
    )
    .await;
    let nonce = issued["nonce"].as_str().unwrap().to_string();
    let user_id = issued["userId"].as_str().unwrap().to_string();

    // A valid CIP-30 signature presented under a sigma wallet type
    let wallet = json!({ "type": "nautilus", "rewardAddress": ergo.address() });
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(credentials(&nonce, &user_id, cardano.sign(&nonce), wallet))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_nautilus_sign_in_uses_sigma_proof() {
    let store = Store::open_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let app = test_app!(store, oracle);
    let ergo = ErgoWallet::new(8);

    let issued: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post().uri("/api/auth/nonce").to_request(),
    )
    .await;
    let nonce = issued["nonce"].as_str().unwrap().to_string();
    let user_id = issued["userId"].as_str().unwrap().to_string();

    let (signed_message, proof) = ergo.sign(&nonce);
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(credentials(
                &nonce,
                &user_id,
                json!({ "signedMessage": signed_message, "proof": proof }),
                json!({ "type": "nautilus", "rewardAddress": ergo.address() }),
            ))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_malformed_credentials_rejected_before_store() {
    let store = Store::open_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let app = test_app!(store, oracle);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(json!({ "nonce": "n", "userId": "not-a-uuid" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_sign_out_and_session_revocation() {
    let store = Store::open_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let app = test_app!(store, oracle);
    let wallet = CardanoWallet::new(9);

    let issued: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post().uri("/api/auth/nonce").to_request(),
    )
    .await;
    let nonce = issued["nonce"].as_str().unwrap().to_string();
    let user_id = issued["userId"].as_str().unwrap().to_string();
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(credentials(&nonce, &user_id, wallet.sign(&nonce), wallet.metadata()))
            .to_request(),
    )
    .await;
    let first_cookie = session_cookie(&resp).unwrap();

    // Second device
    let again: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/nonce")
            .set_json(json!({ "rewardAddress": wallet.reward_address() }))
            .to_request(),
    )
    .await;
    let next = again["nonce"].as_str().unwrap().to_string();
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/callback/credentials")
            .set_json(credentials(&next, &user_id, wallet.sign(&next), wallet.metadata()))
            .to_request(),
    )
    .await;
    let second_cookie = session_cookie(&resp).unwrap();

    let listed: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/sessions").cookie(first_cookie.clone()).to_request(),
    )
    .await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    let other_id = listed
        .iter()
        .find(|s| s["current"] == json!(false))
        .and_then(|s| s["id"].as_str())
        .unwrap()
        .to_string();

    // Revoking the second device from the first takes effect at once
    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/sessions/{}", other_id))
            .cookie(first_cookie.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/sessions").cookie(second_cookie).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/auth/signout").cookie(first_cookie.clone()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(session_cookie(&resp).map(|c| c.value().to_string()), Some(String::new()));

    let session: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/auth/session").cookie(first_cookie).to_request(),
    )
    .await;
    assert!(session.is_null());
}

#[actix_web::test]
async fn test_protected_routes_require_session() {
    let store = Store::open_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let app = test_app!(store, oracle);

    for uri in ["/api/sessions", "/api/proofs"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}
