// web-server/src/api/proofs.rs
use actix::Addr;
use actix_web::{delete, get, post, web, HttpResponse};
use common::messages::{
    ErgopayAddressRequest, InitErgopayRequest, InitVerificationRequest, InitVerificationResponse,
    PollStatus, PollTxRequest, PollTxResponse, ProofView, VerifyProofRequest, VerifyProofResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::ergo_proof::InitOutcome;
use crate::error::AuthError;
use crate::oracle::ConfirmationOracle;
use crate::registry::{
    ask, CheckProofStatus, DeleteProof, GetProofsForUser, InitVerification, InitVerificationErgopay,
    PreparePoll, RecordConfirmation, RegistryActor, ReportErgopayAddress, VerifyProof,
};
use crate::session_binder::CurrentSession;

#[post("/proofs/init")]
pub async fn init_verification(
    current: CurrentSession,
    body: web::Json<InitVerificationRequest>,
    registry: web::Data<Addr<RegistryActor>>,
) -> Result<HttpResponse, AuthError> {
    let CurrentSession(ctx) = current;
    let body = body.into_inner();
    let outcome = ask(
        &registry,
        InitVerification {
            user_id: ctx.user.id,
            wallet_type: body.wallet_type,
            default_address: body.default_address,
        },
    )
    .await?;

    let response = match &outcome {
        InitOutcome::Created(proof) => InitVerificationResponse {
            verification_id: proof.verification_id,
            nonce: Some(proof.nonce.clone()),
            status: proof.status,
            already_verified: false,
        },
        InitOutcome::AlreadyVerified(proof) => InitVerificationResponse {
            verification_id: proof.verification_id,
            nonce: None,
            status: proof.status,
            already_verified: true,
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

#[post("/proofs/init-ergopay")]
pub async fn init_verification_ergopay(
    current: CurrentSession,
    body: Option<web::Json<InitErgopayRequest>>,
    registry: web::Data<Addr<RegistryActor>>,
) -> Result<HttpResponse, AuthError> {
    let CurrentSession(ctx) = current;
    let wallet_type = body.and_then(|b| b.into_inner().wallet_type);
    let proof = ask(&registry, InitVerificationErgopay { user_id: ctx.user.id, wallet_type }).await?;
    Ok(HttpResponse::Ok().json(InitVerificationResponse {
        verification_id: proof.verification_id,
        nonce: Some(proof.nonce),
        status: proof.status,
        already_verified: false,
    }))
}

/// Called by the ErgoPay wallet, which holds no session
#[post("/proofs/ergopay/{verification_id}/address")]
pub async fn report_ergopay_address(
    path: web::Path<Uuid>,
    body: web::Json<ErgopayAddressRequest>,
    registry: web::Data<Addr<RegistryActor>>,
) -> Result<HttpResponse, AuthError> {
    let proof = ask(
        &registry,
        ReportErgopayAddress {
            verification_id: path.into_inner(),
            address: body.into_inner().address,
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({
        "verificationId": proof.verification_id,
        "status": proof.status
    })))
}

#[post("/proofs/verify")]
pub async fn verify_proof(
    current: CurrentSession,
    body: web::Json<VerifyProofRequest>,
    registry: web::Data<Addr<RegistryActor>>,
) -> Result<HttpResponse, AuthError> {
    let CurrentSession(ctx) = current;
    let proof = ask(
        &registry,
        VerifyProof {
            user_id: ctx.user.id,
            request: body.into_inner(),
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(VerifyProofResponse {
        verified: true,
        verification_id: proof.verification_id,
        status: proof.status,
    }))
}

#[get("/proofs/{verification_id}")]
pub async fn check_proof_status(
    path: web::Path<Uuid>,
    current: CurrentSession,
    registry: web::Data<Addr<RegistryActor>>,
) -> Result<HttpResponse, AuthError> {
    let CurrentSession(ctx) = current;
    let proof = ask(
        &registry,
        CheckProofStatus {
            user_id: ctx.user.id,
            verification_id: path.into_inner(),
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(ProofView::from(&proof)))
}

/// Ask the oracle about a self-transaction and advance the claim.
///
/// The claim is validated before the oracle is contacted, and the store is
/// never held across the oracle call.
#[post("/proofs/poll-tx")]
pub async fn poll_tx(
    current: CurrentSession,
    body: web::Json<PollTxRequest>,
    registry: web::Data<Addr<RegistryActor>>,
    oracle: web::Data<dyn ConfirmationOracle>,
) -> Result<HttpResponse, AuthError> {
    let CurrentSession(ctx) = current;
    let PollTxRequest { transaction_id, verification_id } = body.into_inner();

    ask(&registry, PreparePoll { user_id: ctx.user.id, verification_id }).await?;
    let num_confirmations = oracle.num_confirmations(&transaction_id).await?;

    let (_, status) = ask(
        &registry,
        RecordConfirmation {
            user_id: ctx.user.id,
            verification_id,
            transaction_id,
            num_confirmations,
        },
    )
    .await?;

    let message = match status {
        PollStatus::Verified => "Address verified",
        PollStatus::Pending => "Waiting for the transaction to appear",
    };
    Ok(HttpResponse::Ok().json(PollTxResponse {
        status,
        num_confirmations,
        message: message.to_string(),
    }))
}

#[get("/proofs")]
pub async fn get_proofs(
    current: CurrentSession,
    registry: web::Data<Addr<RegistryActor>>,
) -> Result<HttpResponse, AuthError> {
    let CurrentSession(ctx) = current;
    let proofs = ask(&registry, GetProofsForUser { user_id: ctx.user.id }).await?;
    let views: Vec<ProofView> = proofs.iter().map(ProofView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[delete("/proofs/{verification_id}")]
pub async fn delete_proof(
    path: web::Path<Uuid>,
    current: CurrentSession,
    registry: web::Data<Addr<RegistryActor>>,
) -> Result<HttpResponse, AuthError> {
    let CurrentSession(ctx) = current;
    ask(
        &registry,
        DeleteProof {
            user_id: ctx.user.id,
            verification_id: path.into_inner(),
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Proof deleted"
    })))
}
