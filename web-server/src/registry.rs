// web-server/src/registry.rs
//! Actor front for the store.
//!
//! SQLite calls block, so the store is driven from a `SyncArbiter` pool of
//! `RegistryActor`s. HTTP handlers talk to it with typed messages; each
//! handler runs one flow against the shared connection.

use actix::dev::ToEnvelope;
use actix::{Actor, Addr, Handler, Message, SyncContext};
use chrono::Utc;
use common::config::Config;
use common::messages::{NonceResponse, PollStatus, VerifyProofRequest};
use common::models::ergo_proof::ErgoProof;
use common::models::session::Session;
use std::sync::Arc;
use uuid::Uuid;

use crate::credentials::{self, Credentials, SignIn};
use crate::ergo_proof::{self, InitOutcome};
use crate::error::AuthError;
use crate::nonce;
use crate::session_binder::{self, SessionContext};
use crate::store::Store;

/// Actor message: Issue a sign-in nonce
#[derive(Message)]
#[rtype(result = "Result<NonceResponse, AuthError>")]
pub struct IssueNonce {
    pub reward_address: Option<String>,
}

/// Actor message: Verify credentials and open a session
#[derive(Message)]
#[rtype(result = "Result<SignIn, AuthError>")]
pub struct Authenticate {
    pub credentials: Credentials,
}

/// Actor message: Resolve a session cookie token
#[derive(Message)]
#[rtype(result = "Result<Option<SessionContext>, AuthError>")]
pub struct ResolveSession {
    pub token: String,
}

/// Actor message: Revoke the session behind a token
#[derive(Message)]
#[rtype(result = "Result<bool, AuthError>")]
pub struct RevokeSession {
    pub token: String,
}

/// Actor message: List a user's live sessions
#[derive(Message)]
#[rtype(result = "Result<Vec<Session>, AuthError>")]
pub struct ListSessions {
    pub user_id: Uuid,
}

/// Actor message: Revoke one of a user's sessions by id
#[derive(Message)]
#[rtype(result = "Result<bool, AuthError>")]
pub struct RevokeSessionById {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

/// Actor message: Start a dApp-connector address claim
#[derive(Message)]
#[rtype(result = "Result<InitOutcome, AuthError>")]
pub struct InitVerification {
    pub user_id: Uuid,
    pub wallet_type: String,
    pub default_address: String,
}

/// Actor message: Start an ErgoPay address claim
#[derive(Message)]
#[rtype(result = "Result<ErgoProof, AuthError>")]
pub struct InitVerificationErgopay {
    pub user_id: Uuid,
    pub wallet_type: Option<String>,
}

/// Actor message: Attach the address an ErgoPay wallet reported
#[derive(Message)]
#[rtype(result = "Result<ErgoProof, AuthError>")]
pub struct ReportErgopayAddress {
    pub verification_id: Uuid,
    pub address: String,
}

/// Actor message: Check a signed proof and finish the claim
#[derive(Message)]
#[rtype(result = "Result<ErgoProof, AuthError>")]
pub struct VerifyProof {
    pub user_id: Uuid,
    pub request: VerifyProofRequest,
}

/// Actor message: Read one of a user's claims
#[derive(Message)]
#[rtype(result = "Result<ErgoProof, AuthError>")]
pub struct CheckProofStatus {
    pub user_id: Uuid,
    pub verification_id: Uuid,
}

/// Actor message: Load a claim that a transaction poll may act on
#[derive(Message)]
#[rtype(result = "Result<ErgoProof, AuthError>")]
pub struct PreparePoll {
    pub user_id: Uuid,
    pub verification_id: Uuid,
}

/// Actor message: Apply a confirmation count to a claim
#[derive(Message)]
#[rtype(result = "Result<(ErgoProof, PollStatus), AuthError>")]
pub struct RecordConfirmation {
    pub user_id: Uuid,
    pub verification_id: Uuid,
    pub transaction_id: String,
    pub num_confirmations: i64,
}

/// Actor message: List a user's claims
#[derive(Message)]
#[rtype(result = "Result<Vec<ErgoProof>, AuthError>")]
pub struct GetProofsForUser {
    pub user_id: Uuid,
}

/// Actor message: Delete one of a user's claims
#[derive(Message)]
#[rtype(result = "Result<(), AuthError>")]
pub struct DeleteProof {
    pub user_id: Uuid,
    pub verification_id: Uuid,
}

/// Store worker. Cheap to clone; all workers share one connection.
#[derive(Clone)]
pub struct RegistryActor {
    store: Store,
    config: Arc<Config>,
}

impl RegistryActor {
    pub fn new(store: Store, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    fn proof_ttl(&self) -> i64 {
        self.config.proofs.ttl_seconds()
    }
}

impl Actor for RegistryActor {
    type Context = SyncContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::debug!("Registry worker started");
    }
}

/// Send `msg` and flatten mailbox failures into `AuthError`
pub async fn ask<M, T>(registry: &Addr<RegistryActor>, msg: M) -> Result<T, AuthError>
where
    M: Message<Result = Result<T, AuthError>> + Send + 'static,
    T: Send + 'static,
    RegistryActor: Handler<M>,
    SyncContext<RegistryActor>: ToEnvelope<RegistryActor, M>,
{
    registry.send(msg).await.map_err(|e| {
        tracing::error!("Registry mailbox error: {}", e);
        AuthError::Internal(e.to_string())
    })?
}

impl Handler<IssueNonce> for RegistryActor {
    type Result = Result<NonceResponse, AuthError>;

    fn handle(&mut self, msg: IssueNonce, _: &mut Self::Context) -> Self::Result {
        let ttl = self.config.auth.pending_user_ttl_seconds();
        Ok(self
            .store
            .with_conn(|conn| nonce::issue(conn, msg.reward_address.as_deref(), Utc::now(), ttl))?)
    }
}

impl Handler<Authenticate> for RegistryActor {
    type Result = Result<SignIn, AuthError>;

    fn handle(&mut self, msg: Authenticate, _: &mut Self::Context) -> Self::Result {
        let ttl = self.config.session.ttl_seconds();
        self.store
            .run(|conn| credentials::authenticate(conn, &msg.credentials, Utc::now(), ttl))
    }
}

impl Handler<ResolveSession> for RegistryActor {
    type Result = Result<Option<SessionContext>, AuthError>;

    fn handle(&mut self, msg: ResolveSession, _: &mut Self::Context) -> Self::Result {
        Ok(self
            .store
            .with_conn(|conn| session_binder::resolve(conn, &msg.token, Utc::now()))?)
    }
}

impl Handler<RevokeSession> for RegistryActor {
    type Result = Result<bool, AuthError>;

    fn handle(&mut self, msg: RevokeSession, _: &mut Self::Context) -> Self::Result {
        Ok(self.store.with_conn(|conn| session_binder::revoke(conn, &msg.token))?)
    }
}

impl Handler<ListSessions> for RegistryActor {
    type Result = Result<Vec<Session>, AuthError>;

    fn handle(&mut self, msg: ListSessions, _: &mut Self::Context) -> Self::Result {
        Ok(self
            .store
            .with_conn(|conn| session_binder::list(conn, msg.user_id, Utc::now()))?)
    }
}

impl Handler<RevokeSessionById> for RegistryActor {
    type Result = Result<bool, AuthError>;

    fn handle(&mut self, msg: RevokeSessionById, _: &mut Self::Context) -> Self::Result {
        Ok(self
            .store
            .with_conn(|conn| session_binder::revoke_for_user(conn, msg.user_id, msg.session_id))?)
    }
}

impl Handler<InitVerification> for RegistryActor {
    type Result = Result<InitOutcome, AuthError>;

    fn handle(&mut self, msg: InitVerification, _: &mut Self::Context) -> Self::Result {
        let ttl = self.proof_ttl();
        self.store.run(|conn| {
            ergo_proof::init_verification(
                conn,
                msg.user_id,
                &msg.wallet_type,
                &msg.default_address,
                Utc::now(),
                ttl,
            )
        })
    }
}

impl Handler<InitVerificationErgopay> for RegistryActor {
    type Result = Result<ErgoProof, AuthError>;

    fn handle(&mut self, msg: InitVerificationErgopay, _: &mut Self::Context) -> Self::Result {
        let ttl = self.proof_ttl();
        self.store.run(|conn| {
            ergo_proof::init_verification_ergopay(conn, msg.user_id, msg.wallet_type.as_deref(), Utc::now(), ttl)
        })
    }
}

impl Handler<ReportErgopayAddress> for RegistryActor {
    type Result = Result<ErgoProof, AuthError>;

    fn handle(&mut self, msg: ReportErgopayAddress, _: &mut Self::Context) -> Self::Result {
        let ttl = self.proof_ttl();
        self.store.run(|conn| {
            ergo_proof::report_ergopay_address(conn, msg.verification_id, &msg.address, Utc::now(), ttl)
        })
    }
}

impl Handler<VerifyProof> for RegistryActor {
    type Result = Result<ErgoProof, AuthError>;

    fn handle(&mut self, msg: VerifyProof, _: &mut Self::Context) -> Self::Result {
        let ttl = self.proof_ttl();
        self.store
            .run(|conn| ergo_proof::verify_proof(conn, msg.user_id, &msg.request, Utc::now(), ttl))
    }
}

impl Handler<CheckProofStatus> for RegistryActor {
    type Result = Result<ErgoProof, AuthError>;

    fn handle(&mut self, msg: CheckProofStatus, _: &mut Self::Context) -> Self::Result {
        let ttl = self.proof_ttl();
        self.store.run(|conn| {
            ergo_proof::check_proof_status(conn, msg.user_id, msg.verification_id, Utc::now(), ttl)
        })
    }
}

impl Handler<PreparePoll> for RegistryActor {
    type Result = Result<ErgoProof, AuthError>;

    fn handle(&mut self, msg: PreparePoll, _: &mut Self::Context) -> Self::Result {
        let ttl = self.proof_ttl();
        self.store
            .run(|conn| ergo_proof::pollable_proof(conn, msg.user_id, msg.verification_id, Utc::now(), ttl))
    }
}

impl Handler<RecordConfirmation> for RegistryActor {
    type Result = Result<(ErgoProof, PollStatus), AuthError>;

    fn handle(&mut self, msg: RecordConfirmation, _: &mut Self::Context) -> Self::Result {
        let ttl = self.proof_ttl();
        self.store.run(|conn| {
            ergo_proof::record_confirmation(
                conn,
                msg.user_id,
                msg.verification_id,
                &msg.transaction_id,
                msg.num_confirmations,
                Utc::now(),
                ttl,
            )
        })
    }
}

impl Handler<GetProofsForUser> for RegistryActor {
    type Result = Result<Vec<ErgoProof>, AuthError>;

    fn handle(&mut self, msg: GetProofsForUser, _: &mut Self::Context) -> Self::Result {
        let ttl = self.proof_ttl();
        self.store
            .run(|conn| ergo_proof::get_proofs_for_user(conn, msg.user_id, Utc::now(), ttl))
    }
}

impl Handler<DeleteProof> for RegistryActor {
    type Result = Result<(), AuthError>;

    fn handle(&mut self, msg: DeleteProof, _: &mut Self::Context) -> Self::Result {
        self.store
            .run(|conn| ergo_proof::delete_item(conn, msg.user_id, msg.verification_id))
    }
}
