// web-server/src/api/auth.rs
use actix::Addr;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use common::config::Config;
use common::messages::{CredentialsRequest, NonceRequest, SessionResponse, SessionUser};
use serde_json::json;

use crate::credentials::Credentials;
use crate::error::AuthError;
use crate::registry::{ask, Authenticate, IssueNonce, RegistryActor, ResolveSession, RevokeSession};
use crate::session_binder::RequestContext;

#[get("/")]
pub async fn api_index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "name": "Launchpad Auth API",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Issue a sign-in challenge. The body is optional.
#[post("/auth/nonce")]
pub async fn issue_nonce(
    body: Option<web::Json<NonceRequest>>,
    registry: web::Data<Addr<RegistryActor>>,
) -> Result<HttpResponse, AuthError> {
    let reward_address = body.and_then(|b| b.into_inner().reward_address);
    let issued = ask(&registry, IssueNonce { reward_address }).await?;
    Ok(HttpResponse::Ok().json(issued))
}

/// Exchange a signed nonce for a session cookie
#[post("/auth/callback/credentials")]
pub async fn credentials_callback(
    req: HttpRequest,
    body: web::Json<CredentialsRequest>,
    registry: web::Data<Addr<RegistryActor>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AuthError> {
    let credentials = Credentials::from_request(&body)?;
    let sign_in = ask(&registry, Authenticate { credentials }).await?;

    let mut ctx = RequestContext::from_request(&req, &config.session);
    ctx.bind(&sign_in.session, &config.session);

    let response = SessionResponse {
        user: SessionUser::from_user(&sign_in.user, sign_in.session.wallet_type.clone()),
        expires: sign_in.session.expires,
    };
    Ok(ctx.apply(HttpResponse::Ok()).json(response))
}

/// Current session, or `null` when signed out
#[get("/auth/session")]
pub async fn get_session(
    req: HttpRequest,
    registry: web::Data<Addr<RegistryActor>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AuthError> {
    let mut ctx = RequestContext::from_request(&req, &config.session);
    let Some(token) = ctx.session_token.clone() else {
        return Ok(HttpResponse::Ok().json(serde_json::Value::Null));
    };

    match ask(&registry, ResolveSession { token }).await? {
        Some(session) => Ok(HttpResponse::Ok().json(SessionResponse {
            user: SessionUser::from_user(&session.user, session.session.wallet_type.clone()),
            expires: session.session.expires,
        })),
        None => {
            // Stale cookie; drop it client-side too
            ctx.clear(&config.session);
            Ok(ctx.apply(HttpResponse::Ok()).json(serde_json::Value::Null))
        }
    }
}

#[post("/auth/signout")]
pub async fn sign_out(
    req: HttpRequest,
    registry: web::Data<Addr<RegistryActor>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AuthError> {
    let mut ctx = RequestContext::from_request(&req, &config.session);
    if let Some(token) = ctx.session_token.clone() {
        if ask(&registry, RevokeSession { token }).await? {
            tracing::info!("Session signed out");
        }
    }
    ctx.clear(&config.session);
    Ok(ctx.apply(HttpResponse::Ok()).json(json!({
        "status": "success",
        "message": "Signed out"
    })))
}
