// web-server/src/api/sessions.rs
use actix::Addr;
use actix_web::{delete, get, web, HttpResponse};
use common::config::Config;
use common::models::session::SessionSummary;
use serde_json::json;
use uuid::Uuid;

use crate::error::AuthError;
use crate::registry::{ask, ListSessions, RegistryActor, RevokeSessionById};
use crate::session_binder::{CurrentSession, RequestContext};

/// The caller's signed-in devices
#[get("/sessions")]
pub async fn list_sessions(
    current: CurrentSession,
    registry: web::Data<Addr<RegistryActor>>,
) -> Result<HttpResponse, AuthError> {
    let CurrentSession(ctx) = current;
    let sessions = ask(&registry, ListSessions { user_id: ctx.user.id }).await?;
    let summaries: Vec<SessionSummary> = sessions
        .iter()
        .map(|s| SessionSummary::from_session(s, ctx.session.id))
        .collect();
    Ok(HttpResponse::Ok().json(summaries))
}

/// Revoke one of the caller's sessions
#[delete("/sessions/{session_id}")]
pub async fn revoke_session(
    path: web::Path<Uuid>,
    current: CurrentSession,
    registry: web::Data<Addr<RegistryActor>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AuthError> {
    let CurrentSession(ctx) = current;
    let session_id = path.into_inner();

    if !ask(&registry, RevokeSessionById { user_id: ctx.user.id, session_id }).await? {
        return Err(AuthError::NotFound("session"));
    }
    tracing::info!("User {} revoked session {}", ctx.user.id, session_id);

    let mut out = RequestContext::default();
    if session_id == ctx.session.id {
        out.clear(&config.session);
    }
    Ok(out.apply(HttpResponse::Ok()).json(json!({
        "status": "success",
        "message": "Session revoked"
    })))
}
