// web-server/src/session_binder.rs
//! Database-backed sessions.
//!
//! The cookie holds nothing but an opaque token. Every request resolves it
//! by store lookup and hydrates the user from the row, so revoking a
//! session takes effect on the very next request. Nothing is ever decoded
//! out of the cookie itself.
//!
//! The inbound cookie and the cookie to set on the response travel together
//! in a `RequestContext` owned by the handler; no per-request state lives in
//! globals.

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest, HttpResponseBuilder};
use actix::Addr;
use chrono::{DateTime, Duration, Utc};
use common::config::{Config, SessionConfig};
use common::models::session::Session;
use common::models::user::User;
use futures_util::future::LocalBoxFuture;
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::AuthError;
use crate::registry::{ask, RegistryActor, ResolveSession};
use crate::store::{self, sessions, users};
use crate::utils::token::create_session_token;

/// A live session and the user it belongs to
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session: Session,
    pub user: User,
}

/// Insert a session row for `user_id` expiring `ttl_seconds` from `now`.
pub fn create(
    conn: &Connection,
    user_id: Uuid,
    wallet_type: Option<&str>,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> store::Result<Session> {
    let swept = sessions::delete_expired(conn, now)?;
    if swept > 0 {
        tracing::debug!("Swept {} expired sessions", swept);
    }

    let session = Session {
        id: Uuid::new_v4(),
        session_token: create_session_token(),
        user_id,
        wallet_type: wallet_type.map(str::to_string),
        expires: now + Duration::seconds(ttl_seconds),
        created_at: now,
    };
    sessions::insert(conn, &session)?;
    Ok(session)
}

/// Look up `token`. Expired rows are deleted and read as absent.
pub fn resolve(conn: &Connection, token: &str, now: DateTime<Utc>) -> store::Result<Option<SessionContext>> {
    let Some(session) = sessions::get_by_token(conn, token)? else {
        return Ok(None);
    };

    if session.is_expired(now) {
        sessions::delete_by_token(conn, token)?;
        tracing::debug!("Dropped expired session {}", session.id);
        return Ok(None);
    }

    Ok(users::get(conn, session.user_id)?.map(|user| SessionContext { session, user }))
}

/// Delete the session behind `token`. Returns whether one existed.
pub fn revoke(conn: &Connection, token: &str) -> store::Result<bool> {
    sessions::delete_by_token(conn, token)
}

/// Live sessions of `user_id`, newest first.
pub fn list(conn: &Connection, user_id: Uuid, now: DateTime<Utc>) -> store::Result<Vec<Session>> {
    let mut live: Vec<Session> = sessions::list_for_user(conn, user_id)?
        .into_iter()
        .filter(|s| !s.is_expired(now))
        .collect();
    live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(live)
}

/// Delete one of `user_id`'s sessions by public id.
pub fn revoke_for_user(conn: &Connection, user_id: Uuid, session_id: Uuid) -> store::Result<bool> {
    sessions::delete_for_user(conn, user_id, session_id)
}

/// Per-request session I/O.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// Token read from the inbound cookie
    pub session_token: Option<String>,
    /// Cookie to attach to the response
    pub set_cookie: Option<Cookie<'static>>,
}

impl RequestContext {
    pub fn from_request(req: &HttpRequest, config: &SessionConfig) -> Self {
        Self {
            session_token: req
                .cookie(&config.cookie_name)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty()),
            set_cookie: None,
        }
    }

    /// Point the response cookie at `session`. The token is written verbatim.
    pub fn bind(&mut self, session: &Session, config: &SessionConfig) {
        let max_age = (session.expires - session.created_at).num_seconds().max(0);
        let cookie = Cookie::build(config.cookie_name.clone(), session.session_token.clone())
            .path("/")
            .secure(config.secure_cookie)
            .http_only(true)
            .same_site(SameSite::Strict)
            .max_age(CookieDuration::seconds(max_age))
            .finish();
        self.session_token = Some(session.session_token.clone());
        self.set_cookie = Some(cookie);
    }

    /// Expire the session cookie on the client
    pub fn clear(&mut self, config: &SessionConfig) {
        let cookie = Cookie::build(config.cookie_name.clone(), "")
            .path("/")
            .secure(config.secure_cookie)
            .http_only(true)
            .same_site(SameSite::Strict)
            .max_age(CookieDuration::seconds(0))
            .finish();
        self.session_token = None;
        self.set_cookie = Some(cookie);
    }

    /// Attach the outbound cookie, if any
    pub fn apply(self, mut builder: HttpResponseBuilder) -> HttpResponseBuilder {
        if let Some(cookie) = self.set_cookie {
            builder.cookie(cookie);
        }
        builder
    }
}

/// Extractor for routes that require a signed-in user.
///
/// Rejects with `401` when the cookie is missing, unknown or expired.
pub struct CurrentSession(pub SessionContext);

impl FromRequest for CurrentSession {
    type Error = AuthError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let registry = req.app_data::<web::Data<Addr<RegistryActor>>>().cloned();
        let token = req
            .app_data::<web::Data<Config>>()
            .and_then(|config| RequestContext::from_request(req, &config.session).session_token);

        Box::pin(async move {
            let registry = registry
                .ok_or_else(|| AuthError::Internal("registry not configured".to_string()))?;
            let token = token.ok_or(AuthError::Unauthenticated)?;
            ask(&registry, ResolveSession { token })
                .await?
                .map(CurrentSession)
                .ok_or(AuthError::Unauthenticated)
        })
    }
}
