// web-server/src/middleware/rate_limiter.rs
//! Sliding-window limiter for the unauthenticated entry points (nonce
//! issue, ErgoPay address reports) that create or touch rows without a
//! session.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::{header, StatusCode},
    Error, ResponseError,
    HttpResponse
};
use common::config::RateLimitConfig;
use dashmap::DashMap;
use futures_util::future::{LocalBoxFuture, Ready, ready};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
#[error("Rate limit exceeded")]
struct RateLimitExceeded {
    retry_after: u64,
}

impl ResponseError for RateLimitExceeded {
    fn status_code(&self) -> StatusCode {
        StatusCode::TOO_MANY_REQUESTS
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .append_header((header::RETRY_AFTER, self.retry_after.to_string()))
            .json(json!({
                "error": "Rate limit exceeded. Please try again later.",
                "code": "rate_limited"
            }))
    }
}

/// Per-client request timestamps for the limited path prefixes
#[derive(Debug, Clone)]
pub struct RateLimiter {
    paths: Arc<Vec<String>>,
    max_requests: usize,
    window: Duration,
    trust_forwarded_headers: bool,
    hits: Arc<DashMap<String, Vec<Instant>>>,
    last_prune: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            paths: Arc::new(config.paths.clone()),
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_seconds),
            trust_forwarded_headers: config.trust_forwarded_headers,
            hits: Arc::new(DashMap::new()),
            last_prune: Arc::new(Mutex::new(Instant::now())),
        }
    }

    fn applies_to(&self, path: &str) -> bool {
        self.paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Client key: the socket peer, or the forwarded client address when
    /// the deployment says a proxy sets it.
    fn client_key(&self, req: &ServiceRequest) -> String {
        if self.trust_forwarded_headers {
            if let Some(ip) = req.connection_info().realip_remote_addr() {
                return ip.to_string();
            }
        }
        req.peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Record a hit for `client` at `now`; true if it is over the limit
    fn is_rate_limited(&self, client: &str, now: Instant) -> bool {
        self.maybe_prune(now);

        let mut entry = self.hits.entry(client.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < self.window);

        if entry.len() >= self.max_requests {
            true
        } else {
            entry.push(now);
            false
        }
    }

    /// Drop clients with no hits left in the window, at most once per window
    fn maybe_prune(&self, now: Instant) {
        let Ok(mut last) = self.last_prune.lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < self.window {
            return;
        }
        *last = now;
        drop(last);

        self.hits.retain(|_, hits| {
            hits.retain(|t| now.duration_since(*t) < self.window);
            !hits.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.hits.len()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimiterMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimiterMiddleware {
            service,
            limiter: self.clone(),
        }))
    }
}

pub struct RateLimiterMiddleware<S> {
    service: S,
    limiter: RateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.limiter.applies_to(req.path()) {
            let ip = self.limiter.client_key(&req);

            if self.limiter.is_rate_limited(&ip, Instant::now()) {
                tracing::warn!("Rate limit exceeded for IP {} on {}", ip, req.path());
                let retry_after = self.limiter.window.as_secs();
                return Box::pin(async move {
                    Err(RateLimitExceeded { retry_after }.into())
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            fut.await
        })
    }
}
