//! Bearer token check for every non-system path.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::middleware::Middleware;
use crate::http::is_system_path;

pub const INVALID_TOKEN_DETAIL: &str = "Invalid or expired token";

/// Rejects requests whose bearer token differs from the configured one with
/// 403. Without a configured token every request passes.
#[derive(Clone)]
pub struct AuthMiddleware {
    token: Option<Arc<str>>,
}

impl AuthMiddleware {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }
}

/// Last whitespace separated piece of the header, so both `Bearer <t>` and a
/// bare `<t>` are accepted.
pub fn presented_token(header: &str) -> Option<&str> {
    header.split_whitespace().last()
}

fn token_matches(expected: &str, presented: Option<&str>) -> bool {
    presented.is_some_and(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())))
}

async fn check(expected: Arc<str>, req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS || is_system_path(req.uri().path()) {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(presented_token);
    if token_matches(&expected, presented) {
        return next.run(req).await;
    }

    debug!(
        component = "auth",
        event = "token_rejected",
        path = req.uri().path(),
        has_token = presented.is_some(),
        "request rejected by bearer auth"
    );
    (StatusCode::FORBIDDEN, Json(json!({"detail": INVALID_TOKEN_DETAIL}))).into_response()
}

impl Middleware for AuthMiddleware {
    fn apply(&self, router: Router) -> Router {
        match &self.token {
            Some(token) => {
                let token = Arc::clone(token);
                router.layer(axum::middleware::from_fn(move |req: Request, next: Next| {
                    check(Arc::clone(&token), req, next)
                }))
            }
            None => router,
        }
    }
}
