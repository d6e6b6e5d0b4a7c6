//! HTTP Basic Authentication for admin routes.
//!
//! The admin gate is a single shared password. Any username is accepted.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

/// Authentication configuration
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Admin password (None = auth disabled)
    pub password: Option<String>,
}

impl AuthConfig {
    /// Load auth config from ADMIN_PASSWORD
    pub fn from_env() -> Self {
        let password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if password.is_some() {
            tracing::info!("Admin authentication enabled");
        } else {
            tracing::warn!("Admin authentication DISABLED - anyone can edit the catalog!");
        }

        Self { password }
    }

    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.password.is_some()
    }

    pub fn validate(&self, password: &str) -> bool {
        match &self.password {
            Some(expected) => constant_time_eq(expected.as_bytes(), password.as_bytes()),
            None => true,
        }
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Password from a `Basic` Authorization header
fn basic_auth_password(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (_username, password) = credentials.split_once(':')?;
    Some(password.to_string())
}

/// Middleware guarding the admin routes
pub async fn admin_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_config.is_enabled() {
        return next.run(request).await;
    }

    if let Some(password) = basic_auth_password(request.headers()) {
        if auth_config.validate(&password) {
            return next.run(request).await;
        }
    }

    tracing::warn!("Rejected admin request to {}", request.uri().path());
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"CoupleConvo Admin\"")],
        "Unauthorized",
    )
        .into_response()
}
