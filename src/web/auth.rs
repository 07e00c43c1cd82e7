//! Request authentication for the HTTP boundary.
//!
//! - Admin routes require the configured token in `X-API-Token`.
//! - Contract routes take the caller identity from `X-Contract-Address`.
//!   Signature verification of that address happens upstream of this service.

use crate::error::VaultError;
use crate::web::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::warn;
use zeroize::Zeroize;

/// Header carrying the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "x-api-token";

/// Header carrying the verified caller identity.
pub const CALLER_HEADER: &str = "x-contract-address";

/// The single admin secret, injected at construction.
pub struct AdminToken(String);

impl AdminToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Constant-time comparison. An empty presented token never matches.
    pub fn verify(&self, presented: &str) -> bool {
        if presented.is_empty() {
            return false;
        }
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

impl Drop for AdminToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken(<redacted>)")
    }
}

/// Middleware: reject admin requests without a valid token.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, VaultError> {
    let presented = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !state.admin_token.verify(presented) {
        warn!(path = %request.uri().path(), "Rejected admin request with invalid token");
        return Err(VaultError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Authenticated caller identity taken from `X-Contract-Address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = VaultError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_owned()))
            .ok_or(VaultError::Unauthorized)
    }
}
