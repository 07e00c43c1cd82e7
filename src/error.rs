use std::time::Duration;
use thiserror::Error;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Key not found")]
    NotFound,

    #[error("Caller not authorized to use this key")]
    Forbidden,

    #[error("Rate limit exceeded, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Authentication required")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Denials that are the caller's own business: unknown service,
    /// excluded caller, exhausted quota.
    pub fn is_caller_denial(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Forbidden | Self::RateLimited { .. }
        )
    }

    /// Corrupted state or master-secret mismatch. Operators need to hear about these.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Config(_))
    }
}

/// Result type alias using VaultError
pub type VaultResult<T> = Result<T, VaultError>;

impl From<axum::extract::rejection::JsonRejection> for VaultError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for VaultError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

/// Convert VaultError to HTTP status codes for web responses
impl VaultError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for VaultError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::{header, HeaderValue};

        let status = self.status_code();
        // Internal details stay in the logs.
        let message = if self.is_internal() {
            "Internal error".to_string()
        } else {
            self.to_string()
        };
        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });
        let mut response = (status, axum::Json(body)).into_response();
        if let Self::RateLimited { retry_after } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_status_codes() {
        assert_eq!(VaultError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(VaultError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(VaultError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(VaultError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            VaultError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let err = VaultError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()["retry-after"], "42");
    }

    #[test]
    fn test_denial_classes() {
        assert!(VaultError::Forbidden.is_caller_denial());
        assert!(VaultError::NotFound.is_caller_denial());
        assert!(!VaultError::internal("bad tag").is_caller_denial());
        assert!(VaultError::internal("bad tag").is_internal());
        assert!(!VaultError::Forbidden.is_internal());
    }
}
