use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Domain and infrastructure failure taxonomy. Domain outcomes are returned
/// as values all the way to the boundary; only the boundary turns them into
/// status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Email already in use")]
    DuplicateEmail,
    #[error("User not found")]
    NotFound,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token signature")]
    TokenInvalidSignature,
    #[error("Malformed token")]
    TokenMalformed,
    #[error("Forbidden")]
    Forbidden,
    #[error("Upstream service unavailable")]
    TransientIo(#[source] anyhow::Error),
    #[error("Internal server error")]
    Unexpected(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateUsername | Self::DuplicateEmail => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidCredentials
            | Self::TokenExpired
            | Self::TokenInvalidSignature
            | Self::TokenMalformed => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::TransientIo(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_token_failure(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired | Self::TokenInvalidSignature | Self::TokenMalformed
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Full detail stays server-side; clients get the safe message only.
        match &self {
            ApiError::Unexpected(e) => error!(error = ?e, "unhandled failure"),
            ApiError::TransientIo(e) => error!(error = ?e, "transient io failure"),
            // A bad signature means someone presented a tampered token.
            ApiError::TokenInvalidSignature => error!("token signature mismatch"),
            ApiError::TokenExpired | ApiError::TokenMalformed => {
                warn!(error = %self, "token rejected")
            }
            _ => {}
        }

        let status = self.status();
        let body = Json(json!({ "message": self.to_string() }));
        let mut response = (status, body).into_response();
        if self.is_token_failure() {
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache"),
            );
        }
        response
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::Unexpected(anyhow::Error::new(other).context("database error")),
        }
    }
}
