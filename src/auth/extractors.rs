use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::auth::token::TokenCodec;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::Role;

/// Validated identity of the caller, extracted from the Bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::TokenMalformed)?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(ApiError::TokenMalformed)?;

        let codec = TokenCodec::from_ref(state);
        let claims = codec.validate(token)?;

        Ok(AuthUser {
            id: claims.account_id()?,
            role: claims.role,
        })
    }
}
