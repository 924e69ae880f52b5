use tracing::{info, warn};

use crate::auth::password::{dummy_verify, verify_password};
use crate::auth::token::TokenCodec;
use crate::error::ApiError;
use crate::users::repo::UserStore;

/// Verifies credentials and issues a session token. An unknown username and a
/// wrong password are indistinguishable to the caller: same outcome, and the
/// unknown-username path still pays for one argon2 verification.
pub async fn authenticate(
    store: &dyn UserStore,
    codec: &TokenCodec,
    username: &str,
    password: &str,
) -> Result<String, ApiError> {
    let user = match store.get_by_username(username).await? {
        Some(user) => user,
        None => {
            dummy_verify(password);
            warn!(username, "login for unknown username");
            return Err(ApiError::InvalidCredentials);
        }
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = user.id, "login with invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = codec.issue(&user)?;
    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(token)
}
