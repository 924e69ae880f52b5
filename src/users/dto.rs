use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::repo::{Role, User};

/// Request body for user registration and admin creation. The role comes
/// from the endpoint, never from the body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub fitness_goal: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request body for profile updates. `role` is honored only for Admin
/// callers.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub fitness_goal: Option<String>,
    pub role: Option<Role>,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Outcome message for delete/restore.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Public view of a user. The password hash never leaves the service.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub fitness_goal: Option<String>,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            fitness_goal: user.fitness_goal,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_omits_password_hash() {
        let user = User {
            id: 1,
            username: "alice".into(),
            password_hash: "argon2-secret-material".into(),
            email: "alice@x.com".into(),
            fitness_goal: None,
            role: Role::User,
            created_at: OffsetDateTime::now_utc(),
            is_deleted: false,
        };
        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("alice@x.com"));
        assert!(!json.contains("argon2-secret-material"));
        assert!(!json.contains("password"));
    }
}
