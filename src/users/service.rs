use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::auth::password::hash_password;
use crate::error::ApiError;
use crate::notify::{EventPublisher, LifecycleAction, LifecycleEvent};
use crate::users::repo::{NewUser, Role, StoredChanges, User, UserStore};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Registration input after boundary binding; `role` is decided by the
/// endpoint (register vs create-admin), never by the request body.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: String,
    pub fitness_goal: Option<String>,
}

/// Self-service editable fields plus the admin-only `role`. The boundary
/// rejects a `role` change from non-admin callers before this ever runs.
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub email: Option<String>,
    pub password: Option<String>,
    pub fitness_goal: Option<String>,
    pub role: Option<Role>,
}

fn validate_new_account(input: &NewAccount) -> Result<(), ApiError> {
    if input.username.trim().is_empty() {
        return Err(ApiError::validation("Username must not be empty"));
    }
    if !is_valid_email(&input.email) {
        return Err(ApiError::validation("Invalid email"));
    }
    if input.password.len() < 8 {
        return Err(ApiError::validation("Password too short"));
    }
    Ok(())
}

pub async fn create_user(
    store: &dyn UserStore,
    input: NewAccount,
    role: Role,
) -> Result<User, ApiError> {
    validate_new_account(&input)?;

    // Advisory fast path; the unique indexes remain the real guard and the
    // store maps their violations to the same duplicate errors.
    if store.username_exists(&input.username).await? {
        warn!(username = %input.username, "username already registered");
        return Err(ApiError::DuplicateUsername);
    }
    if store.email_exists(&input.email).await? {
        warn!(email = %input.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let password_hash = hash_password(&input.password)?;
    let user = store
        .create(NewUser {
            username: input.username,
            password_hash,
            email: input.email,
            fitness_goal: input.fitness_goal,
            role,
        })
        .await?;

    info!(user_id = user.id, username = %user.username, role = ?user.role, "user created");
    Ok(user)
}

pub async fn update_user(
    store: &dyn UserStore,
    id: i64,
    changes: AccountChanges,
) -> Result<User, ApiError> {
    let current = store.get_by_id(id).await?.ok_or(ApiError::NotFound)?;

    // Empty strings mean "leave unchanged".
    let email = changes.email.filter(|e| !e.is_empty());
    let password = changes.password.filter(|p| !p.is_empty());
    let fitness_goal = changes.fitness_goal.filter(|g| !g.is_empty());

    if let Some(new_email) = &email {
        if !is_valid_email(new_email) {
            return Err(ApiError::validation("Invalid email"));
        }
        if *new_email != current.email {
            if let Some(other) = store.get_by_email(new_email).await? {
                if other.id != id {
                    warn!(user_id = id, "email already in use");
                    return Err(ApiError::DuplicateEmail);
                }
            }
        }
    }

    if let Some(p) = &password {
        if p.len() < 8 {
            return Err(ApiError::validation("Password too short"));
        }
    }
    let password_hash = password.map(|p| hash_password(&p)).transpose()?;

    let updated = store
        .update(
            id,
            StoredChanges {
                email,
                password_hash,
                fitness_goal,
                role: changes.role,
            },
        )
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(user_id = id, "user updated");
    Ok(updated)
}

/// Flips the account to Deleted, then emits one `SoftDelete` event. The flag
/// is persisted before the publish; a transport failure surfaces to the
/// caller but does not revert the committed state.
pub async fn soft_delete_user(
    store: &dyn UserStore,
    queue: &dyn EventPublisher,
    id: i64,
) -> Result<(), ApiError> {
    let affected = store.soft_delete(id).await?;
    if affected == 0 {
        // Absent or already deleted; zero effect is reported as failure so
        // callers can tell nothing changed.
        return Err(ApiError::NotFound);
    }

    let event = LifecycleEvent::now(id, LifecycleAction::SoftDelete);
    if let Err(e) = queue.publish(&event).await {
        warn!(user_id = id, "account deactivated but event publish failed");
        return Err(e);
    }

    info!(user_id = id, "user deactivated");
    Ok(())
}

/// Mirror of `soft_delete_user`: Deleted back to Active plus one `Restore`
/// event.
pub async fn restore_user(
    store: &dyn UserStore,
    queue: &dyn EventPublisher,
    id: i64,
) -> Result<(), ApiError> {
    let affected = store.restore(id).await?;
    if affected == 0 {
        return Err(ApiError::NotFound);
    }

    let event = LifecycleEvent::now(id, LifecycleAction::Restore);
    if let Err(e) = queue.publish(&event).await {
        warn!(user_id = id, "account restored but event publish failed");
        return Err(e);
    }

    info!(user_id = id, "user restored");
    Ok(())
}

pub async fn get_user(store: &dyn UserStore, id: i64) -> Result<User, ApiError> {
    store.get_by_id(id).await?.ok_or(ApiError::NotFound)
}

pub async fn list_active_users(store: &dyn UserStore) -> Result<Vec<User>, ApiError> {
    store.list_active().await
}

pub async fn list_deleted_users(store: &dyn UserStore) -> Result<Vec<User>, ApiError> {
    store.list_deleted().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::auth::service::authenticate;
    use crate::auth::token::TokenCodec;
    use crate::notify::testing::RecordingPublisher;
    use crate::users::repo::testing::MemStore;
    use std::sync::atomic::Ordering;

    fn alice() -> NewAccount {
        NewAccount {
            username: "alice".into(),
            password: "Secret123!".into(),
            email: "alice@x.com".into(),
            fitness_goal: Some("lose weight".into()),
        }
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let store = MemStore::new();
        let mut input = alice();
        input.email = "not-an-email".into();
        let err = create_user(&store, input, Role::User).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let mut input = alice();
        input.password = "short".into();
        let err = create_user(&store, input, Role::User).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_username_leaves_one_row() {
        let store = MemStore::new();
        create_user(&store, alice(), Role::User).await.unwrap();

        let mut second = alice();
        second.email = "other@x.com".into();
        let err = create_user(&store, second, Role::User).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateUsername));
        assert_eq!(store.row_count("alice"), 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_its_own_failure() {
        let store = MemStore::new();
        create_user(&store, alice(), Role::User).await.unwrap();

        let mut second = alice();
        second.username = "bob".into();
        let err = create_user(&store, second, Role::User).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateEmail));
    }

    #[tokio::test]
    async fn update_applies_only_provided_fields() {
        let store = MemStore::new();
        let user = create_user(&store, alice(), Role::User).await.unwrap();

        let updated = update_user(
            &store,
            user.id,
            AccountChanges {
                fitness_goal: Some("run a marathon".into()),
                // Empty strings are treated as absent.
                email: Some(String::new()),
                password: Some(String::new()),
                role: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.email, "alice@x.com");
        assert_eq!(updated.fitness_goal.as_deref(), Some("run a marathon"));
        assert!(verify_password("Secret123!", &updated.password_hash).unwrap());
    }

    #[tokio::test]
    async fn update_rehashes_password() {
        let store = MemStore::new();
        let user = create_user(&store, alice(), Role::User).await.unwrap();

        let updated = update_user(
            &store,
            user.id,
            AccountChanges {
                password: Some("NewSecret9!".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(verify_password("NewSecret9!", &updated.password_hash).unwrap());
        assert!(!verify_password("Secret123!", &updated.password_hash).unwrap());
    }

    #[tokio::test]
    async fn admin_gated_role_change_is_applied() {
        let store = MemStore::new();
        let user = create_user(&store, alice(), Role::User).await.unwrap();

        // The boundary only lets this through for Admin callers.
        let updated = update_user(
            &store,
            user.id,
            AccountChanges {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.role, Role::Admin);
        assert_eq!(
            store.get_by_id(user.id).await.unwrap().unwrap().role,
            Role::Admin
        );
    }

    #[tokio::test]
    async fn update_email_excludes_own_row_from_uniqueness() {
        let store = MemStore::new();
        let user = create_user(&store, alice(), Role::User).await.unwrap();
        let mut bob = alice();
        bob.username = "bob".into();
        bob.email = "bob@x.com".into();
        create_user(&store, bob, Role::User).await.unwrap();

        // Re-submitting the current email is not a conflict.
        let ok = update_user(
            &store,
            user.id,
            AccountChanges {
                email: Some("alice@x.com".into()),
                ..Default::default()
            },
        )
        .await;
        assert!(ok.is_ok());

        // Taking bob's email is.
        let err = update_user(
            &store,
            user.id,
            AccountChanges {
                email: Some("bob@x.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateEmail));
    }

    #[tokio::test]
    async fn soft_delete_transitions_and_emits_exactly_one_event() {
        let store = MemStore::new();
        let queue = RecordingPublisher::new();
        let user = create_user(&store, alice(), Role::User).await.unwrap();

        soft_delete_user(&store, &queue, user.id).await.unwrap();

        assert!(store.get_by_id(user.id).await.unwrap().is_none());
        assert!(store.list_active().await.unwrap().is_empty());
        assert_eq!(store.list_deleted().await.unwrap().len(), 1);

        let events = queue.recorded();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id, user.id);
        assert_eq!(events[0].action, LifecycleAction::SoftDelete);

        // Deleting again reports failure and emits nothing.
        let err = soft_delete_user(&store, &queue, user.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        assert_eq!(queue.recorded().len(), 1);
    }

    #[tokio::test]
    async fn restore_reverses_the_transition() {
        let store = MemStore::new();
        let queue = RecordingPublisher::new();
        let user = create_user(&store, alice(), Role::User).await.unwrap();

        // Restoring an active account is a reported conflict, not a no-op.
        let err = restore_user(&store, &queue, user.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        assert!(queue.recorded().is_empty());

        soft_delete_user(&store, &queue, user.id).await.unwrap();
        restore_user(&store, &queue, user.id).await.unwrap();

        assert!(store.get_by_id(user.id).await.unwrap().is_some());
        assert!(store.list_deleted().await.unwrap().is_empty());

        let events = queue.recorded();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].action, LifecycleAction::Restore);
    }

    #[tokio::test]
    async fn publish_failure_surfaces_without_reverting_state() {
        let store = MemStore::new();
        let queue = RecordingPublisher::new();
        queue.fail_publish.store(true, Ordering::SeqCst);
        let user = create_user(&store, alice(), Role::User).await.unwrap();

        let err = soft_delete_user(&store, &queue, user.id).await.unwrap_err();
        assert!(matches!(err, ApiError::TransientIo(_)));
        // The flag stays flipped even though the caller saw an error.
        assert_eq!(store.list_deleted().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn full_lifecycle_scenario() {
        let store = MemStore::new();
        let queue = RecordingPublisher::new();
        let codec = TokenCodec::new("test-secret", 7);

        let user = create_user(&store, alice(), Role::User).await.unwrap();
        assert_eq!(user.role, Role::User);

        let token = authenticate(&store, &codec, "alice", "Secret123!")
            .await
            .unwrap();
        let claims = codec.validate(&token).unwrap();
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.account_id().unwrap(), user.id);

        let err = authenticate(&store, &codec, "alice", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));

        soft_delete_user(&store, &queue, user.id).await.unwrap();
        let err = get_user(&store, user.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        assert_eq!(queue.recorded().len(), 1);

        restore_user(&store, &queue, user.id).await.unwrap();
        assert!(get_user(&store, user.id).await.is_ok());
        assert_eq!(queue.recorded().len(), 2);
        assert_eq!(queue.recorded()[1].action, LifecycleAction::Restore);
    }
}
