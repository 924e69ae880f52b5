use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        extractors::AuthUser,
        policy::{permit, Operation},
        service::authenticate,
        token::TokenCodec,
    },
    error::ApiError,
    state::AppState,
    users::{
        dto::{LoginRequest, LoginResponse, MessageResponse, PublicUser, RegisterRequest, UpdateUserRequest},
        repo::Role,
        service::{
            create_user, get_user, list_active_users, list_deleted_users, restore_user,
            soft_delete_user, update_user, AccountChanges, NewAccount,
        },
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/register", post(register))
        .route("/users/create-admin", post(create_admin))
        .route("/users/login", post(login))
        .route("/users/deleted", get(list_deleted))
        .route("/users/:id", get(get_by_id).put(update).delete(delete_user))
        .route("/users/:id/restore", post(restore))
}

fn require(allowed: bool) -> Result<(), ApiError> {
    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[instrument(skip(state))]
async fn list_users(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    require(permit(caller.id, caller.role, None, Operation::ListAll))?;
    let users = list_active_users(state.users.as_ref()).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
async fn get_by_id(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PublicUser>, ApiError> {
    require(permit(caller.id, caller.role, Some(id), Operation::View))?;
    let user = get_user(state.users.as_ref(), id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let user = create_user(state.users.as_ref(), new_account(payload), Role::User).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
async fn create_admin(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    require(permit(caller.id, caller.role, None, Operation::CreateAdmin))?;
    let user = create_user(state.users.as_ref(), new_account(payload), Role::Admin).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let codec = TokenCodec::from_ref(&state);
    let token = authenticate(
        state.users.as_ref(),
        &codec,
        &payload.username,
        &payload.password,
    )
    .await?;
    Ok(Json(LoginResponse { token }))
}

#[instrument(skip(state, payload))]
async fn update(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    require(permit(caller.id, caller.role, Some(id), Operation::Update))?;
    ensure_role_change_allowed(payload.role, caller.role)?;
    let user = update_user(
        state.users.as_ref(),
        id,
        AccountChanges {
            email: payload.email,
            password: payload.password,
            fitness_goal: payload.fitness_goal,
            role: payload.role,
        },
    )
    .await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
async fn delete_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    require(permit(caller.id, caller.role, Some(id), Operation::Delete))?;
    soft_delete_user(state.users.as_ref(), state.queue.as_ref(), id).await?;
    Ok(Json(MessageResponse {
        message: "User deactivated successfully".into(),
    }))
}

#[instrument(skip(state))]
async fn list_deleted(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    require(permit(caller.id, caller.role, None, Operation::ListDeleted))?;
    let users = list_deleted_users(state.users.as_ref()).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
async fn restore(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    require(permit(caller.id, caller.role, None, Operation::Restore))?;
    restore_user(state.users.as_ref(), state.queue.as_ref(), id).await?;
    Ok(Json(MessageResponse {
        message: "User restored successfully".into(),
    }))
}

fn new_account(payload: RegisterRequest) -> NewAccount {
    NewAccount {
        username: payload.username.trim().to_string(),
        password: payload.password,
        email: payload.email.trim().to_lowercase(),
        fitness_goal: payload.fitness_goal,
    }
}

/// Role is a privilege-bearing attribute; a self-service update carrying one
/// is rejected outright rather than silently dropped.
fn ensure_role_change_allowed(requested: Option<Role>, caller_role: Role) -> Result<(), ApiError> {
    if requested.is_some() && !caller_role.is_admin() {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}
