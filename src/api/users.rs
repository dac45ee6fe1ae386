use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, types::UserDto, validation};
use crate::db::NewUser;
use crate::services::gravatar_hash;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user: UserDto,
    /// Token provisioned alongside the account, in the same transaction.
    pub token: String,
}

/// POST /users
/// Register a new account. The auth token is minted atomically with the
/// user row; a duplicate username maps to 409.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<RegisterResponse>>, ApiError> {
    validation::validate_username(&payload.username)?;
    validation::validate_email(&payload.email)?;
    validation::validate_password(&payload.password)?;

    let security = {
        let config = state.config().read().await;
        config.security.clone()
    };

    let (user, token) = state
        .store()
        .create_user(
            NewUser {
                username: payload.username.trim().to_string(),
                email: payload.email.trim().to_string(),
                password: payload.password,
            },
            Some(&security),
        )
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    metrics::counter!("marginalia_users_registered_total").increment(1);

    let gravatar = gravatar_hash(&user.email)?;
    Ok(Json(ApiResponse::success(RegisterResponse {
        user: UserDto::from_user(user, gravatar),
        token,
    })))
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user = state
        .store()
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    let gravatar = gravatar_hash(&user.email)?;
    Ok(Json(ApiResponse::success(UserDto::from_user(
        user, gravatar,
    ))))
}
