use axum::{Json, extract::State, http::StatusCode};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AuthUser, create_token},
    dto::{AuthResponse, LoginRequest, SignupRequest, UserResponse},
    errors::ApiError,
    models::User,
    state::AppState,
};

/// POST /auth/signup
/// Body: { "name": "...", "email": "...", "password": "..." }
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    payload.validate().map_err(ApiError::from_validation)?;

    if state.store.user_by_email(&payload.email).await?.is_some() {
        return Err(ApiError::EmailTaken);
    }

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))?;

    let user = User {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        password_hash,
        posts: Vec::new(),
        created_at: Utc::now(),
    };
    let view = UserResponse::from(user.clone());
    state.store.insert_user(user).await?;

    info!("New user registered: {}", view.email);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
          "message": "User created",
          "user": view
        })),
    ))
}

/// POST /auth/login
/// Body: { "email": "...", "password": "..." }
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.validate().map_err(ApiError::from_validation)?;

    // Unknown email and wrong password are indistinguishable to the caller.
    let user = state
        .store
        .user_by_email(&payload.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let valid = verify(&payload.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("Password verification failed: {}", e)))?;
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    let token = create_token(&user.id, &user.email, &state.jwt_secret)?;

    info!("User logged in: {}", user.email);

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// GET /auth/me
/// Headers: Authorization: Bearer <token>
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store
        .user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(user.into()))
}
