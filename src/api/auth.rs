//! Authentication API endpoints
//!
//! - POST /api/auth/login - Exchange email and password for a bearer token
//! - POST /api/auth/logout - End the current session
//! - GET /api/auth/me - Get current user

use axum::{
    extract::{Request, State},
    middleware as axum_middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::MessageResponse;
use crate::api::middleware::{self, extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::User;
use crate::services::user::LoginInput;

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new().route("/login", post(login)).merge(protected)
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let (session, user) = state
        .user_service
        .login(LoginInput::new(body.email.trim(), body.password))
        .await?;
    Ok(Json(AuthResponse {
        token: session.id,
        user,
    }))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Some(token) = extract_session_token(&request) {
        state.user_service.logout(&token).await?;
    }
    Ok(Json(MessageResponse::new("Logged out")))
}

/// GET /api/auth/me
async fn me(Extension(user): Extension<AuthenticatedUser>) -> Json<User> {
    Json(user.0)
}
