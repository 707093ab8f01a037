use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{Claims, Role, jwt::jwt_auth, role_layer::RequireRoleLayer},
    error::AppError,
    services::{TokenBundle, UserSummary},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    tokens: TokenBundle,
    user: UserSummary,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    refresh_token: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    let open = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .with_state(state.clone());

    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/validate", get(validate))
        .route("/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth))
        .with_state(state.clone());

    let admin = Router::new()
        .route("/auth/cleanup", post(cleanup))
        .layer(RequireRoleLayer::new(Role::Admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth))
        .with_state(state);

    open.merge(protected).merge(admin)
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let outcome = state.sessions.login(&body.username, &body.password).await?;
    Ok(Json(LoginResponse {
        tokens: outcome.tokens,
        user: outcome.user,
    }))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenBundle>, AppError> {
    let bundle = state.sessions.refresh(&body.refresh_token).await?;
    Ok(Json(bundle))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let revoked = state.sessions.logout(&body.refresh_token, &claims).await?;
    Ok(Json(serde_json::json!({ "revoked": revoked })))
}

async fn logout_all(
    State(state): State<Arc<AppState>>,
    claims: Claims,
) -> Result<Json<serde_json::Value>, AppError> {
    let revoked_count = state.sessions.logout_all(&claims).await?;
    Ok(Json(serde_json::json!({ "revoked_count": revoked_count })))
}

// Reaching this handler is the validation result: jwt_auth already decoded
// and checked the access token.
async fn validate(claims: Claims) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "valid": true, "sub": claims.sub }))
}

async fn me(claims: Claims) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "id": claims.user_id(),
        "username": claims.username,
        "email": claims.email,
        "role": claims.role,
    }))
}

async fn cleanup(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let removed_count = state.sessions.cleanup().await?;
    Ok(Json(serde_json::json!({ "removed_count": removed_count })))
}
