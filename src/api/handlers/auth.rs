//! Auth endpoints: the core's exposed operations over HTTP.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::types::{
    status_for, ApiKeyLoginRequest, AuthResponse, ChangePasswordRequest, InvalidateSessionsRequest,
    LoginRequest, ResetPasswordRequest, ResetPasswordResponse, TenantResponse, TokenLoginRequest,
};
use crate::api::ApiContext;
use crate::auth::repository::UserRepository;
use crate::auth::AuthError;

fn error_response(err: &AuthError) -> axum::response::Response {
    let status = status_for(err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Authentication failed unexpectedly: {err}");
        (status, Json(json!({ "error": "internal error" }))).into_response()
    } else {
        (status, Json(json!({ "error": err.to_string() }))).into_response()
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 401, description = "Credential rejected"),
        (status = 423, description = "Account temporarily frozen"),
    ),
    tag = "auth"
)]
pub async fn login(
    context: Extension<Arc<ApiContext>>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let password = SecretString::from(payload.password);
    let new_password = payload.new_password.map(SecretString::from);
    match context
        .coordinator
        .authenticate_by_password(Utc::now(), &payload.user_id, &password, new_password.as_ref())
        .await
    {
        Ok(result) => (StatusCode::OK, Json(AuthResponse::from(result))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/api-key",
    request_body = ApiKeyLoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 401, description = "Key rejected"),
    ),
    tag = "auth"
)]
pub async fn api_key(
    context: Extension<Arc<ApiContext>>,
    Json(payload): Json<ApiKeyLoginRequest>,
) -> impl IntoResponse {
    match context
        .coordinator
        .authenticate_by_api_key(Utc::now(), payload.api_key)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(AuthResponse::from(result))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/token",
    request_body = TokenLoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 401, description = "Token rejected or unbound"),
    ),
    tag = "auth"
)]
pub async fn token(
    context: Extension<Arc<ApiContext>>,
    Json(payload): Json<TokenLoginRequest>,
) -> impl IntoResponse {
    match context
        .coordinator
        .authenticate_by_external_token_raw(Utc::now(), &context.validator, &payload.token)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(AuthResponse::from(result))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = AuthResponse),
        (status = 401, description = "Current password rejected"),
        (status = 422, description = "New password violates the policy"),
    ),
    tag = "auth"
)]
pub async fn change_password(
    context: Extension<Arc<ApiContext>>,
    Json(payload): Json<ChangePasswordRequest>,
) -> impl IntoResponse {
    let password = SecretString::from(payload.password);
    let new_password = SecretString::from(payload.new_password);
    match context
        .coordinator
        .change_password(Utc::now(), &payload.user_id, &password, &new_password)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(AuthResponse::from(result))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Reset credential issued", body = ResetPasswordResponse),
        (status = 401, description = "User/email pair rejected"),
        (status = 429, description = "Requested too recently"),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    context: Extension<Arc<ApiContext>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> impl IntoResponse {
    match context
        .coordinator
        .request_password_reset(Utc::now(), &payload.user_id, &payload.email_address)
        .await
    {
        Ok(reset_token) => (
            StatusCode::OK,
            Json(ResetPasswordResponse { reset_token }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/tenants/{user_id}",
    params(("user_id" = String, Path, description = "User primary id")),
    responses(
        (status = 200, description = "Visible tenants", body = [TenantResponse]),
        (status = 404, description = "Unknown user"),
    ),
    tag = "auth"
)]
pub async fn tenants(
    context: Extension<Arc<ApiContext>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let user = match context.coordinator.store().user_by_id(&user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to look up userId {user_id}: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match context.coordinator.visible_tenants(user.user_ref).await {
        Ok(tenants) => {
            let body: Vec<TenantResponse> = tenants.into_iter().map(TenantResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/invalidate",
    request_body = InvalidateSessionsRequest,
    responses(
        (status = 204, description = "Invalidation acknowledged"),
    ),
    tag = "auth"
)]
/// Peer notification sink. Session storage lives outside this core, so the
/// acknowledgement is all that is required of this server.
pub async fn invalidate(Json(payload): Json<InvalidateSessionsRequest>) -> impl IntoResponse {
    info!(
        "Peer requested session invalidation for userId {}",
        payload.user_id
    );
    StatusCode::NO_CONTENT
}
