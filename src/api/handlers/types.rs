//! Request/response types for the auth endpoints.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::model::{AuthResult, PermissionEntry, TenantDescription};
use crate::auth::AuthError;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
    /// Supplying a value changes the password during login.
    pub new_password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApiKeyLoginRequest {
    pub api_key: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenLoginRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub user_id: String,
    pub password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub user_id: String,
    pub email_address: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordResponse {
    /// Deliver out of band; only its hash is stored.
    pub reset_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct InvalidateSessionsRequest {
    pub user_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PermissionEntryResponse {
    pub resource_id: String,
    pub permissions: u32,
}

impl From<PermissionEntry> for PermissionEntryResponse {
    fn from(entry: PermissionEntry) -> Self {
        Self {
            resource_id: entry.resource_id,
            permissions: entry.permissions.bits(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TenantResponse {
    pub tenant_id: String,
    pub name: String,
    pub is_active: bool,
}

impl From<TenantDescription> for TenantResponse {
    fn from(tenant: TenantDescription) -> Self {
        Self {
            tenant_id: tenant.tenant_id,
            name: tenant.name,
            is_active: tenant.is_active,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub user_id: String,
    pub tenant_id: String,
    pub must_change_password: bool,
    pub auth_expires: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub number_of_incorrect_attempts: Option<i32>,
    pub permissions: Vec<PermissionEntryResponse>,
    pub tenants: Vec<TenantResponse>,
}

impl From<AuthResult> for AuthResponse {
    fn from(result: AuthResult) -> Self {
        Self {
            user_id: result.user.user_id,
            tenant_id: result.tenant_id,
            must_change_password: result.password_expired,
            auth_expires: result.auth_expires,
            last_login: result.user_status.as_ref().and_then(|s| s.prev_login),
            number_of_incorrect_attempts: result
                .user_status
                .as_ref()
                .map(|s| s.incorrect_attempts),
            permissions: result
                .permissions
                .into_iter()
                .map(PermissionEntryResponse::from)
                .collect(),
            tenants: result
                .visible_tenants
                .into_iter()
                .map(TenantResponse::from)
                .collect(),
        }
    }
}

/// Map a core error onto a transport status. Credential failures collapse
/// onto 401 so responses do not reveal which part of the credential failed.
#[must_use]
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::UserNotFound
        | AuthError::WrongPassword { .. }
        | AuthError::NotAuthenticated
        | AuthError::IdentityProviderMismatch => StatusCode::UNAUTHORIZED,
        AuthError::AccountTemporarilyFrozen => StatusCode::LOCKED,
        AuthError::PasswordValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AuthError::ResetRequestThrottled => StatusCode::TOO_MANY_REQUESTS,
        AuthError::UserStatusNotFound
        | AuthError::PasswordNotFound
        | AuthError::InvalidConfiguration(_)
        | AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
