//! OpenAPI description of the auth surface.

use utoipa::OpenApi;

use super::handlers::{auth, types};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "gardi",
        description = "Authentication and Authorization Core",
        license(name = "BSD-3-Clause")
    ),
    paths(
        auth::login,
        auth::api_key,
        auth::token,
        auth::change_password,
        auth::reset_password,
        auth::tenants,
        auth::invalidate,
    ),
    components(schemas(
        types::LoginRequest,
        types::ApiKeyLoginRequest,
        types::TokenLoginRequest,
        types::ChangePasswordRequest,
        types::ResetPasswordRequest,
        types::ResetPasswordResponse,
        types::InvalidateSessionsRequest,
        types::AuthResponse,
        types::PermissionEntryResponse,
        types::TenantResponse,
    )),
    tags((name = "auth", description = "Authentication operations"))
)]
pub struct ApiDoc;
