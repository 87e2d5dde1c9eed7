//! Authentication and authorization core.
//!
//! Verifies a caller's identity through three credential methods (password,
//! API key, federated token) and computes the caller's effective,
//! tenant-scoped permission set.
//!
//! ## Flow
//!
//! [`AuthCoordinator`] receives a credential-specific request, delegates to
//! the matching authenticator, records the login (attempt counters, lockout
//! window, per-method timestamps), then attaches the authorization context
//! (visible tenants plus one permission bitmask per resource) and returns a
//! unified [`AuthResult`].
//!
//! ## Collaborators
//!
//! Storage, password hashing, token validation, and peer notification are
//! trait contracts ([`repository`], [`invalidation`]); the core performs no
//! I/O of its own beyond calls into them. Each authentication call is a
//! short read-decide-write unit the store is expected to apply atomically.
//!
//! ## Lockout
//!
//! Five consecutive wrong passwords freeze the account for five minutes.
//! Frozen accounts are rejected before any hash is computed, so a locked
//! account leaks no timing signal about password correctness.

pub mod apikey;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod external;
pub mod invalidation;
pub mod locks;
pub mod model;
pub mod password;
pub mod permission;
pub mod policy;
pub mod repository;
pub mod status;
pub mod tenant;

pub use config::{AuthConfig, ExternalIdentityConfig, PasswordBlacklist};
pub use coordinator::AuthCoordinator;
pub use error::AuthError;
pub use model::{
    ApiKey, AuthResult, ExternalTokenClaims, LoginMethod, Password, PasswordHash, PermissionEntry,
    Permissionset, PermissionsProfile, Role, TenantDescription, User, UserLogLevel, UserStatus,
    UserTenantRole, GLOBAL_TENANT_ID,
};
pub use repository::{
    ApiKeyRepository, AuthStore, ExternalTokenValidator, NoopTokenValidator, PasswordHasher,
    PasswordRepository, PermissionGrantRepository, RoleRepository, Sha512PasswordHasher,
    TenantRepository, TenantRolePair, UserRepository, UserStatusRepository,
    UserTenantRoleRepository,
};
