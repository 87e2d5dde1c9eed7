//! Domain types shared by the authentication and authorization flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Distinguished tenant id denoting cross-tenant scope.
pub const GLOBAL_TENANT_ID: &str = "@";

/// A set of operation flags encoded as bits, unioned across grants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissionset(u32);

impl Permissionset {
    pub const EXECUTE: Self = Self(1);
    pub const CREATE: Self = Self(1 << 1);
    pub const READ: Self = Self(1 << 2);
    pub const UPDATE: Self = Self(1 << 3);
    pub const DELETE: Self = Self(1 << 4);
    pub const SEARCH: Self = Self(1 << 5);
    pub const EXPORT: Self = Self(1 << 6);
    pub const APPROVE: Self = Self(1 << 7);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bitwise union with another set.
    #[must_use]
    pub const fn unify_with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Permissionset {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.unify_with(rhs)
    }
}

impl fmt::Display for Permissionset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010b}", self.0)
    }
}

/// Opaque password digest produced by a [`PasswordHasher`].
///
/// Comparison is constant-time so mismatches cannot be timed byte by byte.
///
/// [`PasswordHasher`]: crate::auth::repository::PasswordHasher
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(pub Vec<u8>);

impl PasswordHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for PasswordHash {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for PasswordHash {}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never render digest bytes in logs.
        write!(f, "PasswordHash({} bytes)", self.0.len())
    }
}

/// Log verbosity tier bound to a user or API key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserLogLevel {
    /// No trace of the login is recorded, not even a status row.
    Stealth,
    MessageEntry,
    Message,
    Full,
}

/// Permission profile attached to a user or API key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PermissionsProfile {
    pub log_level: Option<UserLogLevel>,
    /// End of the validity window, if any.
    pub valid_to: Option<DateTime<Utc>>,
    /// Administrative escape hatch: resource restriction is a wildcard.
    pub resource_is_wildcard: bool,
}

/// A provisioned account. Mutated only by login reconciliation
/// (name/email/identity-provider auto-update), never deleted here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub user_ref: Uuid,
    /// Human-readable primary id, case-sensitive.
    pub user_id: String,
    pub tenant_id: String,
    /// Fixed role assignment, if any.
    pub role_ref: Option<Uuid>,
    pub is_active: bool,
    /// Password login is rejected for such users.
    pub only_external_auth: bool,
    /// User may authenticate via a federated identity provider.
    pub external_auth: bool,
    pub identity_provider: Option<String>,
    /// Subject id at the identity provider (`oid` claim), max 36 chars.
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub email_address: Option<String>,
    pub permissions: Option<PermissionsProfile>,
}

/// Per-user login tracking row. Created lazily on first successful login.
///
/// Invariant: `current_password_serial` only increases; the throttle
/// timestamp is cleared on any successful password match.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_ref: Uuid,
    pub current_password_serial: i32,
    pub incorrect_attempts: i32,
    pub account_throttled_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub prev_login: Option<DateTime<Utc>>,
    pub last_login_by_password: Option<DateTime<Utc>>,
    pub prev_login_by_password: Option<DateTime<Utc>>,
    pub last_login_by_api_key: Option<DateTime<Utc>>,
    pub prev_login_by_api_key: Option<DateTime<Utc>>,
    pub last_login_by_token: Option<DateTime<Utc>>,
    pub prev_login_by_token: Option<DateTime<Utc>>,
}

impl UserStatus {
    /// Fresh row for a user that has never logged in.
    #[must_use]
    pub fn new(user_ref: Uuid) -> Self {
        Self {
            user_ref,
            ..Self::default()
        }
    }
}

/// One version of a user's password, keyed by (`user_ref`, `serial`).
/// Immutable once superseded; a change always creates a new row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Password {
    pub user_ref: Uuid,
    pub serial: i32,
    pub password_hash: PasswordHash,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub user_expiry: DateTime<Utc>,
    /// Pending self-service reset hash, if one was requested.
    pub reset_password_hash: Option<PasswordHash>,
    pub when_last_password_reset: Option<DateTime<Utc>>,
}

/// A named permission bundle, scoped to a tenant (or the global tenant).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Role {
    pub role_ref: Uuid,
    pub role_id: String,
    pub tenant_id: String,
    pub is_active: bool,
}

/// Grants a role to a user when acting under a tenant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserTenantRole {
    pub user_ref: Uuid,
    pub tenant_id: String,
    pub role_ref: Uuid,
}

/// Tenant record as returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDescription {
    pub tenant_id: String,
    pub name: String,
    pub is_active: bool,
}

/// (resource, bitmask) pair; entries for the same resource are unioned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub resource_id: String,
    pub permissions: Permissionset,
}

/// API key record bound to a user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKey {
    pub api_key: Uuid,
    pub user_ref: Uuid,
    /// Pins permission resolution to this role when set.
    pub role_ref: Option<Uuid>,
    pub is_active: bool,
    pub permissions: Option<PermissionsProfile>,
}

/// Claim set extracted from an already-validated federated token.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExternalTokenClaims {
    /// Subject id at the identity provider.
    pub oid: Option<String>,
    /// User principal name, `local-part@domain`.
    pub upn: Option<String>,
    /// Issuing identity provider.
    pub idp: Option<String>,
    pub name: Option<String>,
    pub email_address: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Credential method used for a login, for status tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginMethod {
    Password,
    ApiKey,
    ExternalToken,
}

/// Outcome of a single credential verification, before the authorization
/// context (permissions, tenants) is attached.
#[derive(Clone, Debug)]
pub struct AuthIntermediate {
    pub user: User,
    pub tenant_id: String,
    pub method: LoginMethod,
    /// `None` only for stealth API keys, which leave no status trace.
    pub user_status: Option<UserStatus>,
    pub auth_expires: Option<DateTime<Utc>>,
    pub password_expired: bool,
    /// A new password row was installed during this call.
    pub password_changed: bool,
    pub role_restriction: Option<Uuid>,
}

/// Unified outcome of a successful authentication.
#[derive(Clone, Debug)]
pub struct AuthResult {
    pub user: User,
    /// Tenant the session is issued for.
    pub tenant_id: String,
    pub method: LoginMethod,
    /// Snapshot taken after the login was recorded; `None` for stealth keys.
    pub user_status: Option<UserStatus>,
    /// When the credential stops being valid (password expiry, key window).
    pub auth_expires: Option<DateTime<Utc>>,
    /// Soft signal: the password matched but must be changed.
    pub password_expired: bool,
    /// Role pinned by the credential (API key override), if any.
    pub role_restriction: Option<Uuid>,
    /// Consolidated grants, one entry per resource.
    pub permissions: Vec<PermissionEntry>,
    /// Tenants the user may operate in.
    pub visible_tenants: Vec<TenantDescription>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissionset_union_is_commutative_and_idempotent() {
        let a = Permissionset::from_bits(0b01);
        let b = Permissionset::from_bits(0b10);
        assert_eq!(a.unify_with(b), b.unify_with(a));
        assert_eq!(a.unify_with(b).unify_with(b), a.unify_with(b));
        assert_eq!(a.unify_with(b).bits(), 0b11);
    }

    #[test]
    fn permissionset_contains() {
        let rw = Permissionset::READ | Permissionset::UPDATE;
        assert!(rw.contains(Permissionset::READ));
        assert!(!rw.contains(Permissionset::DELETE));
        assert!(rw.contains(Permissionset::empty()));
    }

    #[test]
    fn password_hash_compares_by_content() {
        let a = PasswordHash(vec![1, 2, 3]);
        let b = PasswordHash(vec![1, 2, 3]);
        let c = PasswordHash(vec![1, 2, 4]);
        let short = PasswordHash(vec![1, 2]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, short);
    }

    #[test]
    fn password_hash_debug_hides_bytes() {
        let hash = PasswordHash(vec![0xde, 0xad]);
        assert_eq!(format!("{hash:?}"), "PasswordHash(2 bytes)");
    }

    #[test]
    fn log_level_ordering_puts_stealth_lowest() {
        assert!(UserLogLevel::Stealth < UserLogLevel::MessageEntry);
        assert!(UserLogLevel::MessageEntry < UserLogLevel::Full);
    }
}
