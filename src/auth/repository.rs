//! Collaborator contracts consumed by the authentication core.
//!
//! Storage contracts are abstract, not tied to any engine. Each
//! authentication call is a short read-decide-write unit; implementations
//! are expected to make "read, mutate, persist" atomic per call so the
//! attempt-counter and throttle updates stay race-free (see `store::postgres`
//! for the shipped engine, `store::memory` for the test double).

use anyhow::Result;
use sha2::{Digest, Sha512};
use std::future::Future;
use uuid::Uuid;

use crate::auth::model::{
    ApiKey, ExternalTokenClaims, Password, PasswordHash, PermissionEntry, Role, TenantDescription,
    User, UserStatus, GLOBAL_TENANT_ID,
};

pub trait UserRepository: Send + Sync {
    /// Exact, case-sensitive match on the primary id, ignoring tenant.
    fn user_by_id(&self, user_id: &str) -> impl Future<Output = Result<Option<User>>> + Send;

    fn user_by_ref(&self, user_ref: Uuid) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Lookup by external (identity-provider) id, active users only.
    fn user_by_external_id(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    fn save_user(&self, user: &User) -> impl Future<Output = Result<()>> + Send;
}

pub trait PasswordRepository: Send + Sync {
    /// The row whose serial equals the owning status row's current serial.
    fn current_password(
        &self,
        user_ref: Uuid,
    ) -> impl Future<Output = Result<Option<Password>>> + Send;

    fn password_by_serial(
        &self,
        user_ref: Uuid,
        serial: i32,
    ) -> impl Future<Output = Result<Option<Password>>> + Send;

    /// Last `n` rows for the user, most recent serial first.
    fn recent_passwords(
        &self,
        user_ref: Uuid,
        n: u32,
    ) -> impl Future<Output = Result<Vec<Password>>> + Send;

    fn password_by_hash(
        &self,
        user_ref: Uuid,
        hash: &PasswordHash,
    ) -> impl Future<Output = Result<Option<Password>>> + Send;

    /// Insert a new row, or update the row with the same (user, serial) key.
    fn save_password(&self, password: &Password) -> impl Future<Output = Result<()>> + Send;
}

pub trait UserStatusRepository: Send + Sync {
    /// Create-on-absent semantics are owned by the caller.
    fn status_by_user(
        &self,
        user_ref: Uuid,
    ) -> impl Future<Output = Result<Option<UserStatus>>> + Send;

    fn save_status(&self, status: &UserStatus) -> impl Future<Output = Result<()>> + Send;
}

pub trait RoleRepository: Send + Sync {
    fn role_by_ref(&self, role_ref: Uuid) -> impl Future<Output = Result<Option<Role>>> + Send;
}

pub trait TenantRepository: Send + Sync {
    fn tenant_by_id(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = Result<Option<TenantDescription>>> + Send;

    fn all_tenants(&self) -> impl Future<Output = Result<Vec<TenantDescription>>> + Send;
}

/// One (tenant-of-assignment, tenant-of-role) pair for a user's membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantRolePair {
    pub assignment_tenant_id: String,
    pub role_tenant_id: String,
}

impl TenantRolePair {
    /// Both sides global means the assignment is unrestricted.
    #[must_use]
    pub fn is_double_global(&self) -> bool {
        self.assignment_tenant_id == GLOBAL_TENANT_ID && self.role_tenant_id == GLOBAL_TENANT_ID
    }

    /// The non-global side; the assignment side wins when both are specific.
    #[must_use]
    pub fn effective_tenant_id(&self) -> &str {
        if self.assignment_tenant_id == GLOBAL_TENANT_ID {
            &self.role_tenant_id
        } else {
            &self.assignment_tenant_id
        }
    }
}

pub trait UserTenantRoleRepository: Send + Sync {
    /// All (assignment tenant, role tenant) pairs for the user.
    fn tenant_role_pairs(
        &self,
        user_ref: Uuid,
    ) -> impl Future<Output = Result<Vec<TenantRolePair>>> + Send;
}

pub trait PermissionGrantRepository: Send + Sync {
    /// Grants of a single role, at most one entry per resource.
    fn grants_for_role(
        &self,
        role_ref: Uuid,
    ) -> impl Future<Output = Result<Vec<PermissionEntry>>> + Send;

    /// Grants from every role the user holds under the global tenant plus
    /// `tenant_id`. MUST be returned sorted by `resource_id` so the
    /// aggregator can merge in one pass.
    fn grants_for_user(
        &self,
        user_ref: Uuid,
        tenant_id: &str,
    ) -> impl Future<Output = Result<Vec<PermissionEntry>>> + Send;
}

pub trait ApiKeyRepository: Send + Sync {
    fn api_key_by_value(&self, key: Uuid) -> impl Future<Output = Result<Option<ApiKey>>> + Send;
}

/// Umbrella over every storage contract the core consumes, so services can
/// take a single generic parameter.
pub trait AuthStore:
    UserRepository
    + PasswordRepository
    + UserStatusRepository
    + RoleRepository
    + TenantRepository
    + UserTenantRoleRepository
    + PermissionGrantRepository
    + ApiKeyRepository
{
}

impl<T> AuthStore for T where
    T: UserRepository
        + PasswordRepository
        + UserStatusRepository
        + RoleRepository
        + TenantRepository
        + UserTenantRoleRepository
        + PermissionGrantRepository
        + ApiKeyRepository
{
}

/// Produces the opaque digest stored in password rows. The digest covers the
/// user id so equal passwords of different users never share a hash.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, user_id: &str, plaintext: &str) -> PasswordHash;
}

/// SHA-512 over `user_id \0 plaintext`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha512PasswordHasher;

impl PasswordHasher for Sha512PasswordHasher {
    fn hash(&self, user_id: &str, plaintext: &str) -> PasswordHash {
        let mut hasher = Sha512::new();
        hasher.update(user_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(plaintext.as_bytes());
        PasswordHash(hasher.finalize().to_vec())
    }
}

/// Validates a raw federated token and extracts its claims. Signature
/// verification happens here, outside the core.
pub trait ExternalTokenValidator: Send + Sync {
    /// `Ok(None)` means the token did not validate.
    fn validate(
        &self,
        raw_token: &str,
    ) -> impl Future<Output = Result<Option<ExternalTokenClaims>>> + Send;
}

/// Rejects every token; deployments plug a real OIDC validator.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTokenValidator;

impl ExternalTokenValidator for NoopTokenValidator {
    async fn validate(&self, _raw_token: &str) -> Result<Option<ExternalTokenClaims>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hasher_is_deterministic_and_user_scoped() {
        let hasher = Sha512PasswordHasher;
        let a = hasher.hash("alice", "hunter2");
        let b = hasher.hash("alice", "hunter2");
        let other_user = hasher.hash("bob", "hunter2");
        let other_password = hasher.hash("alice", "hunter3");
        assert_eq!(a, b);
        assert_ne!(a, other_user);
        assert_ne!(a, other_password);
        assert_eq!(a.as_bytes().len(), 64);
    }

    #[test]
    fn separator_prevents_boundary_collisions() {
        let hasher = Sha512PasswordHasher;
        assert_ne!(hasher.hash("ab", "c"), hasher.hash("a", "bc"));
    }

    #[test]
    fn tenant_role_pair_effective_side() {
        let pair = TenantRolePair {
            assignment_tenant_id: GLOBAL_TENANT_ID.into(),
            role_tenant_id: "acme".into(),
        };
        assert_eq!(pair.effective_tenant_id(), "acme");
        assert!(!pair.is_double_global());

        let pair = TenantRolePair {
            assignment_tenant_id: "acme".into(),
            role_tenant_id: GLOBAL_TENANT_ID.into(),
        };
        assert_eq!(pair.effective_tenant_id(), "acme");

        let pair = TenantRolePair {
            assignment_tenant_id: GLOBAL_TENANT_ID.into(),
            role_tenant_id: GLOBAL_TENANT_ID.into(),
        };
        assert!(pair.is_double_global());
    }

    #[tokio::test]
    async fn noop_validator_rejects() {
        let validator = NoopTokenValidator;
        let claims = validator.validate("anything").await.unwrap();
        assert!(claims.is_none());
    }
}
