//! Top-level composition of the three authentication flows.
//!
//! The coordinator runs the matching authenticator, then attaches the
//! authorization context (consolidated permissions and visible tenants) and
//! returns a unified [`AuthResult`]. Credential failures come back as typed
//! results; only corrupted reference data propagates as hard errors.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::auth::apikey::ApiKeyAuthenticator;
use crate::auth::config::AuthConfig;
use crate::auth::error::AuthError;
use crate::auth::external::ExternalTokenAuthenticator;
use crate::auth::invalidation::{InvalidationTransport, SessionInvalidationFanout};
use crate::auth::locks::LockArena;
use crate::auth::model::{
    AuthIntermediate, AuthResult, ExternalTokenClaims, PermissionEntry, TenantDescription,
};
use crate::auth::password::PasswordAuthenticator;
use crate::auth::permission::PermissionAggregator;
use crate::auth::repository::{AuthStore, ExternalTokenValidator, PasswordHasher};
use crate::auth::tenant::TenantVisibilityResolver;

/// Idle per-user locks are evicted after this long.
const LOCK_ARENA_TTL: Duration = Duration::from_secs(10 * 60);

pub struct AuthCoordinator<S, H> {
    store: S,
    hasher: H,
    config: AuthConfig,
    locks: LockArena,
    invalidation: Option<Box<dyn Fanout>>,
}

/// Object-safe shim so the coordinator can hold any transport's fan-out.
trait Fanout: Send + Sync {
    fn fan_out<'a>(
        &'a self,
        user_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = usize> + Send + 'a>>;
}

impl<T> Fanout for SessionInvalidationFanout<T>
where
    T: InvalidationTransport + Send + Sync + 'static,
{
    fn fan_out<'a>(
        &'a self,
        user_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = usize> + Send + 'a>> {
        Box::pin(SessionInvalidationFanout::fan_out(self, user_id))
    }
}

impl<S, H> AuthCoordinator<S, H>
where
    S: AuthStore,
    H: PasswordHasher,
{
    /// # Errors
    /// `InvalidConfiguration` when the policy settings cannot be enforced.
    pub fn new(store: S, hasher: H, config: AuthConfig) -> Result<Self, AuthError> {
        config.validate()?;
        Ok(Self {
            store,
            hasher,
            config,
            locks: LockArena::new(LOCK_ARENA_TTL),
            invalidation: None,
        })
    }

    /// Attach a session-invalidation fan-out, run after password changes.
    #[must_use]
    pub fn with_invalidation<T>(mut self, fanout: SessionInvalidationFanout<T>) -> Self
    where
        T: InvalidationTransport + Send + Sync + 'static,
    {
        self.invalidation = Some(Box::new(fanout));
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Authenticate by user id and password; a non-blank `new_password`
    /// changes the password in the same step.
    ///
    /// # Errors
    /// See [`PasswordAuthenticator::authenticate`].
    pub async fn authenticate_by_password(
        &self,
        now: DateTime<Utc>,
        user_id: &str,
        password: &SecretString,
        new_password: Option<&SecretString>,
    ) -> Result<AuthResult, AuthError> {
        let intermediate = PasswordAuthenticator::new(&self.store, &self.hasher, &self.config)
            .authenticate(now, user_id, password, new_password)
            .await?;
        self.finish(intermediate).await
    }

    /// Authenticate by API key.
    ///
    /// # Errors
    /// `NotAuthenticated` for unknown, inactive, or expired keys.
    pub async fn authenticate_by_api_key(
        &self,
        now: DateTime<Utc>,
        key: Uuid,
    ) -> Result<AuthResult, AuthError> {
        let intermediate = ApiKeyAuthenticator::new(&self.store)
            .authenticate(now, key)
            .await?;
        self.finish(intermediate).await
    }

    /// Authenticate by an already-validated federated claim set.
    ///
    /// # Errors
    /// `NotAuthenticated` when no local user binds to the claims;
    /// `IdentityProviderMismatch` under enforcement.
    pub async fn authenticate_by_external_token(
        &self,
        now: DateTime<Utc>,
        claims: &ExternalTokenClaims,
    ) -> Result<AuthResult, AuthError> {
        let intermediate = ExternalTokenAuthenticator::new(&self.store, &self.config.external)
            .authenticate(now, claims)
            .await?;
        self.finish(intermediate).await
    }

    /// Validate a raw federated token through `validator`, then bind it.
    ///
    /// # Errors
    /// `NotAuthenticated` when the token does not validate, plus everything
    /// [`Self::authenticate_by_external_token`] returns.
    pub async fn authenticate_by_external_token_raw<V: ExternalTokenValidator>(
        &self,
        now: DateTime<Utc>,
        validator: &V,
        raw_token: &str,
    ) -> Result<AuthResult, AuthError> {
        let claims = validator
            .validate(raw_token)
            .await?
            .ok_or(AuthError::NotAuthenticated)?;
        self.authenticate_by_external_token(now, &claims).await
    }

    /// Change a password after verifying the current one. Serialized per
    /// user through the lock arena.
    ///
    /// # Errors
    /// `PasswordValidationFailed` for a blank or policy-violating candidate,
    /// plus the password-authentication failures.
    pub async fn change_password(
        &self,
        now: DateTime<Utc>,
        user_id: &str,
        password: &SecretString,
        new_password: &SecretString,
    ) -> Result<AuthResult, AuthError> {
        if new_password.expose_secret().trim().is_empty() {
            return Err(AuthError::PasswordValidationFailed {
                reason: "new password must not be blank".into(),
            });
        }
        let _guard = self.locks.acquire(user_id).await;
        self.authenticate_by_password(now, user_id, password, Some(new_password))
            .await
    }

    /// Issue a one-time reset credential (see
    /// [`PasswordAuthenticator::request_password_reset`]). Serialized per
    /// user.
    ///
    /// # Errors
    /// `NotAuthenticated` or `ResetRequestThrottled`.
    pub async fn request_password_reset(
        &self,
        now: DateTime<Utc>,
        user_id: &str,
        email_address: &str,
    ) -> Result<String, AuthError> {
        let _guard = self.locks.acquire(user_id).await;
        PasswordAuthenticator::new(&self.store, &self.hasher, &self.config)
            .request_password_reset(now, user_id, email_address)
            .await
    }

    /// Consolidated permissions for a caller; empty on any storage failure.
    pub async fn effective_permissions(
        &self,
        user_ref: Uuid,
        user_id: &str,
        tenant_id: &str,
        role_restriction: Option<Uuid>,
    ) -> Vec<PermissionEntry> {
        PermissionAggregator::new(&self.store)
            .effective_permissions(user_ref, user_id, tenant_id, role_restriction)
            .await
    }

    /// Tenants the user may operate in.
    ///
    /// # Errors
    /// `UserNotFound` for a dangling ref; `Store` on corrupted references.
    pub async fn visible_tenants(
        &self,
        user_ref: Uuid,
    ) -> Result<Vec<TenantDescription>, AuthError> {
        TenantVisibilityResolver::new(&self.store)
            .visible_tenants(user_ref)
            .await
    }

    /// Attach the authorization context and run post-login side effects.
    async fn finish(&self, intermediate: AuthIntermediate) -> Result<AuthResult, AuthError> {
        let AuthIntermediate {
            user,
            tenant_id,
            method,
            user_status,
            auth_expires,
            password_expired,
            password_changed,
            role_restriction,
        } = intermediate;

        if !user.is_active {
            info!("Login denied for userId {}: account inactive", user.user_id);
            return Err(AuthError::NotAuthenticated);
        }

        if password_changed {
            if let Some(fanout) = &self.invalidation {
                fanout.fan_out(&user.user_id).await;
            }
        }

        let permissions = PermissionAggregator::new(&self.store)
            .effective_permissions(user.user_ref, &user.user_id, &tenant_id, role_restriction)
            .await;
        let visible_tenants = TenantVisibilityResolver::new(&self.store)
            .visible_tenants(user.user_ref)
            .await?;

        Ok(AuthResult {
            user,
            tenant_id,
            method,
            user_status,
            auth_expires,
            password_expired,
            role_restriction,
            permissions,
            visible_tenants,
        })
    }
}
