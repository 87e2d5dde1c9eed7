//! Password credential verification and password lifecycle.

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::config::AuthConfig;
use crate::auth::error::AuthError;
use crate::auth::model::{AuthIntermediate, LoginMethod, Password, PasswordHash, User, UserStatus};
use crate::auth::policy::PasswordPolicyEnforcer;
use crate::auth::repository::{
    PasswordHasher, PasswordRepository, UserRepository, UserStatusRepository,
};
use crate::auth::status;

pub struct PasswordAuthenticator<'a, S, H> {
    store: &'a S,
    hasher: &'a H,
    config: &'a AuthConfig,
}

impl<'a, S, H> PasswordAuthenticator<'a, S, H>
where
    S: UserRepository + PasswordRepository + UserStatusRepository,
    H: PasswordHasher,
{
    pub fn new(store: &'a S, hasher: &'a H, config: &'a AuthConfig) -> Self {
        Self {
            store,
            hasher,
            config,
        }
    }

    /// Verify `user_id` / `password`, optionally changing to `new_password`
    /// in the same step.
    ///
    /// A match against the pending reset hash (within its validity window)
    /// also authenticates and promotes the supplied password to the new
    /// current password.
    ///
    /// # Errors
    /// Credential failures (`UserNotFound`, `AccountTemporarilyFrozen`,
    /// `WrongPassword`) are expected outcomes; `UserStatusNotFound` and
    /// `PasswordNotFound` indicate corrupted reference data. The mutated
    /// status row is persisted on every outcome of steps that reach it.
    pub async fn authenticate(
        &self,
        now: DateTime<Utc>,
        user_id: &str,
        password: &SecretString,
        new_password: Option<&SecretString>,
    ) -> Result<AuthIntermediate, AuthError> {
        let Some(user) = self.store.user_by_id(user_id).await? else {
            debug!("No user record for userId {user_id}, declining access");
            return Err(AuthError::UserNotFound);
        };
        if user.only_external_auth {
            debug!("Password login declined for userId {user_id}: external auth only");
            return Err(AuthError::UserNotFound);
        }

        let mut user_status = self
            .store
            .status_by_user(user.user_ref)
            .await?
            .ok_or(AuthError::UserStatusNotFound)?;
        // Frozen accounts are rejected before any hash is computed.
        if let Err(err) = status::ensure_not_throttled(&user_status, now) {
            info!("Login denied for userId {user_id}: account temporarily frozen");
            return Err(err);
        }

        let mut current = self
            .store
            .password_by_serial(user.user_ref, user_status.current_password_serial)
            .await?
            .ok_or(AuthError::PasswordNotFound)?;

        let supplied_hash = self.hasher.hash(user_id, password.expose_secret());

        if supplied_hash == current.password_hash {
            let wants_change = new_password
                .map(|p| p.expose_secret().trim())
                .filter(|p| !p.is_empty());
            let expired = current.expires <= now;

            let (auth_expires, password_expired, password_changed) =
                if !expired || wants_change.is_some() {
                    if let Some(candidate) = wants_change {
                        let row = self
                            .change_password(now, &user, &mut user_status, candidate)
                            .await?;
                        (Some(row.expires), false, true)
                    } else {
                        (Some(current.expires), false, false)
                    }
                } else {
                    // Expired and no replacement supplied: success, but the
                    // caller must force a change.
                    (Some(current.expires), true, false)
                };

            if current.reset_password_hash.is_some() {
                current.reset_password_hash = None;
                current.when_last_password_reset = None;
                self.store.save_password(&current).await?;
            }

            status::record_success(&mut user_status, now, LoginMethod::Password);
            self.store.save_status(&user_status).await?;
            info!("UserId {user_id} authenticated by password");

            return Ok(AuthIntermediate {
                tenant_id: user.tenant_id.clone(),
                role_restriction: user.role_ref,
                method: LoginMethod::Password,
                user,
                user_status: Some(user_status),
                auth_expires,
                password_expired,
                password_changed,
            });
        }

        if let Some(reset_hash) = &current.reset_password_hash {
            let reset_issued = current.when_last_password_reset;
            let validity = Duration::hours(i64::from(self.config.reset_validity_hours));
            let within_window = reset_issued.is_some_and(|issued| issued + validity > now);
            if *reset_hash == supplied_hash && within_window {
                // The reset credential becomes the new current password.
                let row = self
                    .set_password(now, &user, &mut user_status, password.expose_secret())
                    .await?;
                let password_expired = row.expires <= now;
                status::record_success(&mut user_status, now, LoginMethod::Password);
                self.store.save_status(&user_status).await?;
                info!("UserId {user_id} authenticated via password reset");

                return Ok(AuthIntermediate {
                    tenant_id: user.tenant_id.clone(),
                    role_restriction: user.role_ref,
                    method: LoginMethod::Password,
                    user,
                    user_status: Some(user_status),
                    auth_expires: Some(row.expires),
                    password_expired,
                    password_changed: true,
                });
            }
        }

        let attempts = status::record_failure(&mut user_status, now);
        self.store.save_status(&user_status).await?;
        info!("Incorrect password for userId {user_id} (attempt {attempts})");
        Err(AuthError::WrongPassword { attempts })
    }

    /// Validate `candidate` against the password policy and install it as the
    /// new current password (serial = current + 1).
    ///
    /// The caller persists the status row; the new password row is persisted
    /// here.
    ///
    /// # Errors
    /// `PasswordValidationFailed` when any policy check rejects the candidate.
    pub async fn change_password(
        &self,
        now: DateTime<Utc>,
        user: &User,
        user_status: &mut UserStatus,
        candidate: &str,
    ) -> Result<Password, AuthError> {
        let new_hash = self.hasher.hash(&user.user_id, candidate);
        PasswordPolicyEnforcer::new(self.store, self.config)
            .validate_new_password(&user.user_id, user.user_ref, candidate, &new_hash, now)
            .await?;
        let row = self.install_password(now, user.user_ref, user_status, new_hash).await?;
        debug!("UserId {} password has been changed", user.user_id);
        Ok(row)
    }

    /// Install `plaintext` as the new current password without policy checks
    /// (reset promotion, administrative assignment).
    async fn set_password(
        &self,
        now: DateTime<Utc>,
        user: &User,
        user_status: &mut UserStatus,
        plaintext: &str,
    ) -> Result<Password, AuthError> {
        let new_hash = self.hasher.hash(&user.user_id, plaintext);
        self.install_password(now, user.user_ref, user_status, new_hash)
            .await
    }

    async fn install_password(
        &self,
        now: DateTime<Utc>,
        user_ref: Uuid,
        user_status: &mut UserStatus,
        new_hash: PasswordHash,
    ) -> Result<Password, AuthError> {
        user_status.current_password_serial += 1;
        let row = Password {
            user_ref,
            serial: user_status.current_password_serial,
            password_hash: new_hash,
            created: now,
            expires: now + Duration::days(i64::from(self.config.password_expiration_days)),
            user_expiry: now + Duration::days(i64::from(self.config.user_expiration_days)),
            reset_password_hash: None,
            when_last_password_reset: None,
        };
        self.store.save_password(&row).await?;
        Ok(row)
    }

    /// Issue a one-time reset credential for `user_id` if `email_address`
    /// matches the account, rate-limited per user.
    ///
    /// The raw token is returned for out-of-band delivery; only its hash is
    /// stored, on the current password row.
    ///
    /// # Errors
    /// `NotAuthenticated` when the user is unknown, inactive, or the email
    /// does not match; `ResetRequestThrottled` within the configured
    /// interval.
    pub async fn request_password_reset(
        &self,
        now: DateTime<Utc>,
        user_id: &str,
        email_address: &str,
    ) -> Result<String, AuthError> {
        let user = self
            .store
            .user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotAuthenticated)?;
        let email_matches = user
            .email_address
            .as_deref()
            .is_some_and(|stored| stored.eq_ignore_ascii_case(email_address));
        if !user.is_active || !email_matches {
            info!("Password reset request denied for userId {user_id}");
            return Err(AuthError::NotAuthenticated);
        }

        let user_status = self
            .store
            .status_by_user(user.user_ref)
            .await?
            .ok_or(AuthError::UserStatusNotFound)?;
        let mut current = self
            .store
            .password_by_serial(user.user_ref, user_status.current_password_serial)
            .await?
            .ok_or(AuthError::PasswordNotFound)?;

        let interval = Duration::minutes(i64::from(self.config.reset_request_interval_minutes));
        if current
            .when_last_password_reset
            .is_some_and(|last| last + interval > now)
        {
            info!("Password reset request throttled for userId {user_id}");
            return Err(AuthError::ResetRequestThrottled);
        }

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.config.random_password_length)
            .map(char::from)
            .collect();
        current.reset_password_hash = Some(self.hasher.hash(user_id, &token));
        current.when_last_password_reset = Some(now);
        self.store.save_password(&current).await?;
        info!("Password reset issued for userId {user_id}");
        Ok(token)
    }
}
