//! Policy configuration for the authentication core.
//!
//! Absent / zero values disable the corresponding check.

use crate::auth::error::AuthError;

/// Password blacklist with exact or prefix matching.
#[derive(Clone, Debug, Default)]
pub struct PasswordBlacklist {
    /// Forbidden entries; compared upper-cased when `case_insensitive`.
    pub entries: Vec<String>,
    pub case_insensitive: bool,
    /// Reject candidates that merely *start* with an entry.
    pub prefix_match: bool,
}

/// How identity claims from a federated token are reconciled against the
/// local user record. All updates are best-effort and individually gated.
#[derive(Clone, Debug)]
pub struct ExternalIdentityConfig {
    /// Populate `identity_provider` on first federated login.
    pub auto_set_identity_provider: bool,
    /// Reject when a stored identity provider differs from the claim.
    pub enforce_identity_provider: bool,
    /// Populate `external_id` from the `oid` claim (max 36 chars).
    pub auto_set_external_id: bool,
    /// Keep display name and email in sync with the claims.
    pub update_name_and_email: bool,
}

impl Default for ExternalIdentityConfig {
    fn default() -> Self {
        Self {
            auto_set_identity_provider: true,
            enforce_identity_provider: true,
            auto_set_external_id: true,
            update_name_and_email: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Minimum length for new passwords; 0 disables the check.
    pub password_minimum_length: u32,
    /// New hash must differ from the last N hashes; 0 disables.
    pub password_differ_previous_n: u32,
    /// Days a previously used hash stays unusable; 0 disables.
    pub password_blocking_period_days: u32,
    /// Lifetime of a freshly set password.
    pub password_expiration_days: u32,
    /// Maximum days between user activities before the account expires.
    pub user_expiration_days: u32,
    /// How long a reset hash authenticates after it was issued.
    pub reset_validity_hours: u32,
    /// Minimum interval between reset requests per user.
    pub reset_request_interval_minutes: u32,
    /// Length of generated reset tokens.
    pub random_password_length: usize,
    pub blacklist: PasswordBlacklist,
    pub external: ExternalIdentityConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_minimum_length: 0,
            password_differ_previous_n: 0,
            password_blocking_period_days: 0,
            password_expiration_days: 90,
            user_expiration_days: 180,
            reset_validity_hours: 24,
            reset_request_interval_minutes: 15,
            random_password_length: 16,
            blacklist: PasswordBlacklist::default(),
            external: ExternalIdentityConfig::default(),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn with_password_minimum_length(mut self, length: u32) -> Self {
        self.password_minimum_length = length;
        self
    }

    #[must_use]
    pub fn with_password_differ_previous_n(mut self, n: u32) -> Self {
        self.password_differ_previous_n = n;
        self
    }

    #[must_use]
    pub fn with_password_blocking_period_days(mut self, days: u32) -> Self {
        self.password_blocking_period_days = days;
        self
    }

    #[must_use]
    pub fn with_password_expiration_days(mut self, days: u32) -> Self {
        self.password_expiration_days = days;
        self
    }

    #[must_use]
    pub fn with_reset_validity_hours(mut self, hours: u32) -> Self {
        self.reset_validity_hours = hours;
        self
    }

    #[must_use]
    pub fn with_reset_request_interval_minutes(mut self, minutes: u32) -> Self {
        self.reset_request_interval_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_blacklist(mut self, blacklist: PasswordBlacklist) -> Self {
        self.blacklist = blacklist;
        self
    }

    #[must_use]
    pub fn with_external(mut self, external: ExternalIdentityConfig) -> Self {
        self.external = external;
        self
    }

    /// Reject configurations that cannot be enforced.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` naming the offending field.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.password_expiration_days == 0 {
            return Err(AuthError::InvalidConfiguration(
                "password_expiration_days must be positive".into(),
            ));
        }
        if self.reset_validity_hours == 0 {
            return Err(AuthError::InvalidConfiguration(
                "reset_validity_hours must be positive".into(),
            ));
        }
        if self.random_password_length < 8 {
            return Err(AuthError::InvalidConfiguration(
                "random_password_length must be at least 8".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AuthConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_expiration_is_rejected() {
        let config = AuthConfig::default().with_password_expiration_days(0);
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn short_random_password_is_rejected() {
        let mut config = AuthConfig::default();
        config.random_password_length = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_setters_compose() {
        let config = AuthConfig::default()
            .with_password_minimum_length(12)
            .with_password_differ_previous_n(3)
            .with_reset_validity_hours(48);
        assert_eq!(config.password_minimum_length, 12);
        assert_eq!(config.password_differ_previous_n, 3);
        assert_eq!(config.reset_validity_hours, 48);
    }
}
