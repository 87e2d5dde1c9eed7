//! Error taxonomy for the authentication core.
//!
//! Credential-level denials ("this credential did not work") are ordinary
//! results the caller maps to a transport response. Missing reference data
//! for an otherwise-valid user is unexpected and propagates as a hard error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,

    /// Status row missing for an existing user: corrupted reference data.
    #[error("user status record not found")]
    UserStatusNotFound,

    /// No password row matches the current serial number.
    #[error("password record not found")]
    PasswordNotFound,

    #[error("account temporarily frozen")]
    AccountTemporarilyFrozen,

    /// Soft failure; the attempt counter has already been persisted.
    #[error("wrong password ({attempts} consecutive incorrect attempts)")]
    WrongPassword { attempts: i32 },

    #[error("password validation failed: {reason}")]
    PasswordValidationFailed { reason: String },

    /// Generic federated / API-key denial.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("identity provider mismatch")]
    IdentityProviderMismatch,

    #[error("password reset requested too recently")]
    ResetRequestThrottled,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Failure inside a storage or collaborator call.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    /// True for denials that mean "this credential did not work", i.e. results
    /// the coordinator surfaces, as opposed to corrupted reference data or
    /// collaborator failures.
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound
                | Self::AccountTemporarilyFrozen
                | Self::WrongPassword { .. }
                | Self::NotAuthenticated
                | Self::IdentityProviderMismatch
                | Self::ResetRequestThrottled
        )
    }
}
