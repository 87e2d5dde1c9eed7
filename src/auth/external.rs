//! Federated-token identity binding and claim reconciliation.
//!
//! Claims arrive already validated; this module only decides which local
//! user they bind to and keeps the local record in sync with the provider.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::auth::config::ExternalIdentityConfig;
use crate::auth::error::AuthError;
use crate::auth::model::{AuthIntermediate, ExternalTokenClaims, LoginMethod, User, UserStatus};
use crate::auth::repository::{UserRepository, UserStatusRepository};
use crate::auth::status;

/// Maximum length accepted for an auto-populated external id (`oid` claim).
const MAX_EXTERNAL_ID_LENGTH: usize = 36;
const MAX_NAME_LENGTH: usize = 80;
const MAX_EMAIL_LENGTH: usize = 255;

/// The domain of `local@domain`, requiring both sides non-empty.
fn nontrivial_domain(address: &str) -> Option<&str> {
    let (local, domain) = address.split_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(domain)
}

fn truncated(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

pub struct ExternalTokenAuthenticator<'a, S> {
    store: &'a S,
    config: &'a ExternalIdentityConfig,
}

impl<'a, S> ExternalTokenAuthenticator<'a, S>
where
    S: UserRepository + UserStatusRepository,
{
    pub fn new(store: &'a S, config: &'a ExternalIdentityConfig) -> Self {
        Self { store, config }
    }

    /// Bind a validated claim set to a local user and record the login.
    ///
    /// Resolution order: external id (`oid`) first, then the UPN local part
    /// corroborated by identity provider or email domain.
    ///
    /// # Errors
    /// `NotAuthenticated` when no local user matches or the user is not
    /// enabled for external auth (soft: the caller may try another
    /// method); `IdentityProviderMismatch` when enforcement is configured
    /// and the stored provider differs from the claim.
    pub async fn authenticate(
        &self,
        now: DateTime<Utc>,
        claims: &ExternalTokenClaims,
    ) -> Result<AuthIntermediate, AuthError> {
        let mut user = match self.resolve_user(claims).await? {
            Some(user) => user,
            None => {
                info!(
                    "No local user matches federated claims (oid present: {}, upn present: {})",
                    claims.oid.is_some(),
                    claims.upn.is_some()
                );
                return Err(AuthError::NotAuthenticated);
            }
        };

        if !user.external_auth {
            info!(
                "Federated login denied for userId {}: external auth not enabled",
                user.user_id
            );
            return Err(AuthError::NotAuthenticated);
        }

        self.reconcile(&mut user, claims).await?;

        let mut user_status = self
            .store
            .status_by_user(user.user_ref)
            .await?
            .unwrap_or_else(|| UserStatus::new(user.user_ref));
        status::record_success(&mut user_status, now, LoginMethod::ExternalToken);
        self.store.save_status(&user_status).await?;
        info!("UserId {} authenticated by federated token", user.user_id);

        Ok(AuthIntermediate {
            tenant_id: user.tenant_id.clone(),
            role_restriction: user.role_ref,
            method: LoginMethod::ExternalToken,
            user,
            user_status: Some(user_status),
            auth_expires: claims.expires_at,
            password_expired: false,
            password_changed: false,
        })
    }

    async fn resolve_user(&self, claims: &ExternalTokenClaims) -> Result<Option<User>, AuthError> {
        if let Some(oid) = claims.oid.as_deref() {
            if let Some(user) = self.store.user_by_external_id(oid).await? {
                debug!("Federated claims resolved userId {} by oid", user.user_id);
                return Ok(Some(user));
            }
        }

        let Some(upn) = claims.upn.as_deref() else {
            return Ok(None);
        };
        let Some((local_part, upn_domain)) = upn.split_once('@') else {
            return Ok(None);
        };
        if local_part.is_empty() || upn_domain.is_empty() {
            return Ok(None);
        }
        let Some(user) = self.store.user_by_id(local_part).await? else {
            return Ok(None);
        };

        // A UPN match alone is not enough; corroborate against the stored
        // identity provider, or failing that the email domain.
        if let Some(stored_idp) = user.identity_provider.as_deref() {
            if claims.idp.as_deref() == Some(stored_idp) {
                debug!(
                    "Federated claims resolved userId {} by upn + identity provider",
                    user.user_id
                );
                return Ok(Some(user));
            }
            return Ok(None);
        }
        if let Some(email) = user.email_address.as_deref() {
            if let Some(email_domain) = nontrivial_domain(email) {
                if email_domain.eq_ignore_ascii_case(upn_domain) {
                    debug!(
                        "Federated claims resolved userId {} by upn + email domain",
                        user.user_id
                    );
                    return Ok(Some(user));
                }
            }
            return Ok(None);
        }
        Ok(None)
    }

    /// Best-effort sync of the local record with the claims; every update is
    /// gated by configuration. Persists only when something changed.
    async fn reconcile(
        &self,
        user: &mut User,
        claims: &ExternalTokenClaims,
    ) -> Result<(), AuthError> {
        let mut changed = false;

        match (user.identity_provider.as_deref(), claims.idp.as_deref()) {
            (None, Some(idp)) if self.config.auto_set_identity_provider => {
                user.identity_provider = Some(idp.to_string());
                changed = true;
            }
            (Some(stored), Some(idp))
                if self.config.enforce_identity_provider && stored != idp =>
            {
                info!(
                    "Federated login denied for userId {}: identity provider mismatch",
                    user.user_id
                );
                return Err(AuthError::IdentityProviderMismatch);
            }
            _ => {}
        }

        if user.external_id.is_none() && self.config.auto_set_external_id {
            if let Some(oid) = claims.oid.as_deref() {
                if oid.len() <= MAX_EXTERNAL_ID_LENGTH {
                    user.external_id = Some(oid.to_string());
                    changed = true;
                }
            }
        }

        if self.config.update_name_and_email {
            if let Some(name) = claims.name.as_deref() {
                let name = truncated(name, MAX_NAME_LENGTH);
                if user.name.as_deref() != Some(name.as_str()) {
                    user.name = Some(name);
                    changed = true;
                }
            }
            if let Some(email) = claims.email_address.as_deref() {
                let email = truncated(email, MAX_EMAIL_LENGTH);
                if user.email_address.as_deref() != Some(email.as_str()) {
                    user.email_address = Some(email);
                    changed = true;
                }
            }
        }

        if changed {
            self.store.save_user(user).await?;
            debug!("UserId {} reconciled from federated claims", user.user_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nontrivial_domain_requires_both_sides() {
        assert_eq!(nontrivial_domain("bob@example.com"), Some("example.com"));
        assert_eq!(nontrivial_domain("@example.com"), None);
        assert_eq!(nontrivial_domain("bob@"), None);
        assert_eq!(nontrivial_domain("no-at-sign"), None);
    }

    #[test]
    fn truncated_respects_char_boundaries() {
        assert_eq!(truncated("abcdef", 3), "abc");
        assert_eq!(truncated("äöü", 2), "äö");
        assert_eq!(truncated("short", 80), "short");
    }
}
