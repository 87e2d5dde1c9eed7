//! API-key credential verification.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::model::{AuthIntermediate, LoginMethod, UserLogLevel, UserStatus};
use crate::auth::repository::{ApiKeyRepository, UserRepository, UserStatusRepository};
use crate::auth::status;

/// Safe log prefix of an API key; the full value never reaches the logs.
fn key_prefix(key: Uuid) -> String {
    let rendered = key.to_string();
    rendered[..18.min(rendered.len())].to_string()
}

pub struct ApiKeyAuthenticator<'a, S> {
    store: &'a S,
}

impl<'a, S> ApiKeyAuthenticator<'a, S>
where
    S: ApiKeyRepository + UserRepository + UserStatusRepository,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Verify `key` and record the login.
    ///
    /// Keys whose log level is the stealth tier leave no status trace at
    /// all: no row is created or mutated (privacy exception).
    ///
    /// # Errors
    /// `NotAuthenticated` when the key is unknown, inactive, or outside its
    /// validity window.
    pub async fn authenticate(
        &self,
        now: DateTime<Utc>,
        key: Uuid,
    ) -> Result<AuthIntermediate, AuthError> {
        let Some(record) = self.store.api_key_by_value(key).await? else {
            info!(
                "Authentication by API key denied, no key configured for {}...",
                key_prefix(key)
            );
            return Err(AuthError::NotAuthenticated);
        };
        if !record.is_active {
            info!(
                "Authentication by API key denied, key {}... is set to inactive",
                key_prefix(key)
            );
            return Err(AuthError::NotAuthenticated);
        }
        let valid_to = record.permissions.as_ref().and_then(|p| p.valid_to);
        if valid_to.is_some_and(|until| until <= now) {
            info!(
                "Authentication by API key denied, key {}... expired",
                key_prefix(key)
            );
            return Err(AuthError::NotAuthenticated);
        }

        let user = self
            .store
            .user_by_ref(record.user_ref)
            .await?
            .ok_or_else(|| anyhow::anyhow!("API key {} references a missing user", key_prefix(key)))?;

        let stealth = record
            .permissions
            .as_ref()
            .and_then(|p| p.log_level)
            .is_some_and(|level| level == UserLogLevel::Stealth);

        let user_status = if stealth {
            // Read-only: an existing row is returned untouched, none is created.
            self.store.status_by_user(user.user_ref).await?
        } else {
            let mut row = self
                .store
                .status_by_user(user.user_ref)
                .await?
                .unwrap_or_else(|| UserStatus::new(user.user_ref));
            status::record_success(&mut row, now, LoginMethod::ApiKey);
            self.store.save_status(&row).await?;
            Some(row)
        };

        info!("UserId {} authenticated by API key", user.user_id);
        Ok(AuthIntermediate {
            tenant_id: user.tenant_id.clone(),
            role_restriction: record.role_ref.or(user.role_ref),
            method: LoginMethod::ApiKey,
            user,
            user_status,
            auth_expires: valid_to,
            password_expired: false,
            password_changed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_prefix_is_short_and_stable() {
        let key = Uuid::nil();
        assert_eq!(key_prefix(key), "00000000-0000-0000");
        assert_eq!(key_prefix(key).len(), 18);
    }
}
