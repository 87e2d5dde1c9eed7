//! Password policy enforcement for new passwords.
//!
//! Every check is individually toggled by configuration (absent/zero =
//! disabled) and any single failure short-circuits with
//! `PasswordValidationFailed` carrying a reason.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::auth::config::{AuthConfig, PasswordBlacklist};
use crate::auth::error::AuthError;
use crate::auth::model::PasswordHash;
use crate::auth::repository::PasswordRepository;

fn policy_violation(reason: impl Into<String>) -> AuthError {
    AuthError::PasswordValidationFailed {
        reason: reason.into(),
    }
}

/// Returns the blacklist entry the candidate falls on, if any.
///
/// Prefix mode realizes "starts with entry" as membership in the half-open
/// lexicographic range `[entry, entry + char::MAX)`, without wildcard scanning.
#[must_use]
pub fn blacklist_match<'a>(blacklist: &'a PasswordBlacklist, candidate: &str) -> Option<&'a str> {
    let normalized;
    let candidate = if blacklist.case_insensitive {
        normalized = candidate.to_uppercase();
        normalized.as_str()
    } else {
        candidate
    };
    for entry in &blacklist.entries {
        if blacklist.prefix_match {
            let upper = format!("{entry}{}", char::MAX);
            if candidate >= entry.as_str() && candidate < upper.as_str() {
                return Some(entry);
            }
        } else if candidate == entry {
            return Some(entry);
        }
    }
    None
}

pub struct PasswordPolicyEnforcer<'a, S> {
    store: &'a S,
    config: &'a AuthConfig,
}

impl<'a, S: PasswordRepository> PasswordPolicyEnforcer<'a, S> {
    pub fn new(store: &'a S, config: &'a AuthConfig) -> Self {
        Self { store, config }
    }

    /// Validate a candidate password for `user_ref`.
    ///
    /// Check order: minimum length, blacklist, reuse distance (last N
    /// hashes), reuse-blocking period.
    ///
    /// # Errors
    /// `PasswordValidationFailed` on the first violated rule; `Store` when a
    /// history lookup fails.
    pub async fn validate_new_password(
        &self,
        user_id: &str,
        user_ref: Uuid,
        candidate: &str,
        new_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let minimum = self.config.password_minimum_length;
        if minimum > 0 && candidate.chars().count() < minimum as usize {
            warn!("Rejecting password for userId {user_id}: below minimum length {minimum}");
            return Err(policy_violation(format!(
                "password shorter than the minimum length of {minimum}"
            )));
        }

        if let Some(entry) = blacklist_match(&self.config.blacklist, candidate) {
            warn!("Rejecting password for userId {user_id}: blacklisted");
            return Err(policy_violation(format!(
                "password is blacklisted (entry {entry:?})"
            )));
        }

        let differ_n = self.config.password_differ_previous_n;
        if differ_n > 0 {
            let recent = self.store.recent_passwords(user_ref, differ_n).await?;
            if recent.iter().any(|p| p.password_hash == *new_hash) {
                warn!(
                    "Rejecting password for userId {user_id}: matches one of the last {differ_n}"
                );
                return Err(policy_violation(format!(
                    "password must differ from the previous {differ_n} passwords"
                )));
            }
        }

        let blocking_days = self.config.password_blocking_period_days;
        if blocking_days > 0 {
            if let Some(previous) = self.store.password_by_hash(user_ref, new_hash).await? {
                let usable_again = previous.created + Duration::days(i64::from(blocking_days));
                if usable_again > now {
                    warn!(
                        "Rejecting password for userId {user_id}: reusable only after {usable_again}"
                    );
                    return Err(policy_violation(format!(
                        "password cannot be reused before {usable_again}"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blacklist(entries: &[&str], case_insensitive: bool, prefix_match: bool) -> PasswordBlacklist {
        PasswordBlacklist {
            entries: entries.iter().map(ToString::to_string).collect(),
            case_insensitive,
            prefix_match,
        }
    }

    #[test]
    fn exact_mode_matches_only_equal() {
        let list = blacklist(&["password"], false, false);
        assert_eq!(blacklist_match(&list, "password"), Some("password"));
        assert_eq!(blacklist_match(&list, "password1"), None);
        assert_eq!(blacklist_match(&list, "Password"), None);
    }

    #[test]
    fn prefix_mode_covers_the_half_open_range() {
        let list = blacklist(&["qwert"], false, true);
        assert_eq!(blacklist_match(&list, "qwert"), Some("qwert"));
        assert_eq!(blacklist_match(&list, "qwerty123"), Some("qwert"));
        // Just below the lower bound.
        assert_eq!(blacklist_match(&list, "qwer"), None);
        assert_eq!(blacklist_match(&list, "qwes"), None);
    }

    #[test]
    fn case_insensitive_mode_uppercases_candidate() {
        let list = blacklist(&["SECRET"], true, false);
        assert_eq!(blacklist_match(&list, "secret"), Some("SECRET"));
        assert_eq!(blacklist_match(&list, "sEcReT"), Some("SECRET"));
        assert_eq!(blacklist_match(&list, "secrets"), None);
    }

    #[test]
    fn empty_blacklist_matches_nothing() {
        let list = PasswordBlacklist::default();
        assert_eq!(blacklist_match(&list, "anything"), None);
    }
}
