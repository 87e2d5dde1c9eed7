//! Account status tracking: attempt counters, throttle windows, login stamps.
//!
//! Per-user state machine: `Normal` or `Throttled(until)`. Throttling is
//! evaluated lazily: an attempt after the window simply proceeds, and a
//! success clears the field.

use chrono::{DateTime, Duration, Utc};

use crate::auth::error::AuthError;
use crate::auth::model::{LoginMethod, UserStatus};

/// Consecutive incorrect attempts before the account is throttled.
/// Fixed policy, not configuration.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// How long a throttled account stays frozen.
pub const THROTTLE_WINDOW_MINUTES: i64 = 5;

/// Hard-reject before any hash is computed when the account is frozen, so a
/// locked account leaks no timing signal about password correctness.
pub fn ensure_not_throttled(status: &UserStatus, now: DateTime<Utc>) -> Result<(), AuthError> {
    match status.account_throttled_until {
        Some(until) if until > now => Err(AuthError::AccountTemporarilyFrozen),
        _ => Ok(()),
    }
}

/// Record a successful login: reset the attempt counter, clear the throttle,
/// and roll the generic and per-method timestamp pairs.
pub fn record_success(status: &mut UserStatus, now: DateTime<Utc>, method: LoginMethod) {
    status.incorrect_attempts = 0;
    status.account_throttled_until = None;
    status.prev_login = status.last_login;
    status.last_login = Some(now);
    match method {
        LoginMethod::Password => {
            status.prev_login_by_password = status.last_login_by_password;
            status.last_login_by_password = Some(now);
        }
        LoginMethod::ApiKey => {
            status.prev_login_by_api_key = status.last_login_by_api_key;
            status.last_login_by_api_key = Some(now);
        }
        LoginMethod::ExternalToken => {
            status.prev_login_by_token = status.last_login_by_token;
            status.last_login_by_token = Some(now);
        }
    }
}

/// Record a failed password attempt; entering the window happens exactly when
/// the counter reaches the threshold. Returns the new counter value.
pub fn record_failure(status: &mut UserStatus, now: DateTime<Utc>) -> i32 {
    status.incorrect_attempts += 1;
    if status.incorrect_attempts >= MAX_FAILED_ATTEMPTS {
        status.account_throttled_until = Some(now + Duration::minutes(THROTTLE_WINDOW_MINUTES));
    }
    status.incorrect_attempts
}
