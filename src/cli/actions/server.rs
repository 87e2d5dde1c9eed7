use crate::api;
use crate::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use std::time::Duration;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            peers,
            peer_timeout_seconds,
            password_minimum_length,
            password_differ_previous_n,
            password_blocking_period_days,
            password_expiration_days,
            reset_validity_hours,
            reset_request_interval_minutes,
        } => {
            // Fail early on an unparsable connection string.
            let dsn = Url::parse(&dsn).context("Invalid database connection string")?;

            let auth_config = AuthConfig::default()
                .with_password_minimum_length(password_minimum_length)
                .with_password_differ_previous_n(password_differ_previous_n)
                .with_password_blocking_period_days(password_blocking_period_days)
                .with_password_expiration_days(password_expiration_days)
                .with_reset_validity_hours(reset_validity_hours)
                .with_reset_request_interval_minutes(reset_request_interval_minutes);

            api::new(
                port,
                dsn.to_string(),
                auth_config,
                peers,
                Duration::from_secs(peer_timeout_seconds),
            )
            .await?;
        }
    }

    Ok(())
}
