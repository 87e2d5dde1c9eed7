use crate::cli::actions::Action;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        peers: matches
            .get_many::<String>("peer")
            .map(|values| values.map(String::to_string).collect())
            .unwrap_or_default(),
        peer_timeout_seconds: matches
            .get_one::<u64>("peer-timeout-seconds")
            .copied()
            .unwrap_or(3),
        password_minimum_length: matches
            .get_one::<u32>("password-min-length")
            .copied()
            .unwrap_or(0),
        password_differ_previous_n: matches
            .get_one::<u32>("password-history-depth")
            .copied()
            .unwrap_or(0),
        password_blocking_period_days: matches
            .get_one::<u32>("password-blocking-days")
            .copied()
            .unwrap_or(0),
        password_expiration_days: matches
            .get_one::<u32>("password-expiration-days")
            .copied()
            .unwrap_or(90),
        reset_validity_hours: matches
            .get_one::<u32>("reset-validity-hours")
            .copied()
            .unwrap_or(24),
        reset_request_interval_minutes: matches
            .get_one::<u32>("reset-interval-minutes")
            .copied()
            .unwrap_or(15),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_builds_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "gardi",
            "--dsn",
            "postgres://localhost/gardi",
            "--password-min-length",
            "10",
        ]);
        let action = handler(&matches).expect("action");
        let Action::Server {
            port,
            dsn,
            password_minimum_length,
            reset_validity_hours,
            ..
        } = action;
        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost/gardi");
        assert_eq!(password_minimum_length, 10);
        assert_eq!(reset_validity_hours, 24);
    }
}
