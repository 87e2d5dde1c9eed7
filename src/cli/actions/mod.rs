pub mod server;

/// Action parsed from the command line.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        peers: Vec<String>,
        peer_timeout_seconds: u64,
        password_minimum_length: u32,
        password_differ_previous_n: u32,
        password_blocking_period_days: u32,
        password_expiration_days: u32,
        reset_validity_hours: u32,
        reset_request_interval_minutes: u32,
    },
}
