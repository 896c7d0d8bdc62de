// Library root
// -----------
// This crate exposes a small library surface for the refill job. The
// binary (`main.rs`) loads the config, calls `run` and turns the outcome
// into an exit code.
//
// Module responsibilities:
// - `api`: the portal client (login, refill submission, response checks).
// - `config`: loading and validating the TOML job description.
// - `error`: the error kinds a run can end with.
pub mod api;
pub mod config;
pub mod error;

pub use api::{RefillResult, RefillerClient, SessionState};
pub use config::Config;
pub use error::{RefillError, Step};

use tracing::info;

/// One full run: login, then submit the refill on the same session.
/// Stops at the first failure; the refill is never attempted after a
/// failed login.
pub fn run(config: &Config) -> error::Result<RefillResult> {
    let mut client = RefillerClient::new(config)?;

    info!(base_url = %config.base_url, "logging in to retrieve session cookie");
    client.login()?;

    info!(med_id = %config.med_id, office = %config.office, "login successful, requesting medication refill");
    client.request_refill()
}

/// Exit code for a finished run: 0 on success.
pub fn exit_code(outcome: &error::Result<RefillResult>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}
