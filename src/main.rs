// Entrypoint for the scheduled refill job.
// - Keeps `main` small: set up logging, load config, hand off to `run`.
// - Exactly one final log line per run, and a non-zero exit code on any
//   failure so the scheduler can alert.

use std::process::ExitCode;

use anyhow::Context;
use refiller::{config::Config, exit_code, run};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refiller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize logging")
}

fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("{:#}", e);
    }

    tracing::info!("starting refiller");

    // Config errors end the run before any network traffic.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let outcome = run(&config);
    match &outcome {
        Ok(result) => tracing::info!(
            status = result.status,
            message = result.message.as_deref().unwrap_or(""),
            "medication refill request successful"
        ),
        Err(e) => tracing::error!("medication refill failed: {}", e),
    }
    ExitCode::from(exit_code(&outcome))
}
