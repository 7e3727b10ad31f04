//! Portico command-line entry point.
//!
//! Loads configuration, runs the login orchestrator, and reports the verdict
//! through the exit code: 0 for a completed login (including completions the
//! portal never explicitly confirmed), 1 for a failed login, 2 for a
//! configuration problem.

use portico_core::AppConfig;
use portico_login::LoginOrchestrator;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,portico=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    info!("Starting Portico v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::load_with_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    match LoginOrchestrator::new(config).run().await {
        Ok(report) => {
            if report.authenticated {
                info!(
                    "Authenticated after {} attempt(s): {}",
                    report.attempts_used, report.detail
                );
            } else {
                warn!(
                    "Completed without explicit confirmation after {} attempt(s): {}",
                    report.attempts_used, report.detail
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Login failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
