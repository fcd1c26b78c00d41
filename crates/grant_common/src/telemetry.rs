//! Telemetry and logging initialization
//!
//! Structured logging with `tracing` and `tracing-subscriber`.
//! stdout belongs to command output, so every log line goes to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber
///
/// # Arguments
/// * `verbose` - DEBUG for the GrantSync crates instead of INFO
/// * `json_format` - emit one JSON object per log line
///
/// `RUST_LOG` overrides both defaults. Calling this twice is harmless;
/// the second call keeps the first subscriber.
///
/// # Example
/// ```
/// grant_common::telemetry::init_tracing(false, false);
/// tracing::info!("Application started");
/// ```
pub fn init_tracing(verbose: bool, json_format: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let result = if json_format {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .with(env_filter)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,grant_collab=debug,grant_sync=debug,grant_store=debug,grant=debug,hyper=info,reqwest=info"
    } else {
        "info"
    }
}
