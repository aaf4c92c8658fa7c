//! Structured logging setup for nx
//!
//! The core only emits `tracing` events; installing a subscriber is the
//! embedding application's choice. `init_tracing` wires up the standard
//! stderr subscriber with `NX_LOG` environment override.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize structured logging
///
/// `verbose` raises the default level to debug; an explicit `log_level`
/// (e.g. `"trace"` or `"nx_core=debug"`) wins over both.
pub fn init_tracing(
    verbose: bool,
    log_level: Option<&str>,
    log_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = match (verbose, log_level) {
        (_, Some(level)) => level.to_string(),
        (true, None) => "nx_core=debug".to_string(),
        (false, None) => "nx_core=warn".to_string(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("NX_LOG"))
        .unwrap_or_else(|_| {
            EnvFilter::new(if level.contains('=') {
                level
            } else {
                format!("nx_core={}", level)
            })
        });

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
