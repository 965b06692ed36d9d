//! Tracing setup for the daemon
//!
//! `RUST_LOG` wins when set; otherwise verbosity picks the level for this
//! crate and the HTTP trace layer.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber.
///
/// * `verbosity` - 0 = info, 1 = debug, 2+ = trace
/// * `json` - emit JSON lines instead of human-readable text
pub fn init_logging(verbosity: u8, json: bool) -> Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={level},tower_http={level},axum::rejection=trace",
            env!("CARGO_CRATE_NAME")
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbosity > 0)
                    .with_file(verbosity > 1)
                    .with_line_number(verbosity > 1),
            )
            .try_init()
    };
    res.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
