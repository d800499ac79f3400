//! Logging initialization.
//!
//! Logs go to stderr, compact by default or one JSON object per line.
//! `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogLevel;

/// Build the filter: `RUST_LOG` if set and valid, otherwise `level`.
fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// Install the global subscriber.
pub fn init(level: LogLevel, json: bool) -> anyhow::Result<()> {
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter(level)))
        .try_init()?;

    Ok(())
}
