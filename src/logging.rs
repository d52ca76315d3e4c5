//! Tracing setup helpers for hosts embedding the bridge.
//!
//! As a library, the crate never installs a subscriber on its own; these
//! helpers give hosts and tools the bridge's defaults. Filtering follows
//! `RUST_LOG` when set and otherwise enables `info` for this crate only, so
//! embedding the bridge does not turn on logging for the whole host.

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "wabridge=info";

/// The bridge's default filter: `RUST_LOG` when set, else crate-scoped
/// `info`.
pub fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a human-readable stderr subscriber with the bridge defaults.
///
/// # Errors
///
/// Fails when a global subscriber is already installed; callers embedding
/// the bridge in a host that configures its own tracing should skip this.
pub fn init_console() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Install a JSON subscriber over a host-supplied writer.
///
/// The writer is where log output goes: a rotating file appender, a test
/// buffer, a pipe to a collector. Formatting is JSON so downstream tooling
/// can parse instance ids and states out of the fields.
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
pub fn init_with_writer<W>(writer: W) -> anyhow::Result<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(default_filter())
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
