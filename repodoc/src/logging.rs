//! Diagnostic tracing for repodoc runs.
//!
//! Diagnostics go to stderr and are controlled by `RUST_LOG`. They are separate
//! from the run's product output (artifact, report, `run.json`) written by
//! `io::persist`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `warn`, or `repodoc=debug`
/// when `verbose` is requested.
///
/// ```bash
/// RUST_LOG=repodoc=info repodoc run ./some-repo
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,repodoc=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
