//! Logging setup for the devpack binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the binary (or to tests that capture output).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "devpack=info,devpack_config=info";

/// Initialize the tracing subscriber.
///
/// The filter is chosen in this order:
/// 1. `verbose`: debug level for devpack crates
/// 2. `quiet`: errors only
/// 3. `RUST_LOG` environment variable
/// 4. Default: info level for devpack crates
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = filter_for(verbose, quiet);

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("devpack=debug,devpack_config=debug")
    } else if quiet {
        EnvFilter::new("devpack=error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
