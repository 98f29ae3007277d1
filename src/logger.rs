//! Logging setup on top of `tracing-subscriber`.
//!
//! Level is picked in this order: `--verbose` (debug), `--quiet` (errors
//! only), `RUST_LOG`, then info. Logs go to stderr so that `--list` and
//! `--dry-run` output stays clean on stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = if verbose {
        EnvFilter::new("devflow=debug,tower_http=debug")
    } else if quiet {
        EnvFilter::new("devflow=error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devflow=info"))
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
