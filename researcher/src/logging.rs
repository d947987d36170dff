//! Diagnostic tracing for the researcher binary.
//!
//! Tracing output is for whoever is debugging a run: it goes to stderr, is
//! filtered by `RUST_LOG`, and disappears with the process. What a user keeps
//! is written elsewhere: notes and reports by `io::notes` / `io::reports`, and
//! the prompt/response record by `io::session_log`, all independent of the
//! filter set here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or unparsable.
const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber: compact lines on stderr.
///
/// ```bash
/// RUST_LOG=researcher::io::client=debug researcher run "renewable energy trends"
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
