//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `notebridge=trace`.
pub const LOG_ENV: &str = "NOTEBRIDGE_LOG";

/// Install a stderr subscriber. Stdout stays free for notifications and
/// command output.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(verbose: bool) -> bool {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()
        .is_ok()
}
