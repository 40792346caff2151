//! Process-wide log setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr `tracing` subscriber at `level`.
///
/// `RUST_LOG` overrides `level` when set. Calling this more than once is
/// harmless: later calls leave the first subscriber in place and return
/// `false`.
pub fn init_logging(level: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_line_number(false),
        )
        .try_init()
        .is_ok()
}
