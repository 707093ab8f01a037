use tracing_subscriber::{EnvFilter, fmt};

/// `RUST_LOG` wins when set; otherwise the configured level applies, with
/// this crate's own spans always at least at that level.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},encore_server={log_level}")));
    fmt().with_env_filter(filter).with_target(false).compact().init();
}
