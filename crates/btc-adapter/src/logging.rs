use tracing_subscriber::{fmt, EnvFilter};

/// Set to `1` to emit JSON log lines instead of human-readable ones.
pub const LOG_JSON_ENV: &str = "BTC_ADAPTER_LOG_JSON";

/// Install a global subscriber filtered by `RUST_LOG` (default `info`),
/// writing to stderr. Does nothing if a subscriber is already installed.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var(LOG_JSON_ENV)
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
