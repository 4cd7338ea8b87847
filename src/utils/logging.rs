use tracing_subscriber::{fmt, EnvFilter};

/// Default log level, overridable with RUST_LOG.
const LOG_LEVEL: &str = "info";

pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(LOG_LEVEL))
        .unwrap();

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .with_writer(std::io::stderr)
        .init();
}
