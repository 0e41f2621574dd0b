use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber for binaries and services.
///
/// `RUST_LOG` takes precedence over `default_directive` (usually the configured
/// `log_level`). Returns false if a subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
