use tracing_subscriber::EnvFilter;

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Resolves the filter directive: `-v` flags raise the configured level by
/// one step each, capped at `trace`.
pub fn filter_directive(configured: &str, verbosity: u8) -> String {
    if verbosity == 0 {
        return configured.to_string();
    }
    let base = LEVELS
        .iter()
        .position(|level| level.eq_ignore_ascii_case(configured.trim()))
        .unwrap_or(2);
    let raised = (base + verbosity as usize).min(LEVELS.len() - 1);
    LEVELS[raised].to_string()
}

/// Installs the global subscriber writing to stderr. `RUST_LOG` wins over
/// the configured filter. Calling this twice is harmless.
pub fn init_tracing(configured: &str, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(configured, verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}
