//! Logging configuration using tracing
//!
//! Structured logging to stderr with support for the RUST_LOG environment
//! variable. Defaults to "warn" so command output stays clean.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// # Example RUST_LOG values
/// - `RUST_LOG=info` - Show info and above
/// - `RUST_LOG=trellis=debug` - Debug level for trellis only
///
/// # Errors
/// Returns an error if a subscriber has already been initialized.
pub fn init() -> crate::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| crate::TrellisError::Internal(format!("Failed to initialize tracing: {e}")))?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_helper() {
        // Can be called multiple times without panicking
        init_test();
        init_test();
    }
}
