//! Logging utilities with segment prefixes.
//!
//! Provides consistent logging setup across idbkv components.

/// Initialize tracing with idbkv defaults.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (RUST_LOG)
/// - Compact format suitable for terminal output
#[cfg(not(target_arch = "wasm32"))]
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
///
/// Does nothing if a global subscriber is already installed.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_with_filter(default_filter: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Segment prefixes for log lines.
pub mod prefix {
    /// Connection opened
    pub const PULSE_OPEN: &str = "✿";
    /// Connection closed
    pub const PULSE_CLOSE: &str = "❀";
    /// Database operations
    pub const DB: &str = "⊔";
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        init_with_filter("debug");
        init();
        tracing::info!("{} logging ready", prefix::DB);
    }
}
