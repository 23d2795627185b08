//! Structured logging bootstrap for cryptkit processes.
//!
//! The kernel only emits `tracing` events; installing a subscriber is the
//! host program's job. These helpers give binaries and tests a consistent
//! setup driven by `RUST_LOG`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize human-readable logging.
///
/// # Example
/// ```no_run
/// use cryptkit_core::logging;
///
/// logging::init();
/// tracing::info!("Kernel starting");
/// ```
pub fn init() {
    init_with_level(DEFAULT_DIRECTIVE);
}

/// Initialize human-readable logging with an explicit fallback directive,
/// used when `RUST_LOG` is not set (e.g. `"cryptkit_kernel=debug"`).
pub fn init_with_level(directive: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(directive))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

/// Initialize JSON logging for log aggregation.
///
/// # Example
/// ```no_run
/// use cryptkit_core::logging;
///
/// logging::init_json();
/// tracing::info!(keyset = "certs.db", "Keyset opened");
/// ```
pub fn init_json() {
    let _ = tracing_subscriber::registry()
        .with(env_filter(DEFAULT_DIRECTIVE))
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_with_level("debug");
        init();
        init_json();
        tracing::debug!("still alive");
    }

    #[test]
    fn test_fallback_filter_parses() {
        let filter = EnvFilter::new("cryptkit_kernel=trace,warn");
        assert!(filter.to_string().contains("cryptkit_kernel"));
    }
}
