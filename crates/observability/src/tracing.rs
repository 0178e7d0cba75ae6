//! Tracing/logging initialization.
//!
//! Both entry points honour `RUST_LOG`; without it `init` logs at `info` and
//! `init_for_tests` at `debug` for the engine crates.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";
const TEST_FILTER: &str = "warn,eventide_infra=debug,eventide_events=debug";

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// JSON logs with timestamps, configurable via RUST_LOG.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(DEFAULT_FILTER))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Compact logs routed through the test writer so they show up only for
/// failing tests.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(TEST_FILTER))
        .with_test_writer()
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_for_tests();
        init_for_tests();
        init();
        ::tracing::info!("still logging");
    }
}
