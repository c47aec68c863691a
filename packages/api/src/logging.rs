// ABOUTME: Tracing subscriber setup for processes embedding Crewyard
// ABOUTME: Reads CREWYARD_LOG, then RUST_LOG, then falls back to the supplied filter

use crewyard_core::config::ENV_LOG;
use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber. Returns false when a global subscriber
/// was already set, so repeated calls are harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        init_tracing("debug");
        assert!(!init_tracing("info"));
    }
}
