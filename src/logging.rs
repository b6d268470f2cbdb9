//! Tracing subscriber setup
//!
//! `RUST_LOG` directives are honored on top of the configured level.

use crate::types::LogLevel;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber at `level`.
///
/// Returns `false` when a subscriber was already installed, which leaves the
/// existing one in place.
pub fn init(level: LogLevel) -> bool {
    let level: tracing::Level = level.into();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init(LogLevel::Debug);
        assert!(!init(LogLevel::Info));
    }
}
