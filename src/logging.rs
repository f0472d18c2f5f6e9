//! Tracing subscriber setup

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `Config::log_filter`. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let registry = tracing_subscriber::registry().with(filter);

    if config.log_json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
    .map_err(|e| anyhow!("Failed to initialize tracing: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let config = Config::default();
        // Another test may have installed a subscriber first
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
