use tracing_subscriber::EnvFilter;

use crate::error::PloverError;

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str) -> Result<(), PloverError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| PloverError::Logging(error.to_string()))
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{level},plover_xmpp={level}"))
}
