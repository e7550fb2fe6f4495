pub mod config;
pub mod error;
pub mod logging;

pub use config::{AccountConfig, Config, ConfigError, LoggingConfig, SessionConfig};
pub use error::{PloverError, Result};
