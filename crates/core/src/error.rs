use thiserror::Error;

/// The umbrella error type for Plover hosts.
#[derive(Error, Debug)]
pub enum PloverError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for Plover operations.
pub type Result<T> = std::result::Result<T, PloverError>;
