//! Gateway configuration errors

use thiserror::Error;

/// Failure to read or validate the gateway's TOML configuration
#[derive(Error, Debug)]
pub enum Error {
    /// A value parsed but is out of range or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
