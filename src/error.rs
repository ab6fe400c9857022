use std::io;
use thiserror::Error;

/// Custom error type for netmeter
#[derive(Error, Debug)]
pub enum NetMeterError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Usage source error: {0}")]
    UsageSource(String),

    #[error("Startup error: {0}")]
    Startup(String),
}

/// Result type alias for netmeter
pub type Result<T> = std::result::Result<T, NetMeterError>;

impl NetMeterError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        NetMeterError::Config(msg.into())
    }

    /// Create a persistence error
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        NetMeterError::Persistence(msg.into())
    }

    pub fn usage_source<S: Into<String>>(msg: S) -> Self {
        NetMeterError::UsageSource(msg.into())
    }

    pub fn startup<S: Into<String>>(msg: S) -> Self {
        NetMeterError::Startup(msg.into())
    }

    /// True for failures of the persistent store (sqlite or in-memory).
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            NetMeterError::Persistence(_) | NetMeterError::Database(_)
        )
    }
}
