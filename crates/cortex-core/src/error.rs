//! Error types for the Cortex core library

use std::io;
use thiserror::Error;

/// Result type alias for Cortex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading probes, validating tasks, or
/// driving the scan execution engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The probe file could not be found or read from disk.
    #[error("probe file unreadable: {0}")]
    ProbeFile(String),

    /// I/O errors with automatic conversion.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A requested port range failed validation (0-65535, start <= end).
    #[error("invalid port range: {0}")]
    PortRange(String),

    /// One-time initialization of a scan mode (syn/udp) failed. Cached
    /// and replayed for every later task of the same mode.
    #[error("mode initialization failed: {0}")]
    ModeInit(String),

    /// The task store returned an error performing a CRUD operation.
    #[error("task store error: {0}")]
    Store(String),

    /// The requested task id does not exist in the store.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Raw-socket/packet-capture errors surfaced by the network layer.
    #[error("network error: {0}")]
    Network(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("TOML parse error: {err}"))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(format!("TOML serialization error: {err}"))
    }
}
