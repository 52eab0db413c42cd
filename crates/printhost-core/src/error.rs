//! Error handling for printhost
//!
//! Provides error types for the layers of the host:
//! - Configuration errors (missing keys, unparseable files)
//! - Connection errors (serial transport)
//! - Protocol errors (firmware communication)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Configuration error type
///
/// Raised while loading the global configuration or a per-printer
/// configuration file. All variants are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required key is absent from a printer configuration
    #[error("missing required configuration key '{key}' in {file}")]
    MissingKey {
        /// Full dotted path of the missing key, e.g. `printer.connection.device`.
        key: String,
        /// The configuration file being loaded.
        file: String,
    },

    /// The configuration file could not be parsed
    #[error("failed to parse configuration {file}: {reason}")]
    Parse {
        /// The configuration file being loaded.
        file: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The configuration file could not be read
    #[error("failed to read configuration {file}: {source}")]
    Io {
        /// The configuration file being loaded.
        file: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Connection error type
///
/// Represents failures of the serial transport. None of these are fatal
/// once a printer task is running; the task closes the port and retries
/// the connection on its next tick.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to open the serial device
    #[error("failed to open port {port}: {reason}")]
    FailedToOpen {
        /// Device path, e.g. `/dev/ttyUSB0`.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Operation attempted on a closed transport
    #[error("not connected")]
    NotConnected,

    /// The connection dropped mid-operation
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// I/O error on the open port
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol error type
///
/// Firmware-protocol level failures.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The firmware keeps requesting resends without making progress
    #[error("resend storm: {count} consecutive resend errors, giving up")]
    ResendStorm {
        /// Number of consecutive resend errors.
        count: u32,
    },

    /// A packet could not be framed
    #[error("bad packet: {reason}")]
    BadPacket {
        /// The reason framing failed.
        reason: String,
    },
}

/// Main error type for printhost
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
