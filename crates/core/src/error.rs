//! Error types for gridlink-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Generic transport failure (open, claim, transfer).
    #[error("transport error: {0}")]
    Transport(String),

    /// Outbound transfer completed with a non-ok status.
    #[error("write error: transfer status {status}")]
    WriteStatus { status: String },

    /// Outbound transfer wrote fewer bytes than requested.
    #[error("write is missing bytes: wrote {written} of {expected}")]
    MissingBytes { written: usize, expected: usize },

    /// Device went away while a transfer was pending.
    #[error("device disconnected")]
    Disconnected,

    /// Serial number matches no known grid family.
    #[error("device type not supported: serial {0:?}")]
    UnsupportedDevice(String),

    /// Device not found during enumeration.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
