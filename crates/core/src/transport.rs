//! Transport abstraction for raw USB bulk transfers.
//!
//! The host platform provides the actual USB plumbing; the core only needs
//! open/claim/transfer/close and the serial number for family detection.
//! Real devices and the test mock share this interface.

use crate::error::Result;

/// Completion status of a bulk transfer. Only `Ok` counts as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Ok,
    Stall,
    Other(String),
}

impl TransferStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Stall => f.write_str("stall"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Result of an inbound transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InTransfer {
    pub status: TransferStatus,
    pub data: Vec<u8>,
}

/// Result of an outbound transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutTransfer {
    pub status: TransferStatus,
    pub bytes_written: usize,
}

/// Endpoint direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Abstraction over one open USB device.
///
/// `transfer_in` blocks until a transfer completes. It is only ever called
/// from the bridge's reader thread, while `transfer_out` is called from
/// whichever thread issues commands.
pub trait GridTransport: Send + Sync {
    /// USB serial number string, used to classify the device family.
    fn serial_number(&self) -> &str;

    /// USB vendor id, used to pick the interface to claim.
    fn vendor_id(&self) -> u16;

    fn open(&self) -> Result<()>;

    fn claim_interface(&self, interface: u8) -> Result<()>;

    /// Endpoint number declared by the device's interface descriptors.
    ///
    /// `None` when descriptors are unavailable; callers fall back to defaults.
    fn endpoint(&self, direction: Direction) -> Option<u8> {
        let _ = direction;
        None
    }

    fn transfer_in(&self, endpoint: u8, max_length: usize) -> Result<InTransfer>;

    fn transfer_out(&self, endpoint: u8, data: &[u8]) -> Result<OutTransfer>;

    fn close(&self) -> Result<()>;
}
