//! Protocol driver abstraction and the closed set of drivers.
//!
//! Drivers are pure: they turn a [`Command`] into bytes (or into a locally
//! synthesized event) and turn an inbound transfer into events. They never
//! touch the transport.

use crate::device::{DeviceFamily, DeviceIdentity};
use crate::event::{Command, InboundEvent};
use crate::mext::MextDriver;
use crate::series::SeriesDriver;

/// An encoded outbound frame plus where it came from.
///
/// `origin` and `degraded` are for tracing and tests; only `bytes` goes on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub bytes: Vec<u8>,
    pub origin: Command,
    /// Set when the command was replaced by a lesser equivalent.
    pub degraded: Option<&'static str>,
}

impl WireMessage {
    pub fn new(bytes: Vec<u8>, origin: &Command) -> Self {
        Self {
            bytes,
            origin: origin.clone(),
            degraded: None,
        }
    }

    pub fn degraded(mut self, note: &'static str) -> Self {
        self.degraded = Some(note);
        self
    }
}

/// What a driver does with a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write these bytes to the device.
    Wire(WireMessage),
    /// Answer locally without touching the wire.
    Synthesized(InboundEvent),
    /// Nothing to send on this hardware.
    Unsupported(&'static str),
}

/// Result of decoding one inbound transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub events: Vec<InboundEvent>,
    /// Bytes consumed before decoding finished or stopped.
    pub consumed: usize,
}

/// Capability shared by every protocol driver.
pub trait GridProtocol {
    /// Encode one abstract command.
    fn encode(&self, command: &Command) -> Outbound;

    /// Decode every complete frame in an inbound transfer.
    fn decode(&self, data: &[u8]) -> Decoded;
}

/// The driver bound to a connected device.
#[derive(Debug, Clone)]
pub enum Driver {
    Mext(MextDriver),
    Series(SeriesDriver),
}

impl Driver {
    /// Pick the driver for a classified device.
    pub fn for_identity(identity: &DeviceIdentity) -> Self {
        match identity.family {
            DeviceFamily::Mext => Self::Mext(MextDriver),
            DeviceFamily::Series => Self::Series(SeriesDriver::new(identity.clone())),
        }
    }

    pub fn family(&self) -> DeviceFamily {
        match self {
            Self::Mext(_) => DeviceFamily::Mext,
            Self::Series(_) => DeviceFamily::Series,
        }
    }
}

impl GridProtocol for Driver {
    fn encode(&self, command: &Command) -> Outbound {
        match self {
            Self::Mext(d) => d.encode(command),
            Self::Series(d) => d.encode(command),
        }
    }

    fn decode(&self, data: &[u8]) -> Decoded {
        match self {
            Self::Mext(d) => d.decode(data),
            Self::Series(d) => d.decode(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_follows_family() {
        let mext = DeviceIdentity::classify("m1000123").unwrap();
        let series = DeviceIdentity::classify("m128_0007").unwrap();
        assert_eq!(Driver::for_identity(&mext).family(), DeviceFamily::Mext);
        assert_eq!(Driver::for_identity(&series).family(), DeviceFamily::Series);
    }

    #[test]
    fn variants_encode_led_differently() {
        let cmd = Command::Led { x: 3, y: 4, on: true };
        let mext = Driver::for_identity(&DeviceIdentity::classify("m1000123").unwrap());
        let series = Driver::for_identity(&DeviceIdentity::classify("m128_0007").unwrap());

        let bytes = |o: Outbound| match o {
            Outbound::Wire(msg) => msg.bytes,
            other => panic!("expected wire frame, got {other:?}"),
        };
        assert_eq!(bytes(mext.encode(&cmd)), vec![0x11, 3, 4]);
        assert_eq!(bytes(series.encode(&cmd)), vec![0x20, 0x34]);
    }

    #[test]
    fn wire_message_keeps_origin() {
        let cmd = Command::LevelAll { level: 3 };
        let series = Driver::for_identity(&DeviceIdentity::classify("m64_0001").unwrap());
        match series.encode(&cmd) {
            Outbound::Wire(msg) => {
                assert_eq!(msg.origin, cmd);
                assert!(msg.degraded.is_some());
            }
            other => panic!("expected wire frame, got {other:?}"),
        }
    }
}
