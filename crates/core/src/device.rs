//! Device identity: family classification from the USB serial number.

use crate::error::{Error, Result};
use crate::event::GridSize;
use serde::{Deserialize, Serialize};

/// Known USB vendor ids.
pub mod vendors {
    /// Early FTDI-based grids.
    pub const GENESIS: u16 = 0x0403;
    /// Grids built from 2021 onward.
    pub const GRID_2021: u16 = 0x0483;
}

/// All vendor ids worth probing during enumeration.
pub const SUPPORTED_VENDORS: &[u16] = &[vendors::GENESIS, vendors::GRID_2021];

/// Interface number to claim for a given vendor.
///
/// 2021 grids expose their bulk endpoints on interface 1; everything else
/// uses interface 0.
pub fn interface_for_vendor(vendor_id: u16) -> u8 {
    match vendor_id {
        vendors::GRID_2021 => 1,
        _ => 0,
    }
}

/// Protocol family a grid speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    /// Extended protocol with section/command headers.
    Mext,
    /// Legacy fixed-frame protocol.
    Series,
}

impl DeviceFamily {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mext => "mext",
            Self::Series => "series",
        }
    }
}

impl std::fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed series grid sizes keyed by serial prefix.
const SERIES_SIZES: &[(&str, GridSize)] = &[
    ("m64", GridSize::new(8, 8)),
    ("m128", GridSize::new(16, 8)),
    ("m256", GridSize::new(16, 16)),
];

/// Identity derived once at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub serial: String,
    pub family: DeviceFamily,
}

impl DeviceIdentity {
    /// Classify a serial number.
    ///
    /// - `m64…`, `m128…`, `m256…`, `mk…` → series
    /// - `m` or `M` followed by a digit → mext
    /// - anything else is unsupported
    pub fn classify(serial: &str) -> Result<Self> {
        let family = if series_size_for(serial).is_some() || serial.starts_with("mk") {
            DeviceFamily::Series
        } else if is_mext_serial(serial) {
            DeviceFamily::Mext
        } else {
            return Err(Error::UnsupportedDevice(serial.to_string()));
        };

        Ok(Self {
            serial: serial.to_string(),
            family,
        })
    }

    /// Grid size implied by a series serial number, if any.
    pub fn series_grid_size(&self) -> Option<GridSize> {
        series_size_for(&self.serial)
    }
}

fn series_size_for(serial: &str) -> Option<GridSize> {
    SERIES_SIZES
        .iter()
        .find(|(prefix, _)| serial.starts_with(prefix))
        .map(|&(_, size)| size)
}

fn is_mext_serial(serial: &str) -> bool {
    let mut chars = serial.chars();
    matches!(chars.next(), Some('m' | 'M')) && chars.next().is_some_and(|c| c.is_ascii_digit())
}
