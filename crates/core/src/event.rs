//! Commands, inbound events, and the event kinds observers subscribe to.

use crate::codec::QUAD_CELLS;
use serde::{Deserialize, Serialize};

/// Grid dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub width: u8,
    pub height: u8,
}

impl GridSize {
    pub const fn new(width: u8, height: u8) -> Self {
        Self { width, height }
    }

    /// Whether both dimensions are at least one cell.
    pub fn is_valid(&self) -> bool {
        self.width >= 1 && self.height >= 1
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self::new(16, 8)
    }
}

impl std::fmt::Display for GridSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// State for a full 8×8 quad: either 64 individual cells or one value for all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapState {
    Cells(Vec<bool>),
    Uniform(bool),
}

impl MapState {
    /// Expand to exactly 64 cells. Missing cells read as off.
    pub fn cells(&self) -> Vec<bool> {
        match self {
            Self::Cells(cells) => {
                let mut out = cells.clone();
                out.resize(QUAD_CELLS, false);
                out
            }
            Self::Uniform(on) => vec![*on; QUAD_CELLS],
        }
    }
}

impl From<bool> for MapState {
    fn from(on: bool) -> Self {
        Self::Uniform(on)
    }
}

impl From<Vec<bool>> for MapState {
    fn from(cells: Vec<bool>) -> Self {
        Self::Cells(cells)
    }
}

impl From<&[bool]> for MapState {
    fn from(cells: &[bool]) -> Self {
        Self::Cells(cells.to_vec())
    }
}

/// An abstract grid command, independent of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Query,
    GetId,
    GetGridSize,
    Led { x: u8, y: u8, on: bool },
    LedAll { on: bool },
    LedRow { x: u8, y: u8, state: Vec<bool> },
    LedCol { x: u8, y: u8, state: Vec<bool> },
    LedMap { x: u8, y: u8, state: MapState },
    Intensity { value: i32 },
    Level { x: u8, y: u8, level: i32 },
    LevelAll { level: i32 },
    LevelRow { x: u8, y: u8, levels: Vec<i32> },
    LevelCol { x: u8, y: u8, levels: Vec<i32> },
    LevelMap { x: u8, y: u8, levels: Vec<i32> },
}

impl Command {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Query => EventKind::Query,
            Self::GetId => EventKind::GetId,
            Self::GetGridSize => EventKind::GetGridSize,
            Self::Led { .. } => EventKind::Led,
            Self::LedAll { .. } => EventKind::LedAll,
            Self::LedRow { .. } => EventKind::LedRow,
            Self::LedCol { .. } => EventKind::LedCol,
            Self::LedMap { .. } => EventKind::LedMap,
            Self::Intensity { .. } => EventKind::Intensity,
            Self::Level { .. } => EventKind::Level,
            Self::LevelAll { .. } => EventKind::LevelAll,
            Self::LevelRow { .. } => EventKind::LevelRow,
            Self::LevelCol { .. } => EventKind::LevelCol,
            Self::LevelMap { .. } => EventKind::LevelMap,
        }
    }
}

/// A device-originated event decoded from an inbound transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    KeyDown { x: u8, y: u8 },
    KeyUp { x: u8, y: u8 },
    GridSize { x: u8, y: u8 },
    /// Fixed 32-character identity string, NUL padding included.
    DeviceId { id: String },
    QueryResponse { device_type: u8, count: u8 },
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::KeyDown { .. } => EventKind::KeyDown,
            Self::KeyUp { .. } => EventKind::KeyUp,
            Self::GridSize { .. } => EventKind::GridSize,
            Self::DeviceId { .. } => EventKind::DeviceId,
            Self::QueryResponse { .. } => EventKind::QueryResponse,
        }
    }

    /// Device id with trailing NUL padding removed.
    pub fn device_name(&self) -> Option<&str> {
        match self {
            Self::DeviceId { id } => Some(id.trim_end_matches('\0')),
            _ => None,
        }
    }
}

/// Everything the hub publishes to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "event", rename_all = "snake_case")]
pub enum GridEvent {
    /// A command issued through the hub.
    Command(Command),
    /// A decoded device event.
    Input(InboundEvent),
    /// The read loop terminated on a transport failure.
    Error { message: String },
}

impl GridEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Command(cmd) => cmd.kind(),
            Self::Input(ev) => ev.kind(),
            Self::Error { .. } => EventKind::Error,
        }
    }
}

/// Subscription key for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Query,
    GetId,
    GetGridSize,
    Led,
    LedAll,
    LedRow,
    LedCol,
    LedMap,
    Intensity,
    Level,
    LevelAll,
    LevelRow,
    LevelCol,
    LevelMap,
    KeyDown,
    KeyUp,
    GridSize,
    DeviceId,
    QueryResponse,
    Error,
}
