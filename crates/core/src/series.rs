//! Legacy "series" grid protocol.
//!
//! Frames are one or two bytes (nine for a quad map) with the opcode in the
//! high nibble of the first byte. The hardware has no query support and no
//! per-cell brightness, so those commands are answered locally or degraded
//! to on/off equivalents.

use crate::codec::{clamp_level, level_to_state, pack_line, pack_map_bits, LINE_CELLS};
use crate::device::DeviceIdentity;
use crate::event::{Command, InboundEvent};
use crate::protocol::{Decoded, GridProtocol, Outbound, WireMessage};
use tracing::{trace, warn};

/// Opcodes, device to host.
pub mod input {
    pub const BUTTON_DOWN: u8 = 0x00;
    pub const BUTTON_UP: u8 = 0x10;
}

/// Opcodes, host to device.
pub mod output {
    pub const LED_ON: u8 = 0x20;
    pub const LED_OFF: u8 = 0x30;
    pub const LED_ROW_8: u8 = 0x40;
    pub const LED_COL_8: u8 = 0x50;
    pub const LED_ROW_16: u8 = 0x60;
    pub const LED_COL_16: u8 = 0x70;
    pub const LED_FRAME: u8 = 0x80;
    pub const CLEAR: u8 = 0x90;
    pub const INTENSITY: u8 = 0xA0;
}

const DEGRADE_ON_OFF: &str = "series does not support LED levels, degrading to on/off";
const DEGRADE_INTENSITY: &str = "series does not support LED levels, degrading to intensity";

/// Driver for series grids. Holds the identity so grid size can be derived
/// from the serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDriver {
    identity: DeviceIdentity,
}

fn thresholded(levels: &[i32]) -> Vec<bool> {
    levels.iter().map(|&l| level_to_state(l)).collect()
}

fn led(x: u8, y: u8, on: bool) -> Vec<u8> {
    let op = if on { output::LED_ON } else { output::LED_OFF };
    vec![op, ((x & 0x0F) << 4) | (y & 0x0F)]
}

fn led_all(on: bool) -> Vec<u8> {
    vec![output::CLEAR | u8::from(on)]
}

// Column and row frames carry only the column (or row) index; the other
// offset is ignored by the hardware.
fn led_col(x: u8, state: &[bool]) -> Vec<u8> {
    let op = if state.len() == LINE_CELLS {
        output::LED_COL_8
    } else {
        output::LED_COL_16
    };
    vec![op | (x & 0x0F), pack_line(state)]
}

fn led_row(y: u8, state: &[bool]) -> Vec<u8> {
    let op = if state.len() == LINE_CELLS {
        output::LED_ROW_8
    } else {
        output::LED_ROW_16
    };
    vec![op | (y & 0x0F), pack_line(state)]
}

fn led_map(x: u8, y: u8, cells: &[bool]) -> Vec<u8> {
    let quadrant = (x / 8) + 2 * (y / 8);
    let mut buf = Vec::with_capacity(9);
    buf.push(output::LED_FRAME | (quadrant & 0x03));
    buf.extend_from_slice(&pack_map_bits(cells));
    buf
}

fn intensity(value: i32) -> Vec<u8> {
    vec![output::INTENSITY | clamp_level(value)]
}

impl SeriesDriver {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self { identity }
    }

    fn degraded(bytes: Vec<u8>, command: &Command, note: &'static str) -> Outbound {
        warn!(command = ?command.kind(), "{note}");
        Outbound::Wire(WireMessage::new(bytes, command).degraded(note))
    }
}

impl GridProtocol for SeriesDriver {
    fn encode(&self, command: &Command) -> Outbound {
        let wire = |bytes| Outbound::Wire(WireMessage::new(bytes, command));

        match command {
            Command::Query => {
                warn!("query is not supported on series devices");
                Outbound::Unsupported("query")
            }
            Command::GetId => {
                warn!("getId is not supported on series devices");
                Outbound::Unsupported("get_id")
            }
            Command::GetGridSize => match self.identity.series_grid_size() {
                Some(size) => Outbound::Synthesized(InboundEvent::GridSize {
                    x: size.width,
                    y: size.height,
                }),
                None => {
                    warn!(
                        serial = %self.identity.serial,
                        "could not determine series grid size from serial number"
                    );
                    Outbound::Unsupported("get_grid_size")
                }
            },
            Command::Led { x, y, on } => wire(led(*x, *y, *on)),
            Command::LedAll { on } => wire(led_all(*on)),
            Command::LedCol { x, state, .. } => wire(led_col(*x, state)),
            Command::LedRow { y, state, .. } => wire(led_row(*y, state)),
            Command::LedMap { x, y, state } => wire(led_map(*x, *y, &state.cells())),
            Command::Intensity { value } => wire(intensity(*value)),
            Command::Level { x, y, level } => {
                Self::degraded(led(*x, *y, level_to_state(*level)), command, DEGRADE_ON_OFF)
            }
            Command::LevelAll { level } => {
                Self::degraded(intensity(*level), command, DEGRADE_INTENSITY)
            }
            Command::LevelCol { x, levels, .. } => {
                Self::degraded(led_col(*x, &thresholded(levels)), command, DEGRADE_ON_OFF)
            }
            Command::LevelRow { y, levels, .. } => {
                Self::degraded(led_row(*y, &thresholded(levels)), command, DEGRADE_ON_OFF)
            }
            Command::LevelMap { x, y, levels } => {
                Self::degraded(led_map(*x, *y, &thresholded(levels)), command, DEGRADE_ON_OFF)
            }
        }
    }

    fn decode(&self, data: &[u8]) -> Decoded {
        let mut out = Decoded::default();
        let mut cursor = 0;

        while data.len() > cursor + 1 {
            let header = data[cursor];
            cursor += 1;
            match header {
                input::BUTTON_DOWN | input::BUTTON_UP => {
                    let datum = data[cursor];
                    cursor += 1;
                    let (x, y) = (datum >> 4, datum & 0x0F);
                    let event = if header == input::BUTTON_DOWN {
                        InboundEvent::KeyDown { x, y }
                    } else {
                        InboundEvent::KeyUp { x, y }
                    };
                    trace!(?event, "series RX");
                    out.events.push(event);
                }
                other => {
                    trace!(header = format_args!("0x{other:02X}"), "skipping series byte");
                }
            }
        }

        out.consumed = cursor;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MapState;

    fn driver(serial: &str) -> SeriesDriver {
        SeriesDriver::new(DeviceIdentity::classify(serial).unwrap())
    }

    fn wire(out: Outbound) -> WireMessage {
        match out {
            Outbound::Wire(msg) => msg,
            other => panic!("expected wire frame, got {other:?}"),
        }
    }

    fn bytes(command: Command) -> Vec<u8> {
        wire(driver("m128_0001").encode(&command)).bytes
    }

    #[test]
    fn encode_led_packs_coordinates() {
        assert_eq!(bytes(Command::Led { x: 3, y: 4, on: true }), vec![0x20, 0x34]);
        assert_eq!(bytes(Command::Led { x: 15, y: 7, on: false }), vec![0x30, 0xF7]);
    }

    #[test]
    fn encode_led_all() {
        assert_eq!(bytes(Command::LedAll { on: true }), vec![0x91]);
        assert_eq!(bytes(Command::LedAll { on: false }), vec![0x90]);
    }

    #[test]
    fn encode_row_col_pick_opcode_by_length() {
        let eight = vec![true, false, true, true, false, false, false, false];
        assert_eq!(
            bytes(Command::LedRow {
                x: 8,
                y: 3,
                state: eight.clone()
            }),
            vec![0x43, 0x0D]
        );
        assert_eq!(
            bytes(Command::LedCol {
                x: 5,
                y: 8,
                state: eight
            }),
            vec![0x55, 0x0D]
        );

        let sixteen = vec![true; 16];
        assert_eq!(
            bytes(Command::LedRow {
                x: 0,
                y: 1,
                state: sixteen.clone()
            }),
            vec![0x61, 0xFF]
        );
        assert_eq!(
            bytes(Command::LedCol {
                x: 2,
                y: 0,
                state: sixteen
            }),
            vec![0x72, 0xFF]
        );
    }

    #[test]
    fn encode_map_quadrants() {
        let map = |x, y| {
            bytes(Command::LedMap {
                x,
                y,
                state: MapState::Uniform(false),
            })[0]
        };
        assert_eq!(map(0, 0), 0x80);
        assert_eq!(map(8, 0), 0x81);
        assert_eq!(map(0, 8), 0x82);
        assert_eq!(map(8, 8), 0x83);

        let frame = bytes(Command::LedMap {
            x: 0,
            y: 0,
            state: MapState::Uniform(true),
        });
        assert_eq!(frame.len(), 9);
        assert!(frame[1..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn encode_intensity_clamps() {
        assert_eq!(bytes(Command::Intensity { value: 10 }), vec![0xAA]);
        assert_eq!(bytes(Command::Intensity { value: 99 }), vec![0xAF]);
        assert_eq!(bytes(Command::Intensity { value: -1 }), vec![0xA0]);
    }

    #[test]
    fn level_all_degrades_to_intensity() {
        let d = driver("m256_0001");
        let degraded = wire(d.encode(&Command::LevelAll { level: 10 }));
        let plain = wire(d.encode(&Command::Intensity { value: 10 }));
        assert_eq!(degraded.bytes, plain.bytes);
        assert_eq!(degraded.degraded, Some(DEGRADE_INTENSITY));
        assert!(plain.degraded.is_none());
    }

    #[test]
    fn level_degrades_to_threshold() {
        let d = driver("m64_0001");
        let dim = wire(d.encode(&Command::Level {
            x: 1,
            y: 1,
            level: 7,
        }));
        let bright = wire(d.encode(&Command::Level {
            x: 1,
            y: 1,
            level: 8,
        }));
        assert_eq!(dim.bytes, vec![0x30, 0x11]);
        assert_eq!(bright.bytes, vec![0x20, 0x11]);
        assert_eq!(bright.degraded, Some(DEGRADE_ON_OFF));
    }

    #[test]
    fn level_lines_and_map_reuse_boolean_frames() {
        let d = driver("m128_0001");
        let levels = vec![15, 0, 8, 7, 0, 0, 0, 12];
        let row = wire(d.encode(&Command::LevelRow {
            x: 0,
            y: 2,
            levels: levels.clone(),
        }));
        assert_eq!(row.bytes, vec![0x42, 0b1000_0101]);
        assert!(row.degraded.is_some());

        let col = wire(d.encode(&Command::LevelCol {
            x: 4,
            y: 0,
            levels,
        }));
        assert_eq!(col.bytes, vec![0x54, 0b1000_0101]);

        let map = wire(d.encode(&Command::LevelMap {
            x: 8,
            y: 8,
            levels: vec![9; 64],
        }));
        assert_eq!(map.bytes[0], 0x83);
        assert!(map.bytes[1..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn grid_size_synthesized_from_serial() {
        let out = driver("m256_0001").encode(&Command::GetGridSize);
        assert_eq!(out, Outbound::Synthesized(InboundEvent::GridSize { x: 16, y: 16 }));

        let out = driver("m64_0001").encode(&Command::GetGridSize);
        assert_eq!(out, Outbound::Synthesized(InboundEvent::GridSize { x: 8, y: 8 }));
    }

    #[test]
    fn kit_grid_size_is_unknown() {
        assert!(matches!(
            driver("mk0001").encode(&Command::GetGridSize),
            Outbound::Unsupported(_)
        ));
    }

    #[test]
    fn query_and_id_are_unsupported() {
        let d = driver("m128_0001");
        assert!(matches!(d.encode(&Command::Query), Outbound::Unsupported(_)));
        assert!(matches!(d.encode(&Command::GetId), Outbound::Unsupported(_)));
    }

    #[test]
    fn decode_key_events() {
        let decoded = driver("m128_0001").decode(&[0x00, 0x52, 0x10, 0x52]);
        assert_eq!(
            decoded.events,
            vec![
                InboundEvent::KeyDown { x: 5, y: 2 },
                InboundEvent::KeyUp { x: 5, y: 2 },
            ]
        );
        assert_eq!(decoded.consumed, 4);
    }

    #[test]
    fn decode_skips_unknown_bytes_one_at_a_time() {
        let decoded = driver("m128_0001").decode(&[0xE0, 0xD0, 0x00, 0x31]);
        assert_eq!(decoded.events, vec![InboundEvent::KeyDown { x: 3, y: 1 }]);
        assert_eq!(decoded.consumed, 4);
    }

    #[test]
    fn loopback_key_coordinates_survive() {
        let d = driver("m256_0001");
        for (x, y) in [(0, 0), (15, 15), (7, 9)] {
            let coord = (x << 4) | y;
            let decoded = d.decode(&[input::BUTTON_DOWN, coord, input::BUTTON_UP, coord]);
            assert_eq!(
                decoded.events,
                vec![InboundEvent::KeyDown { x, y }, InboundEvent::KeyUp { x, y }]
            );
        }
    }
}
