//! Extended ("mext") grid protocol.
//!
//! Every frame starts with a header byte `(section << 4) | command` followed
//! by raw argument bytes. Inbound frames carry no length field, so the
//! payload size is implied by the header; an unknown header ends decoding of
//! the whole transfer.

use crate::codec::{
    clamp_level, pack_header, pack_intensity, pack_line, pack_map_bits, section, LINE_CELLS,
    QUAD_CELLS,
};
use crate::event::{Command, InboundEvent};
use crate::protocol::{Decoded, GridProtocol, Outbound, WireMessage};
use tracing::{debug, trace};

/// System section commands, host to device.
pub mod sys_out {
    pub const QUERY: u8 = 0x0;
    pub const GET_ID: u8 = 0x1;
    pub const GET_GRID_SIZES: u8 = 0x5;
}

/// System section responses, device to host.
pub mod sys_in {
    pub const QUERY_RESPONSE: u8 = 0x0;
    pub const ID: u8 = 0x1;
    pub const GRID_SIZE: u8 = 0x3;
}

/// LED grid section commands.
pub mod led {
    pub const OFF: u8 = 0x0;
    pub const ON: u8 = 0x1;
    pub const ALL_OFF: u8 = 0x2;
    pub const ALL_ON: u8 = 0x3;
    pub const MAP: u8 = 0x4;
    pub const ROW: u8 = 0x5;
    pub const COLUMN: u8 = 0x6;
    pub const INTENSITY: u8 = 0x7;
    pub const LEVEL_SET: u8 = 0x8;
    pub const LEVEL_ALL: u8 = 0x9;
    pub const LEVEL_MAP: u8 = 0xA;
    pub const LEVEL_ROW: u8 = 0xB;
    pub const LEVEL_COLUMN: u8 = 0xC;
}

/// Key grid section events.
pub mod key {
    pub const UP: u8 = 0x0;
    pub const DOWN: u8 = 0x1;
}

/// Length of the device id string in an id response.
pub const ID_LEN: usize = 32;

const HDR_QUERY_RESPONSE: u8 = (section::SYSTEM << 4) | sys_in::QUERY_RESPONSE;
const HDR_ID: u8 = (section::SYSTEM << 4) | sys_in::ID;
const HDR_GRID_SIZE: u8 = (section::SYSTEM << 4) | sys_in::GRID_SIZE;
const HDR_KEY_DOWN: u8 = (section::KEY_GRID << 4) | key::DOWN;
const HDR_KEY_UP: u8 = (section::KEY_GRID << 4) | key::UP;

/// Driver for extended-protocol grids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MextDriver;

fn frame(section: u8, command: u8, args: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + args.len());
    buf.push(pack_header(section, command));
    buf.extend_from_slice(args);
    buf
}

fn with_xy(x: u8, y: u8, payload: &[u8]) -> Vec<u8> {
    let mut args = Vec::with_capacity(2 + payload.len());
    args.extend_from_slice(&[x, y]);
    args.extend_from_slice(payload);
    args
}

impl MextDriver {
    fn encode_bytes(command: &Command) -> Vec<u8> {
        use section::{LED_GRID, SYSTEM};

        match command {
            Command::Query => frame(SYSTEM, sys_out::QUERY, &[]),
            Command::GetId => frame(SYSTEM, sys_out::GET_ID, &[]),
            Command::GetGridSize => frame(SYSTEM, sys_out::GET_GRID_SIZES, &[]),
            Command::Led { x, y, on } => {
                let cmd = if *on { led::ON } else { led::OFF };
                frame(LED_GRID, cmd, &[*x, *y])
            }
            Command::LedAll { on } => {
                let cmd = if *on { led::ALL_ON } else { led::ALL_OFF };
                frame(LED_GRID, cmd, &[])
            }
            Command::LedMap { x, y, state } => frame(
                LED_GRID,
                led::MAP,
                &with_xy(*x, *y, &pack_map_bits(&state.cells())),
            ),
            Command::LedRow { x, y, state } => {
                frame(LED_GRID, led::ROW, &[*x, *y, pack_line(state)])
            }
            Command::LedCol { x, y, state } => {
                frame(LED_GRID, led::COLUMN, &[*x, *y, pack_line(state)])
            }
            Command::Intensity { value } => {
                frame(LED_GRID, led::INTENSITY, &[clamp_level(*value)])
            }
            Command::Level { x, y, level } => {
                frame(LED_GRID, led::LEVEL_SET, &[*x, *y, clamp_level(*level)])
            }
            Command::LevelAll { level } => {
                frame(LED_GRID, led::LEVEL_ALL, &[clamp_level(*level)])
            }
            Command::LevelMap { x, y, levels } => frame(
                LED_GRID,
                led::LEVEL_MAP,
                &with_xy(*x, *y, &pack_intensity(levels, QUAD_CELLS)),
            ),
            Command::LevelRow { x, y, levels } => frame(
                LED_GRID,
                led::LEVEL_ROW,
                &with_xy(*x, *y, &pack_intensity(levels, LINE_CELLS)),
            ),
            Command::LevelCol { x, y, levels } => frame(
                LED_GRID,
                led::LEVEL_COLUMN,
                &with_xy(*x, *y, &pack_intensity(levels, LINE_CELLS)),
            ),
        }
    }
}

impl GridProtocol for MextDriver {
    fn encode(&self, command: &Command) -> Outbound {
        Outbound::Wire(WireMessage::new(Self::encode_bytes(command), command))
    }

    fn decode(&self, data: &[u8]) -> Decoded {
        let mut out = Decoded::default();
        let mut cursor = 0;

        while data.len() > cursor + 1 {
            let header = data[cursor];
            let payload_len = match header {
                HDR_QUERY_RESPONSE | HDR_GRID_SIZE | HDR_KEY_DOWN | HDR_KEY_UP => 2,
                HDR_ID => ID_LEN,
                other => {
                    debug!(
                        header = format_args!("0x{other:02X}"),
                        offset = cursor,
                        "unknown mext header, dropping rest of transfer"
                    );
                    break;
                }
            };

            let start = cursor + 1;
            let Some(payload) = data.get(start..start + payload_len) else {
                debug!(
                    header = format_args!("0x{header:02X}"),
                    available = data.len() - start,
                    needed = payload_len,
                    "truncated mext frame"
                );
                break;
            };

            let event = match header {
                HDR_QUERY_RESPONSE => InboundEvent::QueryResponse {
                    device_type: payload[0],
                    count: payload[1],
                },
                HDR_ID => InboundEvent::DeviceId {
                    id: payload.iter().map(|&b| char::from(b)).collect(),
                },
                HDR_GRID_SIZE => InboundEvent::GridSize {
                    x: payload[0],
                    y: payload[1],
                },
                HDR_KEY_DOWN => InboundEvent::KeyDown {
                    x: payload[0],
                    y: payload[1],
                },
                _ => InboundEvent::KeyUp {
                    x: payload[0],
                    y: payload[1],
                },
            };
            trace!(?event, "mext RX");
            out.events.push(event);
            cursor = start + payload_len;
        }

        out.consumed = cursor;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MapState;

    fn bytes(command: Command) -> Vec<u8> {
        match MextDriver.encode(&command) {
            Outbound::Wire(msg) => {
                assert!(msg.degraded.is_none());
                msg.bytes
            }
            other => panic!("expected wire frame, got {other:?}"),
        }
    }

    #[test]
    fn encode_system_requests() {
        assert_eq!(bytes(Command::Query), vec![0x00]);
        assert_eq!(bytes(Command::GetId), vec![0x01]);
        assert_eq!(bytes(Command::GetGridSize), vec![0x05]);
    }

    #[test]
    fn encode_led_on_off() {
        assert_eq!(bytes(Command::Led { x: 3, y: 4, on: true }), vec![0x11, 3, 4]);
        assert_eq!(bytes(Command::Led { x: 3, y: 4, on: false }), vec![0x10, 3, 4]);
    }

    #[test]
    fn encode_led_all() {
        assert_eq!(bytes(Command::LedAll { on: true }), vec![0x13]);
        assert_eq!(bytes(Command::LedAll { on: false }), vec![0x12]);
    }

    #[test]
    fn encode_row_and_col() {
        let state = vec![true, false, true, true, false, false, false, false];
        assert_eq!(
            bytes(Command::LedRow {
                x: 0,
                y: 2,
                state: state.clone()
            }),
            vec![0x15, 0, 2, 0x0D]
        );
        assert_eq!(
            bytes(Command::LedCol { x: 8, y: 0, state }),
            vec![0x16, 8, 0, 0x0D]
        );
    }

    #[test]
    fn encode_map_broadcast_lights_every_cell() {
        let out = bytes(Command::LedMap {
            x: 8,
            y: 0,
            state: MapState::Uniform(true),
        });
        assert_eq!(out.len(), 11);
        assert_eq!(&out[..3], &[0x14, 8, 0]);
        assert!(out[3..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn encode_intensity_and_levels_clamp() {
        assert_eq!(bytes(Command::Intensity { value: 40 }), vec![0x17, 15]);
        assert_eq!(
            bytes(Command::Level {
                x: 1,
                y: 2,
                level: -3
            }),
            vec![0x18, 1, 2, 0]
        );
        assert_eq!(bytes(Command::LevelAll { level: 9 }), vec![0x19, 9]);
    }

    #[test]
    fn encode_level_lines_and_map() {
        let row = bytes(Command::LevelRow {
            x: 0,
            y: 1,
            levels: vec![15, 0, 7, 3],
        });
        assert_eq!(row, vec![0x1B, 0, 1, 0xF0, 0x73, 0x00, 0x00]);

        let col = bytes(Command::LevelCol {
            x: 2,
            y: 0,
            levels: vec![1; 8],
        });
        assert_eq!(col, vec![0x1C, 2, 0, 0x11, 0x11, 0x11, 0x11]);

        let map = bytes(Command::LevelMap {
            x: 0,
            y: 0,
            levels: vec![5; 64],
        });
        assert_eq!(map.len(), 3 + 32);
        assert_eq!(map[0], 0x1A);
        assert!(map[3..].iter().all(|&b| b == 0x55));
    }

    #[test]
    fn decode_key_down_consumes_whole_buffer() {
        let data = [0x21, 5, 2];
        let decoded = MextDriver.decode(&data);
        assert_eq!(decoded.events, vec![InboundEvent::KeyDown { x: 5, y: 2 }]);
        assert_eq!(decoded.consumed, data.len());
    }

    #[test]
    fn decode_concatenated_frames() {
        let data = [0x21, 0, 0, 0x20, 0, 0, 0x03, 16, 8, 0x00, 1, 1];
        let decoded = MextDriver.decode(&data);
        assert_eq!(
            decoded.events,
            vec![
                InboundEvent::KeyDown { x: 0, y: 0 },
                InboundEvent::KeyUp { x: 0, y: 0 },
                InboundEvent::GridSize { x: 16, y: 8 },
                InboundEvent::QueryResponse {
                    device_type: 1,
                    count: 1
                },
            ]
        );
        assert_eq!(decoded.consumed, data.len());
    }

    #[test]
    fn decode_device_id() {
        let mut data = vec![0x01];
        let mut id = b"monome 128".to_vec();
        id.resize(ID_LEN, 0);
        data.extend_from_slice(&id);
        data.extend_from_slice(&[0x21, 1, 1]);

        let decoded = MextDriver.decode(&data);
        assert_eq!(decoded.events.len(), 2);
        assert_eq!(decoded.events[0].device_name(), Some("monome 128"));
        match &decoded.events[0] {
            InboundEvent::DeviceId { id } => assert_eq!(id.chars().count(), ID_LEN),
            other => panic!("expected device id, got {other:?}"),
        }
        assert_eq!(decoded.events[1], InboundEvent::KeyDown { x: 1, y: 1 });
    }

    #[test]
    fn decode_stops_at_unknown_header() {
        let data = [0x21, 1, 2, 0x0F, 1, 2, 3, 0x21, 3, 4];
        let decoded = MextDriver.decode(&data);
        assert_eq!(decoded.events, vec![InboundEvent::KeyDown { x: 1, y: 2 }]);
        assert_eq!(decoded.consumed, 3);
    }

    #[test]
    fn decode_stops_at_truncated_frame() {
        let data = [0x20, 1, 2, 0x01, b'm', b'1'];
        let decoded = MextDriver.decode(&data);
        assert_eq!(decoded.events, vec![InboundEvent::KeyUp { x: 1, y: 2 }]);
        assert_eq!(decoded.consumed, 3);
    }

    #[test]
    fn decode_ignores_single_trailing_byte() {
        let decoded = MextDriver.decode(&[0x21]);
        assert!(decoded.events.is_empty());
        assert_eq!(decoded.consumed, 0);
    }
}
