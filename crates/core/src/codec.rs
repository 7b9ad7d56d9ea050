//! Wire codec shared by both grid protocols.
//!
//! The extended ("mext") protocol addresses every message with a single
//! header byte: section in the high nibble, command in the low nibble.
//! LED payloads are packed either as bitfields (one bit per cell, LSB first)
//! or as nybble arrays (two 4-bit levels per byte, first level high).
//!
//! Every numeric input is clamped, never rejected.

/// Message sections of the extended protocol.
pub mod section {
    /// System queries and responses.
    pub const SYSTEM: u8 = 0x0;
    /// LED grid output.
    pub const LED_GRID: u8 = 0x1;
    /// Key grid input.
    pub const KEY_GRID: u8 = 0x2;
}

/// Highest brightness level a cell or the whole grid accepts.
pub const MAX_LEVEL: i32 = 15;

/// Number of cells in one 8×8 quad.
pub const QUAD_CELLS: usize = 64;

/// Number of cells in one row or column segment.
pub const LINE_CELLS: usize = 8;

/// `max(min(v, hi), lo)`.
pub fn clamp(value: i32, lo: i32, hi: i32) -> i32 {
    value.min(hi).max(lo)
}

/// Clamp a level into `0..=15` and narrow it to a byte.
pub fn clamp_level(level: i32) -> u8 {
    clamp(level, 0, MAX_LEVEL) as u8
}

/// Pack a section and command into one header byte.
pub fn pack_header(section: u8, command: u8) -> u8 {
    ((section & 0x0F) << 4) | (command & 0x0F)
}

/// Split a header byte into `(section, command)`.
pub fn unpack_header(header: u8) -> (u8, u8) {
    (header >> 4, header & 0x0F)
}

/// Pack up to eight on/off states into one byte, state `i` at bit `i`.
pub fn pack_line(states: &[bool]) -> u8 {
    states
        .iter()
        .take(LINE_CELLS)
        .enumerate()
        .fold(0u8, |acc, (i, &on)| acc | (u8::from(on) << i))
}

/// Pack 4-bit levels two per byte, first level in the high nybble.
///
/// The result is always `ceil(length / 2)` bytes; levels past `length` are
/// ignored and missing levels read as zero.
pub fn pack_intensity(levels: &[i32], length: usize) -> Vec<u8> {
    let mut data = vec![0u8; length.div_ceil(2)];
    for (i, &level) in levels.iter().take(length).enumerate() {
        let shift = if i % 2 == 0 { 4 } else { 0 };
        data[i / 2] |= clamp_level(level) << shift;
    }
    data
}

/// Pack 64 on/off states into eight row bytes, cell `i` at byte `i / 8`,
/// bit `i % 8`.
pub fn pack_map_bits(states: &[bool]) -> [u8; 8] {
    let mut data = [0u8; 8];
    for (i, &on) in states.iter().take(QUAD_CELLS).enumerate() {
        data[i / 8] |= u8::from(on) << (i % 8);
    }
    data
}

/// Threshold a level to on/off for hardware without brightness levels.
pub fn level_to_state(level: i32) -> bool {
    level > 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_covers_every_nibble_pair() {
        for s in 0..=15u8 {
            for c in 0..=15u8 {
                assert_eq!(unpack_header(pack_header(s, c)), (s, c));
            }
        }
    }

    #[test]
    fn header_layout() {
        assert_eq!(pack_header(section::LED_GRID, 0x1), 0x11);
        assert_eq!(pack_header(section::KEY_GRID, 0x1), 0x21);
        assert_eq!(pack_header(section::SYSTEM, 0x5), 0x05);
    }

    #[test]
    fn pack_line_sets_lsb_first() {
        let states = [true, false, true, true, false, false, false, false];
        assert_eq!(pack_line(&states), 0b0000_1101);
    }

    #[test]
    fn pack_line_ignores_states_past_eight() {
        let mut states = vec![false; 16];
        states[8] = true;
        states[0] = true;
        assert_eq!(pack_line(&states), 0x01);
    }

    #[test]
    fn pack_line_short_input() {
        assert_eq!(pack_line(&[false, true]), 0x02);
        assert_eq!(pack_line(&[]), 0x00);
    }

    #[test]
    fn pack_intensity_high_nybble_first() {
        assert_eq!(pack_intensity(&[15, 0, 7, 3], 4), vec![0xF0, 0x73]);
    }

    #[test]
    fn pack_intensity_clamps_levels() {
        assert_eq!(pack_intensity(&[99, -4], 2), vec![0xF0]);
    }

    #[test]
    fn pack_intensity_pads_and_truncates() {
        assert_eq!(pack_intensity(&[1], 8), vec![0x10, 0x00, 0x00, 0x00]);
        assert_eq!(pack_intensity(&[1, 2, 3, 4, 5], 2), vec![0x12]);
        assert_eq!(pack_intensity(&[], 64).len(), 32);
    }

    #[test]
    fn pack_intensity_odd_length_rounds_up() {
        assert_eq!(pack_intensity(&[4, 5, 6], 3), vec![0x45, 0x60]);
    }

    #[test]
    fn pack_map_bits_row_major() {
        let mut states = vec![false; 64];
        states[0] = true; // byte 0, bit 0
        states[9] = true; // byte 1, bit 1
        states[63] = true; // byte 7, bit 7
        assert_eq!(
            pack_map_bits(&states),
            [0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80]
        );
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(20, 0, 15), 15);
        assert_eq!(clamp(-1, 0, 15), 0);
        assert_eq!(clamp(9, 0, 15), 9);
    }

    #[test]
    fn level_threshold_is_above_seven() {
        assert!(!level_to_state(7));
        assert!(level_to_state(8));
    }
}
