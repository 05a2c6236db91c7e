//! Logitech G102 report decoder
//!
//! 8-byte boot-style report. Each axis is one magnitude byte followed by a
//! sign byte that is zero for the positive branch:
//!
//! ```text
//! byte:  0      1      2     3       4     5       6  7
//!        btn    -      dx    dx_sign dy    dy_sign -  -
//! ```
//!
//! The y axis is flipped so that positive dy points away from the user.

use crate::core::types::SensorDelta;

/// Report length in bytes
pub const REPORT_LENGTH: usize = 8;

const OFFSET_DX: usize = 2;
const OFFSET_DX_SIGN: usize = 3;
const OFFSET_DY: usize = 4;
const OFFSET_DY_SIGN: usize = 5;

/// Decode one report into a sign-normalized delta
pub fn decode(raw: &[u8; REPORT_LENGTH]) -> SensorDelta {
    let dx_raw = i32::from(raw[OFFSET_DX]);
    let dy_raw = i32::from(raw[OFFSET_DY]);

    let dx = if raw[OFFSET_DX_SIGN] == 0 {
        dx_raw
    } else {
        dx_raw - 256
    };
    let dy = if raw[OFFSET_DY_SIGN] == 0 {
        -dy_raw
    } else {
        256 - dy_raw
    };

    SensorDelta::new(dx, dy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_branch() {
        let delta = decode(&[0, 0, 5, 0, 10, 0, 0, 0]);
        assert_eq!(delta, SensorDelta::new(5, -10));
    }

    #[test]
    fn test_sign_bytes_set() {
        let delta = decode(&[0, 0, 5, 1, 10, 1, 0, 0]);
        assert_eq!(delta, SensorDelta::new(5 - 256, 256 - 10));
    }

    #[test]
    fn test_typical_negative_motion() {
        // One count left and one count towards the user
        let delta = decode(&[0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0]);
        assert_eq!(delta, SensorDelta::new(-1, 1));
    }

    #[test]
    fn test_ignores_unused_bytes() {
        let a = decode(&[0, 0, 7, 0, 3, 0, 0, 0]);
        let b = decode(&[0xAA, 0x55, 7, 0, 3, 0, 0x12, 0x34]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_report() {
        assert!(decode(&[0; REPORT_LENGTH]).is_zero());
    }
}
