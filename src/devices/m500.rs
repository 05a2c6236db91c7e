//! Logitech M500 report decoder
//!
//! 6-byte report carrying two 12-bit two's-complement deltas packed into
//! three bytes:
//!
//! ```text
//! byte 1: x[7:0]
//! byte 2: y[3:0] | x[11:8]
//! byte 3: y[11:4]
//! ```
//!
//! As with the G102 the y axis is flipped after sign extension.

use crate::core::types::SensorDelta;

/// Report length in bytes
pub const REPORT_LENGTH: usize = 6;

const SIGN_BIT: i32 = 0x800;
const SPAN: i32 = 0x1000;

/// Decode one report into a sign-normalized delta
pub fn decode(raw: &[u8; REPORT_LENGTH]) -> SensorDelta {
    let raw_x = (i32::from(raw[2] & 0x0F) << 8) | i32::from(raw[1]);
    let raw_y = (i32::from(raw[2]) >> 4) | (i32::from(raw[3]) << 4);

    let dx = if raw_x & SIGN_BIT == 0 {
        raw_x
    } else {
        raw_x - SPAN
    };
    let dy = if raw_y & SIGN_BIT == 0 {
        -raw_y
    } else {
        SPAN - raw_y
    };

    SensorDelta::new(dx, dy)
}
