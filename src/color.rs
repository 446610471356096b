//! Color conversion between the `embedded-graphics` 5/6/5 color space and the
//! 4/4/4 values the refresh engine displays.
//!
//! The panel only ever shows 4 bits per channel (16 levels, 4096 colors). All
//! drawing goes through [`Color`] (`Rgb565`) so that `embedded-graphics`
//! primitives can be used unchanged; the framebuffer plucks the top 4 bits of
//! each channel out of the 16-bit value when a pixel is written (see
//! [`to_444`]).
//!
//! The helpers below build [`Color`] values from the formats older sketches
//! and image tools tend to produce:
//! - [`color333`] and [`color444`] promote narrow channels by bit replication,
//!   so full intensity stays full intensity after widening.
//! - [`color888`] and [`color888_gamma`] demote 8-bit channels, optionally
//!   through the [`GAMMA`] table.
//! - [`color_hsv`] walks the color wheel with integer math only.
//!
//! None of the functions can fail: inputs are masked, wrapped or truncated.

use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::pixelcolor::IntoStorage;

use crate::Color;

/// Number of hue steps around the color wheel used by [`color_hsv`].
pub const HUE_STEPS: i32 = 1536;

/// Gamma correction table mapping an 8-bit intensity to a 4-bit one.
///
/// Generated from `round((i / 255) ^ 2.5 * 15)`. The table is monotonic and
/// maps 255 to 15 so white stays at full brightness.
pub const GAMMA: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //
    1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, //
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 3, 3, 3, //
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, //
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, //
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 6, 6, 6, 6, 6, //
    6, 6, 6, 6, 6, 6, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7, //
    7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 9, 9, 9, 9, //
    9, 9, 9, 9, 9, 10, 10, 10, 10, 10, 10, 10, 10, 10, 11, 11, //
    11, 11, 11, 11, 11, 11, 12, 12, 12, 12, 12, 12, 12, 12, 13, 13, //
    13, 13, 13, 13, 13, 14, 14, 14, 14, 14, 14, 14, 15, 15, 15, 15, //
];

#[inline]
fn from_raw(raw: u16) -> Color {
    Color::from(RawU16::new(raw))
}

/// Promote 3/3/3 RGB to 5/6/5.
///
/// Only the low 3 bits of each argument are used.
#[must_use]
pub fn color333(r: u8, g: u8, b: u8) -> Color {
    let (r, g, b) = (u16::from(r), u16::from(g), u16::from(b));
    // RRRrrGGGgggBBBbb
    from_raw(
        ((r & 0x7) << 13)
            | ((r & 0x6) << 10)
            | ((g & 0x7) << 8)
            | ((g & 0x7) << 5)
            | ((b & 0x7) << 2)
            | ((b & 0x6) >> 1),
    )
}

/// Promote 4/4/4 RGB to 5/6/5.
///
/// Only the low 4 bits of each argument are used.
#[must_use]
pub fn color444(r: u8, g: u8, b: u8) -> Color {
    from_raw(promote444(r, g, b))
}

// RRRRrGGGGggBBBBb
fn promote444(r: u8, g: u8, b: u8) -> u16 {
    let (r, g, b) = (u16::from(r), u16::from(g), u16::from(b));
    ((r & 0xF) << 12)
        | ((r & 0x8) << 8)
        | ((g & 0xF) << 7)
        | ((g & 0xC) << 3)
        | ((b & 0xF) << 1)
        | ((b & 0x8) >> 3)
}

/// Demote 8/8/8 RGB to 5/6/5 by truncation (linear color).
#[must_use]
pub fn color888(r: u8, g: u8, b: u8) -> Color {
    from_raw((u16::from(r & 0xF8) << 8) | (u16::from(g & 0xFC) << 3) | u16::from(b >> 3))
}

/// Demote 8/8/8 RGB to 5/6/5, optionally gamma corrected.
///
/// With `gamma` set each channel goes through [`GAMMA`] to a 4-bit value which
/// is then promoted like [`color444`]. Without it this is [`color888`].
#[must_use]
pub fn color888_gamma(r: u8, g: u8, b: u8, gamma: bool) -> Color {
    if gamma {
        color444(
            GAMMA[usize::from(r)],
            GAMMA[usize::from(g)],
            GAMMA[usize::from(b)],
        )
    } else {
        color888(r, g, b)
    }
}

/// Convert hue, saturation and value to a 5/6/5 color.
///
/// `hue` is taken modulo [`HUE_STEPS`] (negative values wrap around), giving
/// six sextants of 256 steps each: red → yellow → green → cyan → blue →
/// magenta → red. `sat` and `val` are full 8-bit ranges.
#[must_use]
pub fn color_hsv(hue: i32, sat: u8, val: u8, gamma: bool) -> Color {
    let hue = hue.rem_euclid(HUE_STEPS) as u16;
    let lo = hue & 0xFF;
    let (r, g, b): (u16, u16, u16) = match hue >> 8 {
        0 => (255, lo, 0),       // R to Y
        1 => (255 - lo, 255, 0), // Y to G
        2 => (0, 255, lo),       // G to C
        3 => (0, 255 - lo, 255), // C to B
        4 => (lo, 0, 255),       // B to M
        _ => (255, 0, 255 - lo), // M to R
    };

    // Saturation and value are offset by one so the blend is a shift.
    let s1 = u16::from(sat) + 1;
    let saturate = |c: u16| 255 - (((255 - c) * s1) >> 8);
    let (r, g, b) = (saturate(r), saturate(g), saturate(b));

    let v1 = u16::from(val) + 1;
    let (r, g, b) = if gamma {
        let correct = |c: u16| GAMMA[usize::from((c * v1) >> 8)];
        (correct(r), correct(g), correct(b))
    } else {
        let scale = |c: u16| ((c * v1) >> 12) as u8;
        (scale(r), scale(g), scale(b))
    };
    color444(r, g, b)
}

/// Split a color into the 4-bit channels the panel displays.
///
/// Bits are selected, never rounded: `(c >> 12, (c >> 7) & 0xF, (c >> 1) & 0xF)`.
#[must_use]
pub fn to_444(color: Color) -> (u8, u8, u8) {
    let c = color.into_storage();
    (
        (c >> 12) as u8,
        ((c >> 7) & 0xF) as u8,
        ((c >> 1) & 0xF) as u8,
    )
}
