//! Bit-plane packing of the panel image.
//!
//! A HUB75 panel drives the upper and lower half of the display at the same
//! time: while the address lines select scan row `y`, the R1/G1/B1 lines carry
//! the pixel in row `y` and R2/G2/B2 carry the pixel in row `y + NROWS`. The
//! framebuffer therefore stores a *pixel pair* per column and scan row.
//!
//! With four bit planes per channel a pixel pair needs 24 bits, which are
//! squeezed into three bytes. Each scan row owns three `COLS`-wide strides:
//!
//! ```text
//!  stride 0:  | B2 G2 R2 | B1 G1 R1 | b2  g2  |   weight 2 (+ lower weight 1 G, B)
//!  stride 1:  | B2 G2 R2 | B1 G1 R1 | r2  b1  |   weight 4 (+ lower R, upper B)
//!  stride 2:  | B2 G2 R2 | B1 G1 R1 | g1  r1  |   weight 8 (+ upper weight 1 R, G)
//!  bit:          7  6  5    4  3  2    1   0
//! ```
//!
//! Bits 2..=7 of a stride byte are exactly the image of the six color data
//! lines (see [`ColorLines`]), so planes 1 to 3 are shifted out without any
//! unpacking. The weight-1 plane lives in the two spare bits of the three
//! strides and is reassembled while the longest (weight-8) interval is shown.
//!
//! [`bit_location`] is the single source of truth for this layout.

use bitfield::bitfield;
use embedded_dma::ReadBuffer;

/// Number of bit planes per color channel (4 bits, 16 levels).
pub const PLANES: usize = 4;

/// Number of packed bytes per column and scan row.
pub const STRIDES: usize = PLANES - 1;

bitfield! {
    /// One packed framebuffer byte.
    ///
    /// - Bits 7-5: blue, green, red of the lower half for this stride's plane
    /// - Bits 4-2: blue, green, red of the upper half for this stride's plane
    /// - Bits 1-0: spare bits carrying part of the weight-1 plane
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct PackedByte(u8);
    impl Debug;
    pub lower, _: 7, 5;
    pub upper, _: 4, 2;
    pub spare, _: 1, 0;
}

impl PackedByte {
    /// Wrap a raw framebuffer byte
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }
}

bitfield! {
    /// Image of the six color data lines for one column.
    ///
    /// The bit positions match the packed framebuffer bytes:
    /// - Bit 7: B2, bit 6: G2, bit 5: R2 (lower half)
    /// - Bit 4: B1, bit 3: G1, bit 2: R1 (upper half)
    /// - Bits 1-0: unused, always zero
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct ColorLines(u8);
    impl Debug;
    pub b2, set_b2: 7;
    pub g2, set_g2: 6;
    pub r2, set_r2: 5;
    pub b1, set_b1: 4;
    pub g1, set_g1: 3;
    pub r1, set_r1: 2;
}

impl ColorLines {
    /// All data lines low.
    pub const OFF: Self = Self(0);

    const MASK: u8 = 0b1111_1100;

    /// Build from a raw line image. Bits 0 and 1 are discarded.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::MASK)
    }

    /// Raw line image, bit 2 = R1 through bit 7 = B2.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Lines for planes 1 to 3: the lower and upper fields of the stride
    /// byte already are the line image.
    #[inline]
    #[must_use]
    pub fn from_plane_byte(byte: PackedByte) -> Self {
        Self((byte.lower() << 5) | (byte.upper() << 2))
    }

    /// Lines for plane 0, gathered from the spare bits of the three strides.
    #[inline]
    #[must_use]
    pub fn from_spare_bits(s0: PackedByte, s1: PackedByte, s2: PackedByte) -> Self {
        Self((s0.spare() << 6) | (s1.spare() << 4) | (s2.spare() << 2))
    }
}

/// Color channel selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Red
    Red,
    /// Green
    Green,
    /// Blue
    Blue,
}

impl Channel {
    /// All channels in R, G, B order.
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    const fn index(self) -> u8 {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

/// Byte offset and bit mask of one plane bit in a flat frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitLocation {
    /// Offset into the flat frame bytes
    pub offset: usize,
    /// Single-bit mask within that byte
    pub mask: u8,
}

/// Locate the bit holding `plane` of `channel` for pixel `(x, y)`.
///
/// `cols` is the panel width and `nrows` the number of scan rows (half the
/// panel height). `x < cols`, `y < 2 * nrows` and `plane < PLANES` are
/// required; the result is meaningless otherwise.
#[must_use]
pub const fn bit_location(
    cols: usize,
    nrows: usize,
    x: usize,
    y: usize,
    channel: Channel,
    plane: usize,
) -> BitLocation {
    let lower = y >= nrows;
    let row = if lower { y - nrows } else { y };
    let base = row * cols * STRIDES + x;
    let c = channel.index();

    let (stride, bit) = if plane > 0 {
        (plane - 1, if lower { 5 + c } else { 2 + c })
    } else if lower {
        match channel {
            Channel::Red => (1, 1),
            Channel::Green => (0, 0),
            Channel::Blue => (0, 1),
        }
    } else {
        match channel {
            Channel::Red => (2, 0),
            Channel::Green => (2, 1),
            Channel::Blue => (1, 0),
        }
    };

    BitLocation {
        offset: base + stride * cols,
        mask: 1 << bit,
    }
}

/// One packed frame: `NROWS` scan rows of three `COLS`-wide strides.
///
/// The nested arrays are contiguous, so the frame is byte-for-byte the flat
/// layout `row * COLS * 3 + stride * COLS + x` used by [`bit_location`] and by
/// [`Frame::as_bytes`].
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Frame<const COLS: usize, const NROWS: usize> {
    rows: [[[u8; COLS]; STRIDES]; NROWS],
}

impl<const COLS: usize, const NROWS: usize> Frame<COLS, NROWS> {
    /// Size of a frame in bytes.
    pub const SIZE: usize = crate::compute_buffer_size(NROWS * 2, COLS);

    /// A blank (all black) frame.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rows: [[[0; COLS]; STRIDES]; NROWS],
        }
    }

    /// The frame as flat packed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.rows.as_flattened().as_flattened()
    }

    /// The frame as mutable flat packed bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.rows.as_flattened_mut().as_flattened_mut()
    }

    /// The three strides of a scan row.
    #[inline]
    #[must_use]
    pub fn row(&self, row: usize) -> &[[u8; COLS]; STRIDES] {
        &self.rows[row]
    }

    /// Write the four planes of each channel of a 4/4/4 color.
    pub fn set_pixel(&mut self, x: usize, y: usize, r: u8, g: u8, b: u8) {
        let bytes = self.as_bytes_mut();
        for (channel, value) in Channel::ALL.into_iter().zip([r, g, b]) {
            for plane in 0..PLANES {
                let loc = bit_location(COLS, NROWS, x, y, channel, plane);
                if value & (1 << plane) != 0 {
                    bytes[loc.offset] |= loc.mask;
                } else {
                    bytes[loc.offset] &= !loc.mask;
                }
            }
        }
    }

    /// Read back the 4/4/4 color at `(x, y)`.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let bytes = self.as_bytes();
        let mut rgb = [0u8; 3];
        for (channel, value) in Channel::ALL.into_iter().zip(rgb.iter_mut()) {
            for plane in 0..PLANES {
                let loc = bit_location(COLS, NROWS, x, y, channel, plane);
                if bytes[loc.offset] & loc.mask != 0 {
                    *value |= 1 << plane;
                }
            }
        }
        (rgb[0], rgb[1], rgb[2])
    }

    /// Data line image of column `col` while `plane` of scan `row` is shown.
    #[inline]
    #[must_use]
    pub fn lines(&self, row: usize, plane: usize, col: usize) -> ColorLines {
        let strides = self.row(row);
        if plane > 0 {
            ColorLines::from_plane_byte(PackedByte::new(strides[plane - 1][col]))
        } else {
            ColorLines::from_spare_bits(
                PackedByte::new(strides[0][col]),
                PackedByte::new(strides[1][col]),
                PackedByte::new(strides[2][col]),
            )
        }
    }
}

impl<const COLS: usize, const NROWS: usize> Default for Frame<COLS, NROWS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const COLS: usize, const NROWS: usize> core::fmt::Debug for Frame<COLS, NROWS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame")
            .field("cols", &COLS)
            .field("nrows", &NROWS)
            .field("size", &Self::SIZE)
            .finish()
    }
}

unsafe impl<const COLS: usize, const NROWS: usize> ReadBuffer for Frame<COLS, NROWS> {
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        let bytes = self.as_bytes();
        (bytes.as_ptr(), bytes.len())
    }
}
