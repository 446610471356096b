//! Interrupt-driven refresh engine for bit-banged HUB75 LED matrix panels.
//!
//! ## How HUB75 LED Displays Work
//!
//! HUB75 RGB LED matrix panels are scanned, time-multiplexed displays that behave like a long
//! daisy-chained shift register rather than a random-access framebuffer.
//!
//! ### Signal names
//! - **R1 G1 B1 / R2 G2 B2** – Serial colour data for the upper and lower halves of the active scan line
//! - **CLK** – Shift-register clock; every rising edge pushes the six colour bits one pixel to the right
//! - **LAT / STB** – Latch; copies the shift-register contents to the LED drivers for the row currently selected by the address lines
//! - **OE** – Output-Enable (active LOW): LEDs are lit while OE is LOW and blanked when it is HIGH
//! - **A B C D (E)** – Row-address select lines (choose which pair of rows is lit)
//!
//! ### Brightness and colour depth (Binary Code Modulation)
//! Each channel is shown with 4 bits (16 levels). Every scan row is displayed once per
//! bit-plane, for a period proportional to the plane's binary weight (1, 2, 4, 8 times a
//! base interval), so over a frame a channel of value `v` is lit for `v` base intervals.
//! See [Batsocks – LED dimming using Binary Code Modulation](https://www.batsocks.co.uk/readme/art_bcm_1.htm)
//! for a deeper explanation.
//!
//! ## Architecture
//!
//! Nothing here uses DMA or a parallel peripheral: every pin is toggled by the CPU from a
//! one-shot timer interrupt, which makes the engine portable to any MCU with a timer and
//! enough GPIOs.
//!
//! - [`packing`]: the frame layout. Each pixel pair (upper and lower half) costs 3 bytes:
//!   one byte per bit-plane 1-3 that is directly the data-line image, with plane 0 spread
//!   over the two spare bits of each byte.
//! - [`framebuffer`]: one or two [`Frame`]s, split into a [`Canvas`] the application draws
//!   on (an `embedded-graphics` [`DrawTarget`](embedded_graphics::draw_target::DrawTarget))
//!   and a [`Scheduler`] the interrupt owns. Swaps happen only at frame boundaries.
//! - [`scheduler`]: the per-tick BCM state machine.
//! - [`driver`]: the [`HubDriver`] hardware boundary and a pin based implementation.
//! - [`color`]: conversions into the 4/4/4 color space.
//! - [`begin`] / [`on_timer_interrupt`]: the single active panel.
//!
//! ## Available Feature Flags
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the public types and logs setup events
//! (allocation, `begin`) with `defmt`. Nothing is logged from the interrupt.
//!
//! ### `alloc` Feature
//! Adds `FrameBuffers::allocate` which reserves the frames on the heap instead
//! of caller-provided storage.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

#[cfg(feature = "alloc")]
extern crate alloc;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::Point;

pub mod active;
pub mod color;
pub mod driver;
pub mod error;
pub mod framebuffer;
pub mod packing;
pub mod scheduler;

pub use active::{begin, is_active, on_timer_interrupt, Refresh};
pub use driver::{HubDriver, HubPins, PinDriver, RefreshTimer};
pub use error::Error;
pub use framebuffer::{Canvas, FrameBuffers, PendingSwap, Rotation, SwapOutcome};
pub use fugit::MicrosDurationU32;
pub use packing::{Frame, PLANES};
pub use scheduler::{Config, Scheduler};

/// Color type used by the canvas.
///
/// Only the top 4 bits of each channel are displayed.
pub type Color = Rgb565;

/// Computes the NROWS value from ROWS for [`FrameBuffers`]
///
/// # Arguments
///
/// * `rows` - Total number of rows in the display
///
/// # Returns
///
/// Number of scan rows, each driving one row in the upper and one in the
/// lower half of the panel
#[must_use]
pub const fn compute_rows(rows: usize) -> usize {
    rows / 2
}

/// Size in bytes of one packed frame, see [`Frame::SIZE`].
#[must_use]
pub const fn compute_buffer_size(rows: usize, cols: usize) -> usize {
    compute_rows(rows) * cols * packing::STRIDES
}

/// Trait for all operations a user may want to call on a framebuffer.
pub trait FrameBufferOperations {
    /// Set a pixel in the back buffer. Off-screen writes are ignored.
    fn write_pixel(&mut self, p: Point, color: Color);

    /// Set every pixel of the back buffer to `color`.
    fn fill_all(&mut self, color: Color);

    /// The raw packed bytes of the back buffer.
    fn back_buffer(&mut self) -> &mut [u8];

    /// Show the back buffer from the next frame on.
    fn swap_buffers(&mut self, copy_forward: bool) -> SwapOutcome;
}
