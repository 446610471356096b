//! Hardware boundary of the refresh engine.
//!
//! The [`Scheduler`](crate::Scheduler) only talks to the panel through
//! [`HubDriver`]. Boards with a fast parallel port can implement it directly;
//! [`PinDriver`] covers the common case of individual `embedded-hal` output
//! pins plus a one-shot timer.

use embedded_hal::digital::{OutputPin, PinState};
use fugit::MicrosDurationU32;

use crate::packing::ColorLines;

/// Signals the refresh engine drives.
///
/// Called from the timer interrupt, so implementations must not block and
/// have nowhere to report errors. CLK is expected to idle low.
pub trait HubDriver {
    /// Number of row address lines wired up. A panel with `NROWS` scan rows
    /// needs `NROWS <= 1 << ADDRESS_LINES`.
    const ADDRESS_LINES: usize = 5;

    /// Drive the row address lines (A, B, C, D, E) to `row`.
    fn set_row_address(&mut self, row: u8);

    /// Put one column worth of color data on R1 G1 B1 R2 G2 B2.
    fn set_color_lines(&mut self, lines: ColorLines);

    /// Rising then falling edge on CLK. Leaves the clock low.
    fn pulse_clock(&mut self);

    /// Light (`true`) or blank (`false`) the LEDs. OE is active low on the
    /// connector; the implementation handles the inversion.
    fn set_output_enable(&mut self, enabled: bool);

    /// Drive LAT. Shifted data is transferred on the rising edge.
    fn set_latch(&mut self, high: bool);

    /// Arm the timer so that the next refresh tick happens after `interval`.
    fn schedule_next_interrupt(&mut self, interval: MicrosDurationU32);
}

/// One-shot timer used by [`PinDriver`] to request the next tick.
///
/// Any `FnMut(MicrosDurationU32)` is a `RefreshTimer`, so a closure that
/// reloads a hardware alarm is enough.
pub trait RefreshTimer {
    /// Fire the refresh interrupt once, `interval` from now.
    fn schedule(&mut self, interval: MicrosDurationU32);
}

impl<F: FnMut(MicrosDurationU32)> RefreshTimer for F {
    fn schedule(&mut self, interval: MicrosDurationU32) {
        self(interval);
    }
}

/// The HUB75 connector signals, one output pin each.
///
/// `ADDR` is the number of address lines: 3 for 1/8 scan, 4 for 1/16 scan
/// and 5 for 1/32 scan panels. `address[0]` is line A.
pub struct HubPins<P, const ADDR: usize> {
    /// Red, upper half
    pub r1: P,
    /// Green, upper half
    pub g1: P,
    /// Blue, upper half
    pub b1: P,
    /// Red, lower half
    pub r2: P,
    /// Green, lower half
    pub g2: P,
    /// Blue, lower half
    pub b2: P,
    /// Row address lines, least significant first
    pub address: [P; ADDR],
    /// Shift clock
    pub clock: P,
    /// Latch / strobe
    pub latch: P,
    /// Output enable, active low
    pub output_enable: P,
}

/// [`HubDriver`] over individual `embedded-hal` output pins.
///
/// Pin errors are ignored. Uses `ADDR` address lines, so it only pairs with
/// panels of at most `1 << ADDR` scan rows.
pub struct PinDriver<P, T, const ADDR: usize> {
    pins: HubPins<P, ADDR>,
    timer: T,
}

impl<P: OutputPin, T: RefreshTimer, const ADDR: usize> PinDriver<P, T, ADDR> {
    const VALID_ADDR: () = assert!(ADDR <= 5, "HUB75 has at most five address lines");

    /// Wrap the pins and the timer. Drives CLK low so the first pulse is a
    /// clean rising edge.
    pub fn new(mut pins: HubPins<P, ADDR>, timer: T) -> Self {
        let () = Self::VALID_ADDR;
        let _ = pins.clock.set_low();
        Self { pins, timer }
    }

    /// Give back the pins and the timer.
    pub fn release(self) -> (HubPins<P, ADDR>, T) {
        (self.pins, self.timer)
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) {
    let _ = pin.set_state(PinState::from(high));
}

impl<P: OutputPin, T: RefreshTimer, const ADDR: usize> HubDriver for PinDriver<P, T, ADDR> {
    const ADDRESS_LINES: usize = ADDR;

    fn set_row_address(&mut self, row: u8) {
        for (bit, pin) in self.pins.address.iter_mut().enumerate() {
            drive(pin, row & (1 << bit) != 0);
        }
    }

    fn set_color_lines(&mut self, lines: ColorLines) {
        let pins = &mut self.pins;
        drive(&mut pins.r1, lines.r1());
        drive(&mut pins.g1, lines.g1());
        drive(&mut pins.b1, lines.b1());
        drive(&mut pins.r2, lines.r2());
        drive(&mut pins.g2, lines.g2());
        drive(&mut pins.b2, lines.b2());
    }

    fn pulse_clock(&mut self) {
        let _ = self.pins.clock.set_high();
        let _ = self.pins.clock.set_low();
    }

    fn set_output_enable(&mut self, enabled: bool) {
        drive(&mut self.pins.output_enable, !enabled);
    }

    fn set_latch(&mut self, high: bool) {
        drive(&mut self.pins.latch, high);
    }

    fn schedule_next_interrupt(&mut self, interval: MicrosDurationU32) {
        self.timer.schedule(interval);
    }
}
