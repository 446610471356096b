//! Binary Code Modulation refresh state machine.
//!
//! Each timer interrupt calls [`Scheduler::tick`] once. A tick latches the
//! column data shifted in by the previous tick, lights it for an interval
//! proportional to its plane weight and then shifts in the next
//! `(row, plane)` slice while the LEDs are on:
//!
//! ```text
//! tick k:   OE off, LAT high | interval = base << plane | advance (row, plane)
//!           timer(interval), OE on, LAT low | shift COLS columns of (row, plane)
//! ```
//!
//! A frame is `NROWS * 4` ticks and shows every channel of every pixel for
//! `value * base` in total. The only place buffers are swapped is the tick
//! that wraps back to row 0.

use fugit::MicrosDurationU32;

use crate::framebuffer::FrameBuffers;
use crate::packing::{ColorLines, PLANES};
use crate::{HubDriver, Refresh};

/// Refresh timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// On-time of plane 0. Plane `p` is shown for `base_interval << p`.
    pub base_interval: MicrosDurationU32,
    /// Delay between [`Scheduler::start`] and the first tick.
    pub startup_delay: MicrosDurationU32,
}

impl Config {
    /// Timing for panels driven one pin write at a time.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base_interval: MicrosDurationU32::micros(50),
            startup_delay: MicrosDurationU32::micros(200),
        }
    }

    /// Timing for drivers that update all data lines with a single port
    /// write, which shift a row faster.
    #[must_use]
    pub const fn port_write() -> Self {
        Self {
            base_interval: MicrosDurationU32::micros(30),
            ..Self::new()
        }
    }

    /// Replace the plane 0 on-time.
    #[must_use]
    pub const fn with_base_interval(mut self, base_interval: MicrosDurationU32) -> Self {
        self.base_interval = base_interval;
        self
    }

    /// Replace the delay before the first tick.
    #[must_use]
    pub const fn with_startup_delay(mut self, startup_delay: MicrosDurationU32) -> Self {
        self.startup_delay = startup_delay;
        self
    }

    /// On-time of a plane.
    #[inline]
    #[must_use]
    pub const fn plane_interval(&self, plane: usize) -> MicrosDurationU32 {
        MicrosDurationU32::from_ticks(self.base_interval.ticks() << plane)
    }

    /// Time to show one complete frame of `nrows` scan rows.
    #[must_use]
    pub const fn frame_period(&self, nrows: usize) -> MicrosDurationU32 {
        let weights = (1 << PLANES) - 1;
        MicrosDurationU32::from_ticks(self.base_interval.ticks() * weights * nrows as u32)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Refresh-interrupt end of the frame buffers.
///
/// Created by [`FrameBuffers::split`]; owns the [`HubDriver`] and the scan
/// position. Only reads the front buffer. Creating one for a driver with
/// fewer than `log2(NROWS)` address lines fails to compile.
pub struct Scheduler<'b, 'a, D, const ROWS: usize, const COLS: usize, const NROWS: usize> {
    buffers: &'b FrameBuffers<'a, ROWS, COLS, NROWS>,
    driver: D,
    config: Config,
    row: usize,
    plane: usize,
}

impl<'b, 'a, D: HubDriver, const ROWS: usize, const COLS: usize, const NROWS: usize>
    Scheduler<'b, 'a, D, ROWS, COLS, NROWS>
{
    const INITIAL_ROW: usize = NROWS - 1;
    const INITIAL_PLANE: usize = PLANES - 1;
    const ADDRESSABLE: () = assert!(
        NROWS <= 1 << D::ADDRESS_LINES,
        "driver has too few address lines for this panel"
    );

    pub(crate) fn new(
        buffers: &'b FrameBuffers<'a, ROWS, COLS, NROWS>,
        driver: D,
        config: Config,
    ) -> Self {
        let () = Self::ADDRESSABLE;
        Self {
            buffers,
            driver,
            config,
            row: Self::INITIAL_ROW,
            plane: Self::INITIAL_PLANE,
        }
    }

    /// Current scan row, the one whose data was shifted by the last tick.
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Current plane, the one whose data was shifted by the last tick.
    #[must_use]
    pub fn plane(&self) -> usize {
        self.plane
    }

    /// Timing in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The driver, e.g. to inspect a test double.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Give back the driver.
    pub fn release(self) -> D {
        self.driver
    }

    /// Put the panel in its idle state and arm the first interrupt.
    pub fn start(&mut self) {
        self.driver.set_latch(false);
        self.driver.set_output_enable(false);
        self.driver.set_row_address(0);
        self.driver.set_color_lines(ColorLines::OFF);
        self.row = Self::INITIAL_ROW;
        self.plane = Self::INITIAL_PLANE;
        self.driver
            .schedule_next_interrupt(self.config.startup_delay);
    }

    /// One refresh step; call from the timer interrupt.
    pub fn tick(&mut self) {
        // latch what the previous tick shifted in
        self.driver.set_output_enable(false);
        self.driver.set_latch(true);

        let interval = self.config.plane_interval(self.plane);

        self.plane += 1;
        if self.plane == PLANES {
            self.plane = 0;
            self.row += 1;
            if self.row == NROWS {
                self.row = 0;
                self.buffers.swap_if_pending();
            }
        } else if self.plane == 1 {
            // the plane 0 data of this row has just been latched
            self.driver.set_row_address(self.row as u8);
        }

        self.driver.schedule_next_interrupt(interval);
        self.driver.set_output_enable(true);
        self.driver.set_latch(false);

        let front = self.buffers.front();
        for col in 0..COLS {
            self.driver
                .set_color_lines(front.lines(self.row, self.plane, col));
            self.driver.pulse_clock();
        }
    }
}

impl<D: HubDriver, const ROWS: usize, const COLS: usize, const NROWS: usize> Refresh
    for Scheduler<'_, '_, D, ROWS, COLS, NROWS>
{
    fn start(&mut self) {
        Scheduler::start(self);
    }

    fn refresh(&mut self) {
        self.tick();
    }
}
