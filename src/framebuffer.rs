//! Double-buffered frame storage shared between the application and the
//! refresh interrupt.
//!
//! [`FrameBuffers`] owns one or two packed [`Frame`]s plus the two pieces of
//! state the contexts hand back and forth:
//! - the *swap pending* flag, raised by the application and cleared by the
//!   scheduler once it switched buffers at the top of a frame;
//! - the index of the back buffer, written only by the scheduler.
//!
//! [`FrameBuffers::split`] hands out the two ends: a [`Canvas`] for the
//! application, which is the only writer of the back buffer, and a
//! [`Scheduler`] for the interrupt, which is the only reader of the front
//! buffer. Both flags are plain atomic loads and stores, so this works on
//! cores without compare-and-swap.
//!
//! A single frame is shared by both ends; [`FrameBuffers::split_shared`] is
//! `unsafe` for that reason.
//!
//! # Example
//! ```rust
//! use embedded_graphics::pixelcolor::RgbColor;
//! use embedded_graphics::prelude::*;
//! use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
//! use hub75_bcm::framebuffer::FrameBuffers;
//! use hub75_bcm::packing::Frame;
//! use hub75_bcm::{compute_rows, Color, Config, HubDriver};
//! # use hub75_bcm::packing::ColorLines;
//! # use hub75_bcm::MicrosDurationU32;
//! # struct NoPins;
//! # impl HubDriver for NoPins {
//! #     fn set_row_address(&mut self, _row: u8) {}
//! #     fn set_color_lines(&mut self, _lines: ColorLines) {}
//! #     fn pulse_clock(&mut self) {}
//! #     fn set_output_enable(&mut self, _enabled: bool) {}
//! #     fn set_latch(&mut self, _high: bool) {}
//! #     fn schedule_next_interrupt(&mut self, _interval: MicrosDurationU32) {}
//! # }
//!
//! const ROWS: usize = 32;
//! const COLS: usize = 64;
//! const NROWS: usize = compute_rows(ROWS);
//!
//! let mut storage = [Frame::<COLS, NROWS>::new(); 2];
//! let mut buffers = FrameBuffers::<ROWS, COLS, NROWS>::new(&mut storage, true).unwrap();
//! let (mut canvas, mut scheduler) = buffers.split(NoPins, Config::default());
//!
//! Rectangle::new(Point::new(10, 10), Size::new(20, 8))
//!     .into_styled(PrimitiveStyle::with_fill(Color::RED))
//!     .draw(&mut canvas)
//!     .unwrap();
//!
//! // normally the timer interrupt does this
//! scheduler.tick();
//! ```

use core::convert::Infallible;
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embedded_graphics::pixelcolor::IntoStorage;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Point, Size};
use embedded_hal::delay::DelayNs;

use crate::color::to_444;
use crate::packing::Frame;
use crate::scheduler::{Config, Scheduler};
use crate::{Color, Error, FrameBufferOperations, HubDriver};

/// Display rotation applied to every pixel write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rotation {
    /// No rotation
    #[default]
    Deg0,
    /// 90° clockwise, width and height swap
    Deg90,
    /// 180°
    Deg180,
    /// 270° clockwise, width and height swap
    Deg270,
}

impl Rotation {
    /// Whether this rotation exchanges width and height.
    #[must_use]
    pub const fn is_transposed(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Result of a swap request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwapOutcome {
    /// Front and back buffers were exchanged at a frame boundary.
    Swapped,
    /// Single-buffered panel: there is nothing to swap.
    NoOp,
}

/// Storage for one (single-buffered) or two (double-buffered) frames.
///
/// # Type Parameters
/// - `ROWS`: Total number of rows in the panel
/// - `COLS`: Number of columns in the panel
/// - `NROWS`: Number of scan rows, see [`compute_rows`](crate::compute_rows)
///
/// # Single buffering
/// Without a second frame the application draws into the frame that is
/// being scanned out, exactly like a plain framebuffer. Such buffers can only
/// be split with the `unsafe` [`FrameBuffers::split_shared`].
pub struct FrameBuffers<'a, const ROWS: usize, const COLS: usize, const NROWS: usize> {
    frames: NonNull<Frame<COLS, NROWS>>,
    double_buffered: bool,
    back_index: AtomicU8,
    swap_pending: AtomicBool,
    _storage: PhantomData<&'a mut [Frame<COLS, NROWS>]>,
}

// SAFETY: the frames are only reached through `Canvas` (back buffer, unique
// because splitting borrows `self` mutably) and `Scheduler` (front buffer,
// read only). Safe `split` requires two frames so the two never overlap.
// Buffer selection is handed over through the atomics.
unsafe impl<const ROWS: usize, const COLS: usize, const NROWS: usize> Send
    for FrameBuffers<'_, ROWS, COLS, NROWS>
{
}
unsafe impl<const ROWS: usize, const COLS: usize, const NROWS: usize> Sync
    for FrameBuffers<'_, ROWS, COLS, NROWS>
{
}

impl<'a, const ROWS: usize, const COLS: usize, const NROWS: usize>
    FrameBuffers<'a, ROWS, COLS, NROWS>
{
    const GEOMETRY: () = {
        assert!(ROWS == NROWS * 2, "NROWS must be half of ROWS");
        assert!(NROWS > 0 && NROWS <= 32, "at most 5 row address lines");
        assert!(COLS > 0, "panel needs at least one column");
    };

    /// Number of frames a buffering mode needs.
    #[must_use]
    pub const fn frames_required(double_buffered: bool) -> usize {
        if double_buffered {
            2
        } else {
            1
        }
    }

    /// Take over caller-reserved frame storage.
    ///
    /// The frames in use are cleared to black. Typically the storage is a
    /// `static` obtained through a `StaticCell` so that the buffers can be
    /// handed to the refresh interrupt.
    ///
    /// # Errors
    /// [`Error::Allocation`] when `storage` holds fewer frames than the
    /// buffering mode needs.
    pub fn new(
        storage: &'a mut [Frame<COLS, NROWS>],
        double_buffered: bool,
    ) -> Result<Self, Error> {
        let () = Self::GEOMETRY;
        let required = Self::frames_required(double_buffered);
        if storage.len() < required {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "frame storage too small: {} frame(s) required, {} available",
                required,
                storage.len()
            );
            return Err(Error::Allocation {
                required,
                available: storage.len(),
            });
        }
        for frame in &mut storage[..required] {
            *frame = Frame::new();
        }
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "frame buffers ready: {}x{}, {} frame(s) of {} bytes",
            COLS,
            ROWS,
            required,
            Frame::<COLS, NROWS>::SIZE
        );
        Ok(Self {
            frames: NonNull::from(storage).cast(),
            double_buffered,
            back_index: AtomicU8::new(0),
            swap_pending: AtomicBool::new(false),
            _storage: PhantomData,
        })
    }

    /// Whether two frames are in use.
    #[must_use]
    pub fn is_double_buffered(&self) -> bool {
        self.double_buffered
    }

    /// Index of the frame currently drawn into.
    #[must_use]
    pub fn back_index(&self) -> usize {
        usize::from(self.back_index.load(Ordering::Acquire))
    }

    /// Index of the frame currently scanned out.
    #[must_use]
    pub fn front_index(&self) -> usize {
        if self.double_buffered {
            1 - self.back_index()
        } else {
            0
        }
    }

    /// Whether a swap has been requested and not yet performed.
    #[must_use]
    pub fn swap_pending(&self) -> bool {
        self.swap_pending.load(Ordering::Acquire)
    }

    /// Split into the application and the refresh-interrupt halves.
    ///
    /// The buffers stay borrowed for as long as either half lives, so there
    /// is never more than one canvas writing the back buffer.
    ///
    /// The driver must have enough address lines for `NROWS`; pairing a
    /// 1/16 scan panel with a three line driver does not compile:
    ///
    /// ```rust,compile_fail
    /// # use hub75_bcm::packing::{ColorLines, Frame};
    /// # use hub75_bcm::{Config, FrameBuffers, HubDriver, MicrosDurationU32};
    /// struct ThreeLines;
    ///
    /// impl HubDriver for ThreeLines {
    ///     const ADDRESS_LINES: usize = 3;
    ///     fn set_row_address(&mut self, _row: u8) {}
    ///     fn set_color_lines(&mut self, _lines: ColorLines) {}
    ///     fn pulse_clock(&mut self) {}
    ///     fn set_output_enable(&mut self, _enabled: bool) {}
    ///     fn set_latch(&mut self, _high: bool) {}
    ///     fn schedule_next_interrupt(&mut self, _interval: MicrosDurationU32) {}
    /// }
    ///
    /// let mut storage = [Frame::<64, 16>::new(); 2];
    /// let mut buffers = FrameBuffers::<32, 64, 16>::new(&mut storage, true).unwrap();
    /// let _halves = buffers.split(ThreeLines, Config::default());
    /// ```
    ///
    /// # Panics
    /// When the buffers are single-buffered: the canvas would write the frame
    /// the interrupt is reading. Use [`FrameBuffers::split_shared`] for that.
    pub fn split<D: HubDriver>(
        &mut self,
        driver: D,
        config: Config,
    ) -> (
        Canvas<'_, 'a, ROWS, COLS, NROWS>,
        Scheduler<'_, 'a, D, ROWS, COLS, NROWS>,
    ) {
        assert!(
            self.double_buffered,
            "split needs double buffering, use split_shared for a single frame"
        );
        let shared: &Self = self;
        (Canvas::new(shared), Scheduler::new(shared, driver, config))
    }

    /// Split buffers that may be single-buffered.
    ///
    /// With one frame the canvas draws straight into the frame being scanned
    /// out, and pixels written mid-frame may show up one plane late.
    ///
    /// # Safety
    /// With a single frame the canvas must not write (`write_pixel`,
    /// `fill_all`, drawing, `back_buffer`) while a scheduler tick runs. Either
    /// draw from the same execution context that ticks, or only while the
    /// refresh interrupt is masked. Double-buffered buffers have no extra
    /// requirement.
    pub unsafe fn split_shared<D: HubDriver>(
        &mut self,
        driver: D,
        config: Config,
    ) -> (
        Canvas<'_, 'a, ROWS, COLS, NROWS>,
        Scheduler<'_, 'a, D, ROWS, COLS, NROWS>,
    ) {
        let shared: &Self = self;
        (Canvas::new(shared), Scheduler::new(shared, driver, config))
    }

    /// Called by the scheduler at the top of a frame. Returns `true` when the
    /// buffers were exchanged.
    pub(crate) fn swap_if_pending(&self) -> bool {
        if !self.swap_pending.load(Ordering::Acquire) {
            return false;
        }
        if self.double_buffered {
            let back = self.back_index.load(Ordering::Relaxed);
            self.back_index.store(1 - back, Ordering::Release);
        }
        self.swap_pending.store(false, Ordering::Release);
        true
    }

    fn frame_ptr(&self, index: usize) -> *mut Frame<COLS, NROWS> {
        debug_assert!(index < Self::frames_required(self.double_buffered));
        // SAFETY: index is below the number of frames checked in `new`.
        unsafe { self.frames.as_ptr().add(index) }
    }

    /// The frame being scanned out. Only the scheduler reads it.
    pub(crate) fn front(&self) -> &Frame<COLS, NROWS> {
        // SAFETY: the front frame is never written while double-buffered;
        // single-buffered, `split_shared` callers keep writes out of ticks.
        unsafe { &*self.frame_ptr(self.front_index()) }
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> core::fmt::Debug
    for FrameBuffers<'_, ROWS, COLS, NROWS>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameBuffers")
            .field("rows", &ROWS)
            .field("cols", &COLS)
            .field("frame_size", &Frame::<COLS, NROWS>::SIZE)
            .field("double_buffered", &self.double_buffered)
            .field("back_index", &self.back_index())
            .field("swap_pending", &self.swap_pending())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const ROWS: usize, const COLS: usize, const NROWS: usize> defmt::Format
    for FrameBuffers<'_, ROWS, COLS, NROWS>
{
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "FrameBuffers<{}, {}, {}>", ROWS, COLS, NROWS);
        defmt::write!(f, " frame_size: {}", Frame::<COLS, NROWS>::SIZE);
        defmt::write!(f, " double_buffered: {}", self.double_buffered);
        defmt::write!(f, " back_index: {}", self.back_index());
    }
}

#[cfg(feature = "alloc")]
impl<const ROWS: usize, const COLS: usize, const NROWS: usize>
    FrameBuffers<'static, ROWS, COLS, NROWS>
{
    /// Reserve the frames on the heap.
    ///
    /// The memory is leaked: a panel lives until the device resets.
    ///
    /// # Errors
    /// [`Error::Allocation`] when the allocator cannot provide the frames.
    pub fn allocate(double_buffered: bool) -> Result<Self, Error> {
        use alloc::vec::Vec;

        let required = Self::frames_required(double_buffered);
        let mut frames = Vec::new();
        if frames.try_reserve_exact(required).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("could not allocate {} frame(s)", required);
            return Err(Error::Allocation {
                required,
                available: 0,
            });
        }
        frames.resize(required, Frame::new());
        Self::new(frames.leak(), double_buffered)
    }
}

/// Application end of the frame buffers: draws into the back buffer.
///
/// Implements `embedded-graphics`' [`DrawTarget`] with [`Color`] (`Rgb565`)
/// pixels. Coordinates are in the rotated space, see [`Canvas::set_rotation`].
pub struct Canvas<'b, 'a, const ROWS: usize, const COLS: usize, const NROWS: usize> {
    buffers: &'b FrameBuffers<'a, ROWS, COLS, NROWS>,
    rotation: Rotation,
}

impl<'b, 'a, const ROWS: usize, const COLS: usize, const NROWS: usize>
    Canvas<'b, 'a, ROWS, COLS, NROWS>
{
    fn new(buffers: &'b FrameBuffers<'a, ROWS, COLS, NROWS>) -> Self {
        Self {
            buffers,
            rotation: Rotation::Deg0,
        }
    }

    /// The shared buffers this canvas draws into.
    #[must_use]
    pub fn buffers(&self) -> &FrameBuffers<'a, ROWS, COLS, NROWS> {
        self.buffers
    }

    /// Current rotation.
    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Change the rotation used by subsequent writes.
    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Visible width and height after rotation.
    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        if self.rotation.is_transposed() {
            (ROWS, COLS)
        } else {
            (COLS, ROWS)
        }
    }

    fn back(&self) -> &Frame<COLS, NROWS> {
        // SAFETY: the scheduler never writes frames and the back index only
        // changes while no canvas exists outside a `PendingSwap` or a swap
        // call.
        unsafe { &*self.buffers.frame_ptr(self.buffers.back_index()) }
    }

    fn back_mut(&mut self) -> &mut Frame<COLS, NROWS> {
        // SAFETY: there is a single canvas per split. Double-buffered, the
        // scheduler only reads the other frame; single-buffered, the caller
        // of `split_shared` keeps writes and ticks apart.
        unsafe { &mut *self.buffers.frame_ptr(self.buffers.back_index()) }
    }

    /// Map a rotated coordinate to the physical panel, `None` if off screen.
    fn to_physical(&self, x: i32, y: i32) -> Option<(usize, usize)> {
        let (width, height) = self.dimensions();
        if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        Some(match self.rotation {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (COLS - 1 - y, x),
            Rotation::Deg180 => (COLS - 1 - x, ROWS - 1 - y),
            Rotation::Deg270 => (y, ROWS - 1 - x),
        })
    }

    /// Write a pixel into the back buffer. Off-screen writes are ignored.
    pub fn write_pixel(&mut self, x: i32, y: i32, color: Color) {
        let Some((x, y)) = self.to_physical(x, y) else {
            return;
        };
        let (r, g, b) = to_444(color);
        self.back_mut().set_pixel(x, y, r, g, b);
    }

    /// The 4/4/4 color stored in the back buffer at a rotated coordinate.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Option<(u8, u8, u8)> {
        let (x, y) = self.to_physical(x, y)?;
        Some(self.back().pixel(x, y))
    }

    /// Fill the whole back buffer with one color.
    ///
    /// Black and white set every packed bit identically, so those are a
    /// single byte fill; any other color is written pixel by pixel.
    pub fn fill_all(&mut self, color: Color) {
        let raw = color.into_storage();
        if raw == 0x0000 || raw == 0xFFFF {
            self.back_mut().as_bytes_mut().fill(raw as u8);
            return;
        }
        let (r, g, b) = to_444(color);
        let back = self.back_mut();
        for y in 0..ROWS {
            for x in 0..COLS {
                back.set_pixel(x, y, r, g, b);
            }
        }
    }

    /// Direct access to the packed bytes of the back buffer.
    ///
    /// Used to load pre-packed images; the caller is responsible for
    /// following the layout described in [`packing`](crate::packing).
    pub fn back_buffer(&mut self) -> &mut [u8] {
        self.back_mut().as_bytes_mut()
    }

    /// The packed bytes of the back buffer, headerless.
    #[must_use]
    pub fn dump(&self) -> &[u8] {
        self.back().as_bytes()
    }

    /// Render the back buffer as Rust source for embedding in firmware.
    ///
    /// Produces `static NAME: [u8; N] = [ ... ];` with eight bytes per line.
    /// Loading it back is a `copy_from_slice` into [`Canvas::back_buffer`].
    ///
    /// # Errors
    /// Whatever the writer reports.
    pub fn write_image_source<W: core::fmt::Write>(
        &self,
        name: &str,
        out: &mut W,
    ) -> core::fmt::Result {
        let bytes = self.dump();
        writeln!(out, "static {name}: [u8; {}] = [", bytes.len())?;
        for line in bytes.chunks(8) {
            write!(out, "   ")?;
            for byte in line {
                write!(out, " 0x{byte:02X},")?;
            }
            writeln!(out)?;
        }
        writeln!(out, "];")
    }

    /// Ask the scheduler to show the back buffer from the next frame on.
    ///
    /// The canvas moves into the returned [`PendingSwap`] and comes back once
    /// the swap happened, so nothing can be drawn into a frame that is about
    /// to go on screen:
    ///
    /// ```rust,compile_fail
    /// # use embedded_graphics::pixelcolor::RgbColor;
    /// # use hub75_bcm::packing::{ColorLines, Frame};
    /// # use hub75_bcm::{Color, Config, FrameBuffers, HubDriver, MicrosDurationU32};
    /// # struct NoPins;
    /// # impl HubDriver for NoPins {
    /// #     fn set_row_address(&mut self, _row: u8) {}
    /// #     fn set_color_lines(&mut self, _lines: ColorLines) {}
    /// #     fn pulse_clock(&mut self) {}
    /// #     fn set_output_enable(&mut self, _enabled: bool) {}
    /// #     fn set_latch(&mut self, _high: bool) {}
    /// #     fn schedule_next_interrupt(&mut self, _interval: MicrosDurationU32) {}
    /// # }
    /// let mut storage = [Frame::<8, 2>::new(); 2];
    /// let mut buffers = FrameBuffers::<4, 8, 2>::new(&mut storage, true).unwrap();
    /// let (mut canvas, _scheduler) = buffers.split(NoPins, Config::default());
    /// let pending = canvas.request_swap().unwrap();
    /// core::mem::forget(pending);
    /// canvas.write_pixel(0, 0, Color::RED);
    /// ```
    ///
    /// # Errors
    /// Gives the canvas back unchanged on a single-buffered panel.
    pub fn request_swap(self) -> Result<PendingSwap<'b, 'a, ROWS, COLS, NROWS>, Self> {
        if !self.buffers.double_buffered {
            #[cfg(feature = "defmt")]
            defmt::debug!("swap requested on a single-buffered panel");
            return Err(self);
        }
        self.buffers.swap_pending.store(true, Ordering::Release);
        Ok(PendingSwap { canvas: self })
    }

    /// Swap front and back buffers, spinning until the frame boundary.
    ///
    /// With `copy_forward` the new back buffer receives the image that was
    /// just put on screen so drawing can continue incrementally; otherwise it
    /// holds the previous front contents. Waits at most one frame.
    pub fn swap_buffers(&mut self, copy_forward: bool) -> SwapOutcome {
        self.swap_with(copy_forward, core::hint::spin_loop)
    }

    /// Like [`Canvas::swap_buffers`] but sleeps 1 ms between polls.
    pub fn swap_buffers_with_delay<DELAY: DelayNs>(
        &mut self,
        copy_forward: bool,
        delay: &mut DELAY,
    ) -> SwapOutcome {
        self.swap_with(copy_forward, || delay.delay_ms(1))
    }

    fn swap_with(&mut self, copy_forward: bool, mut idle: impl FnMut()) -> SwapOutcome {
        if !self.buffers.double_buffered {
            #[cfg(feature = "defmt")]
            defmt::debug!("swap requested on a single-buffered panel");
            return SwapOutcome::NoOp;
        }
        // `&mut self` is held until the swap landed
        self.buffers.swap_pending.store(true, Ordering::Release);
        while self.buffers.swap_pending() {
            idle();
        }
        if copy_forward {
            self.copy_front_to_back();
        }
        SwapOutcome::Swapped
    }

    fn copy_front_to_back(&mut self) {
        let front = *self.buffers.front();
        *self.back_mut() = front;
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> core::fmt::Debug
    for Canvas<'_, '_, ROWS, COLS, NROWS>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Canvas")
            .field("rotation", &self.rotation)
            .field("buffers", self.buffers)
            .finish()
    }
}

/// A swap that has been requested but not yet performed.
///
/// Owns the canvas until the scheduler switched buffers.
#[derive(Debug)]
pub struct PendingSwap<'b, 'a, const ROWS: usize, const COLS: usize, const NROWS: usize> {
    canvas: Canvas<'b, 'a, ROWS, COLS, NROWS>,
}

impl<'b, 'a, const ROWS: usize, const COLS: usize, const NROWS: usize>
    PendingSwap<'b, 'a, ROWS, COLS, NROWS>
{
    /// Whether the scheduler has performed the swap.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.canvas.buffers.swap_pending()
    }

    /// The canvas if the swap happened, otherwise the request itself.
    ///
    /// # Errors
    /// Returns `self` while the swap is still pending.
    pub fn try_complete(self) -> Result<Canvas<'b, 'a, ROWS, COLS, NROWS>, Self> {
        if self.is_complete() {
            Ok(self.canvas)
        } else {
            Err(self)
        }
    }

    /// Spin until the swap happened.
    #[must_use]
    pub fn wait(self) -> Canvas<'b, 'a, ROWS, COLS, NROWS> {
        while !self.is_complete() {
            core::hint::spin_loop();
        }
        self.canvas
    }

    /// Poll every millisecond until the swap happened.
    #[must_use]
    pub fn wait_with_delay<DELAY: DelayNs>(
        self,
        delay: &mut DELAY,
    ) -> Canvas<'b, 'a, ROWS, COLS, NROWS> {
        while !self.is_complete() {
            delay.delay_ms(1);
        }
        self.canvas
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> FrameBufferOperations
    for Canvas<'_, '_, ROWS, COLS, NROWS>
{
    fn write_pixel(&mut self, p: Point, color: Color) {
        Canvas::write_pixel(self, p.x, p.y, color);
    }

    fn fill_all(&mut self, color: Color) {
        Canvas::fill_all(self, color);
    }

    fn back_buffer(&mut self) -> &mut [u8] {
        Canvas::back_buffer(self)
    }

    fn swap_buffers(&mut self, copy_forward: bool) -> SwapOutcome {
        Canvas::swap_buffers(self, copy_forward)
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> OriginDimensions
    for Canvas<'_, '_, ROWS, COLS, NROWS>
{
    fn size(&self) -> Size {
        let (width, height) = self.dimensions();
        Size::new(width as u32, height as u32)
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> DrawTarget
    for Canvas<'_, '_, ROWS, COLS, NROWS>
{
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for pixel in pixels {
            self.write_pixel(pixel.0.x, pixel.0.y, pixel.1);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill_all(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;
    use std::string::String;

    use super::*;
    use crate::color::color444;
    use crate::packing::ColorLines;
    use embedded_graphics::pixelcolor::RgbColor;
    use embedded_graphics::prelude::*;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
    use fugit::MicrosDurationU32;

    const TEST_ROWS: usize = 16;
    const TEST_COLS: usize = 32;
    const TEST_NROWS: usize = TEST_ROWS / 2;

    type TestFrame = Frame<TEST_COLS, TEST_NROWS>;
    type TestBuffers<'a> = FrameBuffers<'a, TEST_ROWS, TEST_COLS, TEST_NROWS>;

    struct NullDriver;

    impl HubDriver for NullDriver {
        fn set_row_address(&mut self, _row: u8) {}
        fn set_color_lines(&mut self, _lines: ColorLines) {}
        fn pulse_clock(&mut self) {}
        fn set_output_enable(&mut self, _enabled: bool) {}
        fn set_latch(&mut self, _high: bool) {}
        fn schedule_next_interrupt(&mut self, _interval: MicrosDurationU32) {}
    }

    /// Split single-buffered test buffers.
    fn split_single<'b, 'a>(
        buffers: &'b mut TestBuffers<'a>,
    ) -> (
        Canvas<'b, 'a, TEST_ROWS, TEST_COLS, TEST_NROWS>,
        Scheduler<'b, 'a, NullDriver, TEST_ROWS, TEST_COLS, TEST_NROWS>,
    ) {
        // SAFETY: canvas and scheduler stay on the test thread.
        unsafe { buffers.split_shared(NullDriver, Config::default()) }
    }

    struct NoDelay {
        calls: u32,
    }

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {
            self.calls += 1;
        }
    }

    #[test]
    fn test_new_rejects_small_storage() {
        let mut storage = [TestFrame::new(); 1];
        let err = TestBuffers::new(&mut storage, true).unwrap_err();
        assert_eq!(
            err,
            Error::Allocation {
                required: 2,
                available: 1
            }
        );

        let mut empty: [TestFrame; 0] = [];
        let err = TestBuffers::new(&mut empty, false).unwrap_err();
        assert_eq!(
            err,
            Error::Allocation {
                required: 1,
                available: 0
            }
        );
    }

    #[test]
    fn test_new_clears_frames() {
        let mut storage = [TestFrame::new(); 2];
        storage[0].as_bytes_mut().fill(0x55);
        storage[1].as_bytes_mut().fill(0xAA);
        let buffers = TestBuffers::new(&mut storage, true).unwrap();
        assert!(buffers.is_double_buffered());
        assert_eq!(buffers.back_index(), 0);
        assert_eq!(buffers.front_index(), 1);
        assert!(!buffers.swap_pending());
        drop(buffers);
        assert!(storage.iter().all(|f| f.as_bytes().iter().all(|&b| b == 0)));
    }

    #[test]
    fn test_single_buffer_shares_frame() {
        let mut storage = [TestFrame::new(); 1];
        let buffers = TestBuffers::new(&mut storage, false).unwrap();
        assert_eq!(buffers.back_index(), 0);
        assert_eq!(buffers.front_index(), 0);
    }

    #[test]
    fn test_write_pixel_pure_red() {
        let mut storage = [TestFrame::new(); 2];
        let mut buffers = TestBuffers::new(&mut storage, true).unwrap();
        let (mut canvas, _scheduler) = buffers.split(NullDriver, Config::default());

        canvas.write_pixel(0, 0, Color::RED);
        assert_eq!(canvas.pixel(0, 0), Some((15, 0, 0)));
        // only the back buffer changed
        assert_eq!(canvas.buffers().front().pixel(0, 0), (0, 0, 0));
    }

    #[test]
    fn test_write_pixel_out_of_range_is_noop() {
        let mut storage = [TestFrame::new(); 1];
        let mut buffers = TestBuffers::new(&mut storage, false).unwrap();
        let (mut canvas, _scheduler) = split_single(&mut buffers);

        canvas.write_pixel(-1, 0, Color::WHITE);
        canvas.write_pixel(0, -1, Color::WHITE);
        canvas.write_pixel(TEST_COLS as i32, 0, Color::WHITE);
        canvas.write_pixel(0, TEST_ROWS as i32, Color::WHITE);
        assert!(canvas.dump().iter().all(|&b| b == 0));
        assert_eq!(canvas.pixel(TEST_COLS as i32, 0), None);
    }

    #[test]
    fn test_rotation_transforms() {
        let mut storage = [TestFrame::new(); 1];
        let mut buffers = TestBuffers::new(&mut storage, false).unwrap();
        let (mut canvas, _scheduler) = split_single(&mut buffers);

        let cases = [
            (Rotation::Deg0, (2, 3), (2, 3)),
            (Rotation::Deg90, (2, 3), (TEST_COLS - 1 - 3, 2)),
            (Rotation::Deg180, (2, 3), (TEST_COLS - 1 - 2, TEST_ROWS - 1 - 3)),
            (Rotation::Deg270, (2, 3), (3, TEST_ROWS - 1 - 2)),
        ];
        for (rotation, (x, y), (px, py)) in cases {
            canvas.fill_all(Color::BLACK);
            canvas.set_rotation(rotation);
            canvas.write_pixel(x, y, Color::BLUE);
            assert_eq!(
                canvas.buffers().front().pixel(px, py),
                (0, 0, 15),
                "{rotation:?}"
            );
        }
    }

    #[test]
    fn test_rotation_bounds() {
        let mut storage = [TestFrame::new(); 1];
        let mut buffers = TestBuffers::new(&mut storage, false).unwrap();
        let (mut canvas, _scheduler) = split_single(&mut buffers);

        assert_eq!(canvas.size(), Size::new(TEST_COLS as u32, TEST_ROWS as u32));
        canvas.set_rotation(Rotation::Deg90);
        assert_eq!(canvas.size(), Size::new(TEST_ROWS as u32, TEST_COLS as u32));

        // x beyond the rotated width is off screen even though it is a
        // valid physical column
        canvas.write_pixel(TEST_ROWS as i32, 0, Color::WHITE);
        assert!(canvas.dump().iter().all(|&b| b == 0));
        canvas.write_pixel(TEST_ROWS as i32 - 1, TEST_COLS as i32 - 1, Color::WHITE);
        assert_eq!(canvas.buffers().front().pixel(0, TEST_ROWS - 1), (15, 15, 15));
    }

    #[test]
    fn test_fast_fill_matches_pixel_fill() {
        for color in [Color::BLACK, Color::WHITE] {
            let mut fast = [TestFrame::new(); 1];
            let mut slow = [TestFrame::new(); 1];
            {
                let mut buffers = TestBuffers::new(&mut fast, false).unwrap();
                let (mut canvas, _s) = split_single(&mut buffers);
                canvas.fill_all(color);
            }
            {
                let mut buffers = TestBuffers::new(&mut slow, false).unwrap();
                let (mut canvas, _s) = split_single(&mut buffers);
                for y in 0..TEST_ROWS as i32 {
                    for x in 0..TEST_COLS as i32 {
                        canvas.write_pixel(x, y, color);
                    }
                }
            }
            assert_eq!(fast[0].as_bytes(), slow[0].as_bytes());
        }
    }

    #[test]
    fn test_fill_all_other_color() {
        let mut storage = [TestFrame::new(); 1];
        let mut buffers = TestBuffers::new(&mut storage, false).unwrap();
        let (mut canvas, _scheduler) = split_single(&mut buffers);

        let color = color444(3, 9, 12);
        canvas.fill_all(color);
        for y in 0..TEST_ROWS as i32 {
            for x in 0..TEST_COLS as i32 {
                assert_eq!(canvas.pixel(x, y), Some((3, 9, 12)));
            }
        }
    }

    #[test]
    fn test_swap_on_single_buffer_is_noop() {
        let mut storage = [TestFrame::new(); 1];
        let mut buffers = TestBuffers::new(&mut storage, false).unwrap();
        let (canvas, _scheduler) = split_single(&mut buffers);

        let mut canvas = canvas.request_swap().unwrap_err();
        assert_eq!(canvas.swap_buffers(true), SwapOutcome::NoOp);
        let mut delay = NoDelay { calls: 0 };
        assert_eq!(
            canvas.swap_buffers_with_delay(false, &mut delay),
            SwapOutcome::NoOp
        );
        assert_eq!(delay.calls, 0);
        assert!(!canvas.buffers().swap_pending());
    }

    #[test]
    fn test_request_swap_lands_at_frame_start() {
        let mut storage = [TestFrame::new(); 2];
        let mut buffers = TestBuffers::new(&mut storage, true).unwrap();
        let (mut canvas, mut scheduler) = buffers.split(NullDriver, Config::default());
        scheduler.start();

        // first tick starts frame 0, swap requested afterwards must wait
        // for the next frame
        scheduler.tick();
        canvas.write_pixel(1, 1, Color::GREEN);
        let pending = canvas.request_swap().unwrap();
        assert!(!pending.is_complete());

        let ticks_per_frame = TEST_NROWS * crate::PLANES;
        let mut pending = pending;
        for _ in 0..ticks_per_frame - 1 {
            scheduler.tick();
            pending = pending.try_complete().unwrap_err();
        }
        scheduler.tick();
        let mut canvas = pending.try_complete().unwrap();
        assert_eq!(scheduler.row(), 0);

        assert_eq!(canvas.buffers().back_index(), 1);
        assert_eq!(canvas.buffers().front().pixel(1, 1), (0, 15, 0));
        // the canvas now draws into the frame shown before the swap
        canvas.write_pixel(2, 2, Color::RED);
        assert_eq!(canvas.buffers().front().pixel(2, 2), (0, 0, 0));
        assert_eq!(canvas.pixel(1, 1), Some((0, 0, 0)));
    }

    #[test]
    fn test_pending_swap_waits_with_delay() {
        let mut storage = [TestFrame::new(); 2];
        let mut buffers = TestBuffers::new(&mut storage, true).unwrap();
        let (canvas, mut scheduler) = buffers.split(NullDriver, Config::default());
        scheduler.start();

        let pending = canvas.request_swap().unwrap();
        assert!(!pending.is_complete());
        // the frame start arrives with the first tick
        scheduler.tick();
        let mut delay = NoDelay { calls: 0 };
        let canvas = pending.wait_with_delay(&mut delay);
        assert_eq!(delay.calls, 0);
        assert_eq!(canvas.buffers().back_index(), 1);

        let pending = canvas.request_swap().unwrap();
        for _ in 0..TEST_NROWS * crate::PLANES {
            scheduler.tick();
        }
        let canvas = pending.wait();
        assert_eq!(canvas.buffers().back_index(), 0);
        assert!(!canvas.buffers().swap_pending());
    }

    #[test]
    #[should_panic(expected = "double buffering")]
    fn test_split_single_buffer_panics() {
        let mut storage = [TestFrame::new(); 1];
        let mut buffers = TestBuffers::new(&mut storage, false).unwrap();
        let _halves = buffers.split(NullDriver, Config::default());
    }

    #[test]
    fn test_swap_buffers_threaded_copy_forward() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let mut storage = [TestFrame::new(); 2];
        let mut buffers = TestBuffers::new(&mut storage, true).unwrap();
        let (mut canvas, mut scheduler) = buffers.split(NullDriver, Config::default());
        scheduler.start();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    scheduler.tick();
                    std::thread::yield_now();
                }
            });

            canvas.write_pixel(5, 5, Color::RED);
            assert_eq!(canvas.swap_buffers(true), SwapOutcome::Swapped);
            // copied forward: the new back buffer already holds the red pixel
            assert_eq!(canvas.pixel(5, 5), Some((15, 0, 0)));

            canvas.write_pixel(6, 6, Color::BLUE);
            let mut delay = NoDelay { calls: 0 };
            assert_eq!(
                canvas.swap_buffers_with_delay(false, &mut delay),
                SwapOutcome::Swapped
            );
            // not copied: the back buffer is the frame shown before, which
            // only has the red pixel
            assert_eq!(canvas.pixel(5, 5), Some((15, 0, 0)));
            assert_eq!(canvas.pixel(6, 6), Some((0, 0, 0)));
            assert_eq!(canvas.buffers().front().pixel(6, 6), (0, 0, 15));

            done.store(true, Ordering::Release);
        });
    }

    #[test]
    fn test_back_buffer_and_dump() {
        let mut storage = [TestFrame::new(); 2];
        let mut buffers = TestBuffers::new(&mut storage, true).unwrap();
        let (mut canvas, _scheduler) = buffers.split(NullDriver, Config::default());

        assert_eq!(canvas.back_buffer().len(), TEST_COLS * TEST_NROWS * 3);
        canvas.back_buffer()[0] = 0b0001_1100; // weight 2 of R1, G1, B1 at (0, 0)
        assert_eq!(canvas.pixel(0, 0), Some((2, 2, 2)));
        assert_eq!(canvas.dump()[0], 0b0001_1100);
    }

    #[test]
    fn test_write_image_source() {
        let mut storage = [Frame::<2, 1>::new(); 2];
        let mut buffers = FrameBuffers::<2, 2, 1>::new(&mut storage, true).unwrap();
        let (mut canvas, _scheduler) = buffers.split(NullDriver, Config::default());
        canvas.fill_all(Color::WHITE);

        let mut out = String::new();
        canvas.write_image_source("IMG", &mut out).unwrap();
        assert_eq!(
            out,
            "static IMG: [u8; 6] = [\n    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,\n];\n"
        );
    }

    #[test]
    fn test_embedded_graphics_integration() {
        let mut storage = [TestFrame::new(); 2];
        let mut buffers = TestBuffers::new(&mut storage, true).unwrap();
        let (mut canvas, _scheduler) = buffers.split(NullDriver, Config::default());

        Rectangle::new(Point::new(2, 2), Size::new(4, 3))
            .into_styled(PrimitiveStyle::with_fill(Color::MAGENTA))
            .draw(&mut canvas)
            .unwrap();
        assert_eq!(canvas.pixel(2, 2), Some((15, 0, 15)));
        assert_eq!(canvas.pixel(5, 4), Some((15, 0, 15)));
        assert_eq!(canvas.pixel(6, 4), Some((0, 0, 0)));

        canvas.clear(Color::WHITE).unwrap();
        assert!(canvas.dump().iter().all(|&b| b == 0xFF));
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_allocate_double_buffered() {
        let mut buffers = TestBuffers::allocate(true).unwrap();
        assert!(buffers.is_double_buffered());
        assert_eq!(buffers.back_index(), 0);
        assert_eq!(buffers.front_index(), 1);

        let (mut canvas, _scheduler) = buffers.split(NullDriver, Config::default());
        assert_eq!(canvas.back_buffer().len(), TestFrame::SIZE);
        assert!(canvas.dump().iter().all(|&b| b == 0));
        assert!(canvas.buffers().front().as_bytes().iter().all(|&b| b == 0));

        canvas.write_pixel(3, 4, Color::CYAN);
        assert_eq!(canvas.pixel(3, 4), Some((0, 15, 15)));
        assert_eq!(canvas.buffers().front().pixel(3, 4), (0, 0, 0));
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_allocate_single_buffered() {
        let mut buffers = TestBuffers::allocate(false).unwrap();
        assert!(!buffers.is_double_buffered());
        assert_eq!(buffers.back_index(), buffers.front_index());

        let (mut canvas, _scheduler) = split_single(&mut buffers);
        assert_eq!(canvas.back_buffer().len(), TestFrame::SIZE);
        assert!(canvas.dump().iter().all(|&b| b == 0));
        canvas.write_pixel(0, TEST_ROWS as i32 - 1, Color::WHITE);
        assert_eq!(canvas.buffers().front().pixel(0, TEST_ROWS - 1), (15, 15, 15));
    }

    #[test]
    fn test_debug_formatting() {
        let mut storage = [TestFrame::new(); 2];
        let buffers = TestBuffers::new(&mut storage, true).unwrap();
        let debug_string = format!("{:?}", buffers);
        assert!(debug_string.contains("FrameBuffers"));
        assert!(debug_string.contains("double_buffered: true"));
        assert!(debug_string.contains("frame_size: 768"));

        let mut buffers = buffers;
        let (canvas, _scheduler) = buffers.split(NullDriver, Config::default());
        let pending = canvas.request_swap().unwrap();
        let debug_string = format!("{:?}", pending);
        assert!(debug_string.contains("PendingSwap"));
        assert!(debug_string.contains("Canvas"));
        assert!(debug_string.contains("swap_pending: true"));
    }
}
