//! The panel that owns the refresh interrupt.
//!
//! A timer interrupt handler has no arguments, so the scheduler it drives is
//! registered once in a global slot by [`begin`] and looked up by
//! [`on_timer_interrupt`]. Only one panel can be active, and once started it
//! keeps running until reset.
//!
//! ```rust,ignore
//! static BUFFERS: StaticCell<FrameBuffers<'static, 32, 64, 16>> = StaticCell::new();
//! static SCHEDULER: StaticCell<Scheduler<'static, 'static, Driver, 32, 64, 16>> = StaticCell::new();
//!
//! let (canvas, scheduler) = BUFFERS.init(buffers).split(driver, Config::default());
//! hub75_bcm::begin(SCHEDULER.init(scheduler))?;
//!
//! #[handler]
//! fn timer0() {
//!     clear_timer_interrupt();
//!     hub75_bcm::on_timer_interrupt();
//! }
//! ```

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;

use crate::Error;

/// Something the refresh interrupt can drive.
///
/// Implemented by [`Scheduler`](crate::Scheduler); the trait object keeps the
/// global slot free of the panel geometry and driver type.
pub trait Refresh {
    /// Idle the hardware and arm the first interrupt.
    fn start(&mut self);

    /// Run one refresh step.
    fn refresh(&mut self);
}

type Panel = &'static mut (dyn Refresh + Send);

static ACTIVE: Mutex<Cell<Option<Panel>>> = Mutex::new(Cell::new(None));
// set once by `begin`, stays set while the panel is taken out for a tick
static CLAIMED: AtomicBool = AtomicBool::new(false);

/// Start refreshing `panel` and route [`on_timer_interrupt`] to it.
///
/// # Errors
/// [`Error::AlreadyActive`] if a panel was started before. The running panel
/// is left alone and `panel` is not started.
pub fn begin(panel: &'static mut (dyn Refresh + Send)) -> Result<(), Error> {
    let claimed = critical_section::with(|_| {
        if CLAIMED.load(Ordering::Acquire) {
            return false;
        }
        CLAIMED.store(true, Ordering::Release);
        true
    });
    if !claimed {
        #[cfg(feature = "defmt")]
        defmt::warn!("begin rejected: a panel is already active");
        return Err(Error::AlreadyActive);
    }

    // no interrupt reaches the panel before it is stored
    panel.start();
    critical_section::with(|cs| ACTIVE.borrow(cs).set(Some(panel)));
    #[cfg(feature = "defmt")]
    defmt::info!("panel refresh started");
    Ok(())
}

/// Refresh entry point, call from the timer interrupt handler.
///
/// Does nothing until [`begin`] succeeded. The critical section only covers
/// taking the panel out of the slot and putting it back; the tick itself runs
/// with interrupts enabled, so higher priority handlers are not delayed by
/// the shift-out. A nested call while a tick runs finds the slot empty and
/// returns.
pub fn on_timer_interrupt() {
    let Some(panel) = critical_section::with(|cs| ACTIVE.borrow(cs).take()) else {
        return;
    };
    panel.refresh();
    critical_section::with(|cs| ACTIVE.borrow(cs).set(Some(panel)));
}

/// Whether a panel has been started.
#[must_use]
pub fn is_active() -> bool {
    CLAIMED.load(Ordering::Acquire)
}
