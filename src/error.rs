//! Errors surfaced while setting up a panel.
//!
//! Only setup can fail. Everything that runs once the refresh interrupt is
//! armed (pixel writes, fills, swaps, the scheduler tick) degrades to a no-op
//! instead of returning an error.

/// Setup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The frame storage could not be reserved, or the storage handed in is
    /// too small for the requested buffering mode.
    Allocation {
        /// Number of frames the buffering mode needs
        required: usize,
        /// Number of frames that were available
        available: usize,
    },
    /// Another panel already owns the refresh interrupt.
    AlreadyActive,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Allocation {
                required,
                available,
            } => write!(
                f,
                "frame storage too small: {required} frame(s) required, {available} available"
            ),
            Self::AlreadyActive => write!(f, "a panel is already driving the refresh interrupt"),
        }
    }
}

impl core::error::Error for Error {}
