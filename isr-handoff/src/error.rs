//! Error types shared by the queue and acquisition modules.
//!
//! Synchronous failures (bad configuration, wrong state, bad slot access) are
//! returned as values at the call site. Overruns happen in interrupt context,
//! so they are latched and handed out later by
//! [`AcquisitionStream::err()`](crate::acquisition::AcquisitionStream::err).

use crate::acquisition::StreamState;

/// Configuration and state errors reported by
/// [`AcquisitionStream`](crate::acquisition::AcquisitionStream).
///
/// All of these are recoverable: the stream keeps its previous state and the
/// caller may correct the parameters and try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError {
    /// Sample rate was zero, negative or not a number.
    #[error("sample rate must be a positive number of hertz")]
    ZeroRate,
    /// Requested sample rate exceeds what the trigger peripheral can produce.
    #[error("requested rate {requested} Hz exceeds the trigger maximum of {max} Hz")]
    RateTooHigh {
        /// Requested rate, in whole hertz.
        requested: u32,
        /// Highest rate the trigger source supports, in whole hertz.
        max: u32,
    },
    /// Slot length of zero samples.
    #[error("slot length must be at least one sample")]
    ZeroSlotLength,
    /// Slot length larger than the ring's per-slot storage.
    #[error("slot length {requested} exceeds slot capacity {capacity}")]
    SlotTooLong {
        /// Requested samples per slot.
        requested: usize,
        /// Samples each slot can hold.
        capacity: usize,
    },
    /// No prescaler/reload pair reaches the requested rate.
    #[error("timer divisor out of range for the requested rate")]
    DivisorOutOfRange,
    /// Operation is not valid in the stream's current state.
    #[error("operation not permitted while the stream is {state:?}")]
    InvalidState {
        /// State the stream was in when the call was rejected.
        state: StreamState,
    },
}

/// Sticky overrun report.
///
/// Latched by the interrupt entry points whenever the peripheral signals that
/// it failed to keep up, and cleared by the query that returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("acquisition overrun ({occurrences} since last check)")]
pub struct OverrunError {
    /// Number of overruns latched since the previous query.
    pub occurrences: u32,
}

/// Consumer-side slot access errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotError {
    /// Index is not a slot of this ring.
    #[error("slot {index} out of range for a ring of {slots} slots")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of slots in the ring.
        slots: usize,
    },
    /// The slot has not been completed since the stream last started.
    #[error("slot {index} holds no completed data")]
    NotReady {
        /// Requested index.
        index: usize,
    },
    /// The DMA engine is writing into this slot right now.
    #[error("slot {index} is being filled by the transfer engine")]
    Filling {
        /// Requested index.
        index: usize,
    },
}
