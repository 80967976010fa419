//! Peripheral capabilities consumed by the acquisition driver.
//!
//! The driver never touches registers. A board crate implements these three
//! traits on top of its HAL (timer, DMA channel, ADC status register) and
//! hands them to [`AcquisitionStream::new()`](super::AcquisitionStream::new).

use crate::error::StreamError;

/// Sample word written by the transfer engine.
///
/// Implemented for `u8`, `u16` and `u32`: plain integers with no invalid bit
/// patterns, so a slot can always be viewed as raw bytes.
pub trait Word: Copy + Send + Sync + 'static + sealed::Sealed {
    /// Initial value of fresh slot storage.
    const ZERO: Self;
}

impl Word for u8 {
    const ZERO: Self = 0;
}

impl Word for u16 {
    const ZERO: Self = 0;
}

impl Word for u32 {
    const ZERO: Self = 0;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
}

/// Periodic or event-driven conversion trigger (typically a timer's TRGO).
pub trait TriggerSource {
    /// Hardware trigger selection, e.g. which timer event starts a conversion.
    type Source: Copy;

    /// Highest trigger rate the peripheral can sustain, in hertz.
    fn max_rate(&self) -> f32;

    /// Program the trigger for `rate` hertz from `source`.
    ///
    /// Returns the rate actually achieved, which may differ from `rate`
    /// by the timer's divider granularity.
    fn configure(&mut self, rate: f32, source: Self::Source) -> Result<f32, StreamError>;

    /// Start generating triggers.
    fn enable(&mut self);

    /// Stop generating triggers. No conversion starts after this returns.
    fn disable(&mut self);
}

/// Interrupt sources of a [`TransferEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferEvent {
    /// The programmed transfer length has been written.
    Complete,
    /// The engine hit a bus or FIFO error.
    Error,
}

/// DMA-like engine moving conversion results into slot memory.
pub trait TransferEngine<W> {
    /// Point the engine at `len` words starting at `buffer`.
    ///
    /// # Safety
    ///
    /// `buffer` must stay valid for writes of `len` words until the engine is
    /// stopped or re-pointed, and nothing else may write that memory meanwhile.
    unsafe fn set_destination(&mut self, buffer: *mut W, len: usize);

    /// Begin (or resume) transferring into the current destination.
    fn start(&mut self);

    /// Halt the engine. No write lands in memory after this returns.
    fn stop(&mut self);

    /// Enable the interrupt for `event`.
    fn listen(&mut self, event: TransferEvent);

    /// Disable the interrupt for `event`.
    fn unlisten(&mut self, event: TransferEvent);

    /// Acknowledge a pending `event`.
    fn clear(&mut self, event: TransferEvent);
}

/// Status flags of the sampling peripheral.
pub trait RegisterStatus {
    /// Whether the peripheral lost a conversion since the flag was last cleared.
    fn overrun(&self) -> bool;

    /// Clear the overrun flag.
    fn clear_overrun(&mut self);
}

/// The three capabilities a stream drives, owned together.
pub struct Hardware<T, D, R> {
    /// Conversion trigger.
    pub trigger: T,
    /// Transfer engine filling the slots.
    pub transfer: D,
    /// Sampling peripheral status.
    pub status: R,
}

impl<T, D, R> Hardware<T, D, R> {
    /// Bundle the capabilities.
    pub fn new(trigger: T, transfer: D, status: R) -> Self {
        Hardware {
            trigger,
            transfer,
            status,
        }
    }
}
