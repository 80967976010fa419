//! Circular multi-slot acquisition driver.
//!
//! [`AcquisitionStream`] keeps a trigger source, a transfer engine and the
//! sampling peripheral's status flags running continuously: each trigger
//! starts a conversion, the engine writes the result into the current slot,
//! and when a slot is full the transfer-complete interrupt re-targets the
//! engine at the next slot and tells the task which slot just finished.
//!
//! ## Architecture
//!
//! ```text
//! Trigger ──► ADC ──DMA──► SlotRing[filling]
//!                              │ transfer complete ISR
//!                              ▼
//!                  re-point DMA at filling + 1
//!                  HandoffQueue<Event>::try_push(Ready { slot, sequence })
//!                              │
//!                              ▼
//!                  task: handle_chan().pop() → bytes(slot)
//! ```
//!
//! ## States
//!
//! `Idle → Armed → Streaming ⇄ ErrorLatched → Stopped`. An overrun moves the
//! stream to `ErrorLatched` without stopping it; [`err()`](AcquisitionStream::err)
//! reports the overrun and moves it back to `Streaming`.
//!
//! ## Usage with RTIC
//!
//! ```ignore
//! static RING: StaticCell<SlotRing<u8, 640, 2>> = StaticCell::new();
//! static EVENTS: HandoffQueue<Event, 4> = HandoffQueue::new();
//!
//! // init
//! let stream = AcquisitionStream::new(
//!     RING.init(SlotRing::new()),
//!     &EVENTS,
//!     Hardware::new(tim3, dma1_ch1, adc1),
//! );
//! stream.configure(StreamConfig::new(750_000.0, Trgo::Tim3, 640))?;
//! stream.start()?;
//!
//! // DMA1_CHANNEL1 ISR
//! stream.on_transfer_complete();
//!
//! // idle task
//! let events = stream.handle_chan();
//! loop {
//!     let event = events.pop_with(cortex_m::asm::wfi);
//!     if let Err(overrun) = stream.err() { /* log it */ }
//!     if let Event::Ready { slot, sequence } = event {
//!         let samples = stream.bytes(slot)?;
//!         if stream.holds(slot, sequence) {
//!             draw(samples);
//!         }
//!     }
//! }
//! ```

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use critical_section::{CriticalSection, Mutex};

use super::capability::{Hardware, RegisterStatus, TransferEngine, TransferEvent, TriggerSource, Word};
use super::ring::{SlotIndex, SlotInfo, SlotRing, SlotState};
use crate::error::{OverrunError, SlotError, StreamError};
use crate::queue::{Consumer, HandoffQueue, Producer};
use crate::vector::{Entry, InterruptHandler};

/// Notification delivered to the task through [`AcquisitionStream::handle_chan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// A slot has just been filled.
    Ready {
        /// The completed slot.
        slot: SlotIndex,
        /// Completion number that filled it, as later reported by
        /// [`SlotInfo::sequence`] while the slot still holds this data.
        sequence: u32,
    },
    /// The transfer engine signaled an error; check [`AcquisitionStream::err`].
    Error,
}

impl Event {
    /// The completed slot, if this is a `Ready` event.
    pub fn slot(self) -> Option<SlotIndex> {
        match self {
            Event::Ready { slot, .. } => Some(slot),
            Event::Error => None,
        }
    }

    /// The completion number, if this is a `Ready` event.
    pub fn sequence(self) -> Option<u32> {
        match self {
            Event::Ready { sequence, .. } => Some(sequence),
            Event::Error => None,
        }
    }
}

/// Driver lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StreamState {
    /// Constructed, nothing configured.
    Idle = 0,
    /// Trigger configured, transfer engine not running.
    Armed = 1,
    /// Continuously capturing.
    Streaming = 2,
    /// Capturing, with an unreported overrun latched.
    ErrorLatched = 3,
    /// Hardware disabled; no slot is written any more.
    Stopped = 4,
}

impl StreamState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => StreamState::Armed,
            2 => StreamState::Streaming,
            3 => StreamState::ErrorLatched,
            4 => StreamState::Stopped,
            _ => StreamState::Idle,
        }
    }

    /// Whether the hardware is running in this state.
    pub fn is_running(self) -> bool {
        matches!(self, StreamState::Streaming | StreamState::ErrorLatched)
    }
}

/// Parameters for [`AcquisitionStream::configure`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamConfig<S> {
    /// Conversion rate in hertz.
    pub sample_rate: f32,
    /// Trigger selection passed to the [`TriggerSource`].
    pub source: S,
    /// Words per slot, at most the ring's slot capacity.
    pub slot_len: usize,
}

impl<S> StreamConfig<S> {
    /// Bundle the parameters.
    pub fn new(sample_rate: f32, source: S, slot_len: usize) -> Self {
        StreamConfig {
            sample_rate,
            source,
            slot_len,
        }
    }
}

/// Continuous acquisition into a ring of `SLOTS` slots, with completion
/// notifications queued `Q` deep.
///
/// The interrupt entry points ([`on_transfer_complete`](Self::on_transfer_complete),
/// [`on_transfer_error`](Self::on_transfer_error)) are the producer side;
/// everything else is called from task context. Hardware capabilities are
/// only touched inside a critical section, so `stop()` cannot interleave with
/// an in-flight completion interrupt.
///
/// # Panics
///
/// Dropping a stream that is still running disables the hardware and then
/// panics: slot memory may have been written after the caller gave it up.
pub struct AcquisitionStream<'a, T, D, R, W, const LEN: usize, const SLOTS: usize, const Q: usize>
where
    T: TriggerSource,
    D: TransferEngine<W>,
    R: RegisterStatus,
    W: Word,
{
    ring: &'a SlotRing<W, LEN, SLOTS>,
    events: Producer<'a, Event, Q>,
    handle: Mutex<Cell<Option<Consumer<'a, Event, Q>>>>,
    hw: Mutex<RefCell<Hardware<T, D, R>>>,
    state: AtomicU8,
    filling: AtomicUsize,
    slot_len: AtomicUsize,
    rate_bits: AtomicU32,
    overruns: AtomicU32,
    completions: AtomicU32,
    sequence: AtomicU32,
    dropped: AtomicU32,
}

// SAFETY: The producer handle is used only by the interrupt entry points, and
// those run entirely inside a critical section, so it is never used from two
// contexts at once. The consumer handle is taken once, inside a critical
// section. Hardware sits behind a critical-section mutex. Everything else is
// atomic.
unsafe impl<'a, T, D, R, W, const LEN: usize, const SLOTS: usize, const Q: usize> Sync
    for AcquisitionStream<'a, T, D, R, W, LEN, SLOTS, Q>
where
    T: TriggerSource + Send,
    D: TransferEngine<W> + Send,
    R: RegisterStatus + Send,
    W: Word,
{
}

impl<'a, T, D, R, W, const LEN: usize, const SLOTS: usize, const Q: usize>
    AcquisitionStream<'a, T, D, R, W, LEN, SLOTS, Q>
where
    T: TriggerSource,
    D: TransferEngine<W>,
    R: RegisterStatus,
    W: Word,
{
    /// Create an `Idle` stream over `ring`, notifying through `events`.
    ///
    /// The ring is borrowed exclusively for the stream's lifetime.
    ///
    /// # Panics
    ///
    /// If `events` has already been split.
    pub fn new(
        ring: &'a mut SlotRing<W, LEN, SLOTS>,
        events: &'a HandoffQueue<Event, Q>,
        hw: Hardware<T, D, R>,
    ) -> Self {
        let (producer, consumer) = events.split();
        AcquisitionStream {
            ring,
            events: producer,
            handle: Mutex::new(Cell::new(Some(consumer))),
            hw: Mutex::new(RefCell::new(hw)),
            state: AtomicU8::new(StreamState::Idle as u8),
            filling: AtomicUsize::new(0),
            slot_len: AtomicUsize::new(LEN),
            rate_bits: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            completions: AtomicU32::new(0),
            sequence: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Validate `config`, program the trigger and move to `Armed`.
    ///
    /// Returns the achieved sample rate. Allowed from `Idle`, `Armed` and
    /// `Stopped`; on error the stream keeps its previous state.
    pub fn configure(&self, config: StreamConfig<T::Source>) -> Result<f32, StreamError> {
        critical_section::with(|cs| {
            let state = self.state();
            if !matches!(
                state,
                StreamState::Idle | StreamState::Armed | StreamState::Stopped
            ) {
                return Err(StreamError::InvalidState { state });
            }

            if config.slot_len == 0 {
                return Err(StreamError::ZeroSlotLength);
            }
            if config.slot_len > LEN {
                return Err(StreamError::SlotTooLong {
                    requested: config.slot_len,
                    capacity: LEN,
                });
            }
            if !config.sample_rate.is_finite() || config.sample_rate <= 0.0 {
                return Err(StreamError::ZeroRate);
            }

            let mut hw = self.hw.borrow_ref_mut(cs);
            let max = hw.trigger.max_rate();
            if config.sample_rate > max {
                return Err(StreamError::RateTooHigh {
                    requested: config.sample_rate as u32,
                    max: max as u32,
                });
            }
            let actual = hw.trigger.configure(config.sample_rate, config.source)?;

            self.slot_len.store(config.slot_len, Ordering::Relaxed);
            self.rate_bits.store(actual.to_bits(), Ordering::Relaxed);
            self.set_state(StreamState::Armed);

            #[cfg(feature = "defmt")]
            defmt::info!(
                "stream armed: {=f32} Hz, {=usize} words x {=usize} slots",
                actual,
                config.slot_len,
                SLOTS
            );
            Ok(actual)
        })
    }

    /// Arm the transfer engine at slot 0 and start the trigger.
    ///
    /// `Armed → Streaming`. Clears slot metadata, counters and any stale
    /// overrun from a previous run. Sequence numbers keep counting, so a
    /// notification left over from a previous run never matches a slot of
    /// this one.
    pub fn start(&self) -> Result<(), StreamError> {
        critical_section::with(|cs| {
            let state = self.state();
            if state != StreamState::Armed {
                return Err(StreamError::InvalidState { state });
            }

            self.ring.reset();
            self.filling.store(0, Ordering::Relaxed);
            self.overruns.store(0, Ordering::Relaxed);
            self.completions.store(0, Ordering::Relaxed);
            self.dropped.store(0, Ordering::Relaxed);

            let first = SlotIndex::new(0);
            let len = self.slot_len.load(Ordering::Relaxed);
            self.ring.begin_fill(first);

            let mut hw = self.hw.borrow_ref_mut(cs);
            let hw = &mut *hw;
            hw.status.clear_overrun();
            // SAFETY: the ring is borrowed for 'a and the engine is stopped
            // before the stream goes away (see Drop).
            unsafe { hw.transfer.set_destination(self.ring.buffer_ptr(first), len) };
            hw.transfer.clear(TransferEvent::Complete);
            hw.transfer.clear(TransferEvent::Error);
            hw.transfer.listen(TransferEvent::Complete);
            hw.transfer.listen(TransferEvent::Error);
            hw.transfer.start();
            // Engine before trigger: the first conversion must land in slot 0.
            hw.trigger.enable();

            self.set_state(StreamState::Streaming);

            #[cfg(feature = "defmt")]
            defmt::info!("stream started");
            Ok(())
        })
    }

    /// Disable the trigger and the transfer engine and move to `Stopped`.
    ///
    /// Once this returns no slot is written and no notification is queued,
    /// so the ring may be reused or the stream dropped. Stopping an already
    /// stopped stream is a no-op; stopping an `Idle` one is an error.
    pub fn stop(&self) -> Result<(), StreamError> {
        critical_section::with(|cs| match self.state() {
            StreamState::Idle => Err(StreamError::InvalidState {
                state: StreamState::Idle,
            }),
            StreamState::Stopped => Ok(()),
            _ => {
                self.halt(cs);

                #[cfg(feature = "defmt")]
                defmt::info!(
                    "stream stopped after {=u32} completions",
                    self.completions()
                );
                Ok(())
            }
        })
    }

    /// Transfer-complete interrupt entry point.
    ///
    /// Re-targets the engine at the next slot, marks the finished slot
    /// `Ready` and queues [`Event::Ready`] with the slot's new sequence
    /// number. A full queue drops the
    /// notification (counted in [`dropped()`](Self::dropped)); the slot data
    /// is kept. Does nothing unless the stream is running.
    pub fn on_transfer_complete(&self) {
        critical_section::with(|cs| {
            if !self.state().is_running() {
                return;
            }

            let done = SlotIndex::new(self.filling.load(Ordering::Relaxed));
            let next = SlotIndex::new(if done.get() + 1 == SLOTS {
                0
            } else {
                done.get() + 1
            });
            let len = self.slot_len.load(Ordering::Relaxed);

            let overrun = {
                let mut hw = self.hw.borrow_ref_mut(cs);
                let hw = &mut *hw;
                hw.transfer.clear(TransferEvent::Complete);
                self.ring.begin_fill(next);
                // SAFETY: as in `start`; `next` is now `Filling`, so readers
                // are refused it.
                unsafe { hw.transfer.set_destination(self.ring.buffer_ptr(next), len) };
                hw.transfer.start();

                let overrun = hw.status.overrun();
                if overrun {
                    hw.status.clear_overrun();
                }
                overrun
            };

            let completions = self.completions.load(Ordering::Relaxed).wrapping_add(1);
            self.completions.store(completions, Ordering::Relaxed);
            let sequence = self.sequence.load(Ordering::Relaxed).wrapping_add(1);
            self.sequence.store(sequence, Ordering::Relaxed);
            self.ring.complete(done, sequence, overrun);
            self.filling.store(next.get(), Ordering::Release);

            #[cfg(feature = "defmt")]
            defmt::trace!("slot {=usize} ready (#{=u32})", done.get(), sequence);

            if overrun {
                self.latch_overrun();
            }
            self.notify(Event::Ready {
                slot: done,
                sequence,
            });
        })
    }

    /// Transfer-error interrupt entry point.
    ///
    /// Latches the sticky error, restarts the engine on the current slot so
    /// acquisition continues, and queues [`Event::Error`] so a waiting task
    /// wakes up to check [`err()`](Self::err). Does nothing unless the stream
    /// is running.
    pub fn on_transfer_error(&self) {
        critical_section::with(|cs| {
            if !self.state().is_running() {
                return;
            }

            let current = SlotIndex::new(self.filling.load(Ordering::Relaxed));
            let len = self.slot_len.load(Ordering::Relaxed);
            {
                let mut hw = self.hw.borrow_ref_mut(cs);
                let hw = &mut *hw;
                hw.transfer.clear(TransferEvent::Error);
                // SAFETY: as in `start`; `current` is still `Filling`.
                unsafe { hw.transfer.set_destination(self.ring.buffer_ptr(current), len) };
                hw.transfer.start();
                if hw.status.overrun() {
                    hw.status.clear_overrun();
                }
            }

            #[cfg(feature = "defmt")]
            defmt::debug!("transfer error while filling slot {=usize}", current.get());

            self.ring.mark_overrun(current);
            self.latch_overrun();
            self.notify(Event::Error);
        })
    }

    /// Take the task-side notification handle.
    ///
    /// # Panics
    ///
    /// On the second call: the queue has exactly one consumer.
    pub fn handle_chan(&self) -> Consumer<'a, Event, Q> {
        critical_section::with(|cs| self.handle.borrow(cs).take())
            .expect("acquisition event handle already taken")
    }

    /// Report and clear the sticky overrun error.
    ///
    /// Returns `Err` once per batch of overruns; later calls return `Ok(())`
    /// until the next overrun is latched.
    pub fn err(&self) -> Result<(), OverrunError> {
        critical_section::with(|_| {
            let occurrences = self.overruns.load(Ordering::Relaxed);
            if occurrences == 0 {
                return Ok(());
            }
            self.overruns.store(0, Ordering::Relaxed);
            if self.state() == StreamState::ErrorLatched {
                self.set_state(StreamState::Streaming);
            }
            Err(OverrunError { occurrences })
        })
    }

    /// Read-only view of a completed slot, as configured `slot_len` words.
    ///
    /// Refuses the slot the engine is filling and slots not completed since
    /// `start`. The view stays valid until `SLOTS - 1` further completions
    /// have happened; after that the engine writes the slot again, which
    /// [`holds()`](Self::holds) detects.
    pub fn samples(&self, index: SlotIndex) -> Result<&[W], SlotError> {
        self.ring.read(index, self.slot_len.load(Ordering::Relaxed))
    }

    /// Read-only byte view of a completed slot.
    pub fn bytes(&self, index: SlotIndex) -> Result<&[u8], SlotError> {
        let words = self.samples(index)?;
        // SAFETY: `Word` is only implemented for plain integers, which have
        // no padding and no invalid bit patterns.
        Ok(unsafe {
            core::slice::from_raw_parts(words.as_ptr() as *const u8, core::mem::size_of_val(words))
        })
    }

    /// Hand slot `index` back to the ring (`Ready → Consumed`).
    ///
    /// Returns `false` if the slot was not `Ready`, e.g. it has already been
    /// recycled by the engine.
    pub fn release(&self, index: SlotIndex) -> Result<bool, SlotError> {
        critical_section::with(|_| self.ring.release(index))
    }

    /// Metadata of slot `index`.
    pub fn slot_info(&self, index: SlotIndex) -> Result<SlotInfo, SlotError> {
        self.ring.info(index)
    }

    /// Whether `index` still holds the data of completion `sequence`.
    ///
    /// Check this after copying out of [`bytes()`](Self::bytes): `false`
    /// means the engine recycled the slot after its notification was queued
    /// (or the notification is from a previous run), so the copy is suspect.
    pub fn holds(&self, index: SlotIndex, sequence: u32) -> bool {
        self.ring.info(index).is_ok_and(|info| {
            matches!(info.state, SlotState::Ready | SlotState::Consumed)
                && info.sequence == sequence
        })
    }

    /// The slot the engine is writing, while running.
    pub fn filling(&self) -> Option<SlotIndex> {
        self.state()
            .is_running()
            .then(|| SlotIndex::new(self.filling.load(Ordering::Acquire)))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Achieved sample rate from the last successful `configure`, 0 before.
    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    /// Words per slot.
    pub fn slot_len(&self) -> usize {
        self.slot_len.load(Ordering::Relaxed)
    }

    /// Slot completions since `start` (wraps at `u32::MAX`).
    pub fn completions(&self) -> u32 {
        self.completions.load(Ordering::Relaxed)
    }

    /// Notifications dropped because the event queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn notify(&self, event: Event) {
        if self.events.try_push(event).is_err() {
            let dropped = self.dropped.load(Ordering::Relaxed).wrapping_add(1);
            self.dropped.store(dropped, Ordering::Relaxed);

            #[cfg(feature = "defmt")]
            defmt::warn!("event queue full, dropped {}", event);
        }
    }

    fn latch_overrun(&self) {
        let count = self.overruns.load(Ordering::Relaxed).saturating_add(1);
        self.overruns.store(count, Ordering::Relaxed);
        if self.state() == StreamState::Streaming {
            self.set_state(StreamState::ErrorLatched);
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("acquisition overrun ({=u32} unreported)", count);
    }

    fn halt(&self, cs: CriticalSection<'_>) {
        {
            let mut hw = self.hw.borrow_ref_mut(cs);
            let hw = &mut *hw;
            hw.trigger.disable();
            hw.transfer.unlisten(TransferEvent::Complete);
            hw.transfer.unlisten(TransferEvent::Error);
            hw.transfer.stop();
        }
        if self.state().is_running() {
            // Partial data: the slot never completed.
            self.ring
                .abandon(SlotIndex::new(self.filling.load(Ordering::Relaxed)));
        }
        self.set_state(StreamState::Stopped);
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl<'a, T, D, R, W, const LEN: usize, const SLOTS: usize, const Q: usize> InterruptHandler
    for AcquisitionStream<'a, T, D, R, W, LEN, SLOTS, Q>
where
    T: TriggerSource + Send,
    D: TransferEngine<W> + Send,
    R: RegisterStatus + Send,
    W: Word,
{
    fn on_interrupt(&self, entry: Entry) {
        match entry {
            Entry::TransferComplete => self.on_transfer_complete(),
            Entry::TransferError => self.on_transfer_error(),
            Entry::External => {}
        }
    }
}

impl<'a, T, D, R, W, const LEN: usize, const SLOTS: usize, const Q: usize> Drop
    for AcquisitionStream<'a, T, D, R, W, LEN, SLOTS, Q>
where
    T: TriggerSource,
    D: TransferEngine<W>,
    R: RegisterStatus,
    W: Word,
{
    fn drop(&mut self) {
        if self.state().is_running() {
            critical_section::with(|cs| self.halt(cs));
            panic!("acquisition stream dropped while streaming; call stop() first");
        }
    }
}
