//! Slot storage for circular acquisition.
//!
//! A [`SlotRing`] is `SLOTS` buffers of `LEN` words plus per-slot metadata.
//! It lives in a `static` (or other memory that outlives the stream) so the
//! addresses handed to the transfer engine never move.
//!
//! ## Slot lifecycle
//!
//! ```text
//!   Empty ──► Filling ──► Ready ──► Consumed
//!               ▲           │          │
//!               └───────────┴──────────┘   (ring wraps, DMA re-targets slot)
//! ```
//!
//! Exactly one slot is `Filling` while the stream runs. A `Ready` slot stays
//! readable until the ring comes back around to it, i.e. for `SLOTS - 1`
//! further completions.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use super::capability::Word;
use crate::error::SlotError;

/// Position of a slot within its ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Wrap a raw slot number.
    pub const fn new(index: usize) -> Self {
        SlotIndex(index)
    }

    /// The raw slot number.
    pub const fn get(self) -> usize {
        self.0
    }
}

impl From<SlotIndex> for usize {
    fn from(index: SlotIndex) -> usize {
        index.0
    }
}

/// Fill status of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SlotState {
    /// Never filled since the stream started.
    Empty = 0,
    /// Current transfer engine destination.
    Filling = 1,
    /// Completed and not yet released by the consumer.
    Ready = 2,
    /// Released by the consumer; contents still intact until reused.
    Consumed = 3,
}

impl SlotState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SlotState::Filling,
            2 => SlotState::Ready,
            3 => SlotState::Consumed,
            _ => SlotState::Empty,
        }
    }
}

/// Snapshot of one slot's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotInfo {
    /// Which slot.
    pub index: SlotIndex,
    /// Current fill status.
    pub state: SlotState,
    /// Completion number that last filled this slot, 0 if it was not
    /// completed since `start`. Numbers start at 1 and keep counting across
    /// restarts of the same stream.
    pub sequence: u32,
    /// Whether the peripheral reported an overrun while this slot filled.
    pub overrun: bool,
}

struct SlotMeta {
    state: AtomicU8,
    sequence: AtomicU32,
    overrun: AtomicBool,
}

impl SlotMeta {
    const fn new() -> Self {
        SlotMeta {
            state: AtomicU8::new(SlotState::Empty as u8),
            sequence: AtomicU32::new(0),
            overrun: AtomicBool::new(false),
        }
    }
}

/// Storage for `SLOTS` acquisition buffers of `LEN` words each.
#[repr(C, align(4))]
pub struct SlotRing<W, const LEN: usize, const SLOTS: usize> {
    data: [UnsafeCell<[W; LEN]>; SLOTS],
    meta: [SlotMeta; SLOTS],
}

// SAFETY: Slot memory is written only by the transfer engine, at the address
// the stream handed it, and only while that slot is `Filling`. Readers are
// refused `Filling` slots. Metadata is atomic.
unsafe impl<W: Word, const LEN: usize, const SLOTS: usize> Sync for SlotRing<W, LEN, SLOTS> {}

impl<W: Word, const LEN: usize, const SLOTS: usize> SlotRing<W, LEN, SLOTS> {
    const SHAPE_OK: () = {
        assert!(LEN > 0, "slots must hold at least one word");
        assert!(SLOTS >= 2, "a ring needs one slot to fill and one to read");
    };

    /// Create a zeroed ring with every slot `Empty`.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SHAPE_OK;

        SlotRing {
            data: [const { UnsafeCell::new([W::ZERO; LEN]) }; SLOTS],
            meta: [const { SlotMeta::new() }; SLOTS],
        }
    }

    /// Number of slots.
    pub const fn slots(&self) -> usize {
        SLOTS
    }

    /// Words each slot can hold.
    pub const fn slot_capacity(&self) -> usize {
        LEN
    }

    /// Metadata snapshot of slot `index`.
    pub fn info(&self, index: SlotIndex) -> Result<SlotInfo, SlotError> {
        let meta = self.meta(index)?;
        Ok(SlotInfo {
            index,
            state: SlotState::from_u8(meta.state.load(Ordering::Acquire)),
            sequence: meta.sequence.load(Ordering::Acquire),
            overrun: meta.overrun.load(Ordering::Acquire),
        })
    }

    /// The first `len` words of slot `index`, if it holds completed data.
    pub(crate) fn read(&self, index: SlotIndex, len: usize) -> Result<&[W], SlotError> {
        let meta = self.meta(index)?;
        match SlotState::from_u8(meta.state.load(Ordering::Acquire)) {
            SlotState::Filling => return Err(SlotError::Filling { index: index.0 }),
            SlotState::Empty => return Err(SlotError::NotReady { index: index.0 }),
            SlotState::Ready | SlotState::Consumed => {}
        }
        let len = len.min(LEN);
        // SAFETY: the index is in range and the slot is not the engine's
        // destination, so nothing writes it until the ring wraps back to it.
        // The Acquire load above pairs with the Release in `complete`.
        Ok(unsafe { core::slice::from_raw_parts(self.data[index.0].get() as *const W, len) })
    }

    pub(crate) fn buffer_ptr(&self, index: SlotIndex) -> *mut W {
        self.data[index.0].get() as *mut W
    }

    pub(crate) fn begin_fill(&self, index: SlotIndex) {
        let meta = &self.meta[index.0];
        meta.overrun.store(false, Ordering::Relaxed);
        meta.state.store(SlotState::Filling as u8, Ordering::Release);
    }

    pub(crate) fn complete(&self, index: SlotIndex, sequence: u32, overrun: bool) {
        let meta = &self.meta[index.0];
        meta.sequence.store(sequence, Ordering::Relaxed);
        meta.overrun.store(overrun, Ordering::Relaxed);
        meta.state.store(SlotState::Ready as u8, Ordering::Release);
    }

    pub(crate) fn mark_overrun(&self, index: SlotIndex) {
        self.meta[index.0].overrun.store(true, Ordering::Release);
    }

    /// `Ready` → `Consumed`. Returns `false` if the slot was not `Ready`.
    pub(crate) fn release(&self, index: SlotIndex) -> Result<bool, SlotError> {
        let meta = self.meta(index)?;
        if SlotState::from_u8(meta.state.load(Ordering::Acquire)) != SlotState::Ready {
            return Ok(false);
        }
        meta.state.store(SlotState::Consumed as u8, Ordering::Release);
        Ok(true)
    }

    pub(crate) fn abandon(&self, index: SlotIndex) {
        self.meta[index.0]
            .state
            .store(SlotState::Empty as u8, Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        for meta in &self.meta {
            meta.state.store(SlotState::Empty as u8, Ordering::Relaxed);
            meta.sequence.store(0, Ordering::Relaxed);
            meta.overrun.store(false, Ordering::Relaxed);
        }
    }

    fn meta(&self, index: SlotIndex) -> Result<&SlotMeta, SlotError> {
        self.meta.get(index.0).ok_or(SlotError::OutOfRange {
            index: index.0,
            slots: SLOTS,
        })
    }
}

impl<W: Word, const LEN: usize, const SLOTS: usize> Default for SlotRing<W, LEN, SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}
