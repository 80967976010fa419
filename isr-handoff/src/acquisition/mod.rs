//! Circular DMA acquisition.
//!
//! A [`SlotRing`] holds `SLOTS` fixed-size buffers. An [`AcquisitionStream`]
//! keeps a transfer engine filling them in turn, paced by a conversion
//! trigger, and reports each completed slot as an [`Event`] on a
//! [`HandoffQueue`](crate::queue::HandoffQueue).
//!
//! The board supplies the peripherals through the traits in [`capability`];
//! [`TimerDivider`] helps implement [`TriggerSource`] on a 16-bit timer.

pub mod capability;
pub mod divider;
pub mod ring;
pub mod stream;

#[cfg(test)]
pub(crate) mod sim;


pub use capability::{Hardware, RegisterStatus, TransferEngine, TransferEvent, TriggerSource, Word};
pub use divider::TimerDivider;
pub use ring::{SlotIndex, SlotInfo, SlotRing, SlotState};
pub use stream::{AcquisitionStream, Event, StreamConfig, StreamState};
