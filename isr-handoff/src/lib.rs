//! # isr-handoff
//!
//! A `no_std`, zero-allocation toolkit for moving data out of interrupt
//! handlers: a lock-free single-producer/single-consumer handoff queue, and a
//! circular DMA acquisition driver built on top of it.
//!
//! Works on any Cortex-M (including M0/M0+, which lack compare-and-swap):
//! the data path only uses atomic loads and stores, and the control path uses
//! [`critical-section`](https://docs.rs/critical-section).
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Queue | [`queue`] | [`HandoffQueue`] split into ISR-side [`Producer`] and task-side [`Consumer`] |
//! | Signal | [`queue::signal`] | Drop-newest emitter with an optional "data ready" indicator |
//! | Driver | [`acquisition`] | [`AcquisitionStream`] over a [`SlotRing`] of DMA targets |
//! | Interrupts | [`vector`] | Static table routing interrupt lines to handlers |
//! | Errors | [`error`] | Configuration, slot access and overrun errors |
//!
//! ## Quick start
//!
//! ```ignore
//! use isr_handoff::queue::HandoffQueue;
//!
//! static SAMPLES: HandoffQueue<u16, 8> = HandoffQueue::new();
//!
//! let (tx, rx) = SAMPLES.split();
//!
//! // In the ISR:
//! let _ = tx.try_push(adc.read());
//!
//! // In the task:
//! let sample = rx.pop_with(cortex_m::asm::wfi);
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Enables |
//! |---------|---------|---------|
//! | `embedded-hal` | no | [`queue::signal::PinIndicator`], pulsing a GPIO per notification |
//! | `defmt` | no | `defmt::Format` on public types and driver logging |

#![no_std]

#[cfg(test)]
extern crate std;

pub mod acquisition;
pub mod error;
pub mod queue;
pub mod vector;

pub use acquisition::{AcquisitionStream, Event, SlotIndex, SlotRing, StreamConfig, StreamState};
pub use error::{OverrunError, SlotError, StreamError};
pub use queue::{Consumer, HandoffQueue, Producer};
