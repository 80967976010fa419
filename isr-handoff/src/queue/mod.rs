//! Interrupt-to-task handoff.
//!
//! ## Components
//!
//! - [`spsc`]: [`HandoffQueue`] with its [`Producer`] (interrupt side) and
//!   [`Consumer`] (task side) handles
//! - [`signal`]: [`SignalingProducer`] drop-and-signal overflow policy
//!
//! ## Usage
//!
//! ```ignore
//! static EVENTS: HandoffQueue<Led, 3> = HandoffQueue::new();
//!
//! // init
//! let (tx, rx) = EVENTS.split();
//! let mut button = SignalingProducer::new(tx, PinIndicator::new(blue, delay, 100_000));
//!
//! // EXTI ISR
//! exti.clear_pending();
//! button.emit(next_led);
//!
//! // task loop
//! loop {
//!     toggle(rx.pop_with(cortex_m::asm::wfi));
//! }
//! ```

pub mod signal;
pub mod spsc;

pub use signal::{Indicator, SignalingProducer};
pub use spsc::{Consumer, HandoffQueue, Producer};

#[cfg(feature = "embedded-hal")]
pub use signal::PinIndicator;
