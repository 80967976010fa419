//! Overflow signaling for interrupt-side producers.
//!
//! A full queue is not an error the interrupt handler can report to anyone,
//! so the handler applies a local policy instead: drop the new value and make
//! the loss visible on a side channel (an LED pulse, a test probe, a counter).
//! [`SignalingProducer`] packages that policy.

use super::spsc::Producer;

/// A side channel fired when a producer has to drop a value.
///
/// Implementations run in interrupt context and must return in bounded time.
pub trait Indicator {
    /// Make one overflow visible.
    fn signal(&mut self);
}

impl<F: FnMut()> Indicator for F {
    fn signal(&mut self) {
        self()
    }
}

/// A [`Producer`] that drops the newest value on overflow and fires an
/// [`Indicator`].
///
/// Values already queued are never touched: removing the oldest would mean
/// writing the consumer's read index from interrupt context.
pub struct SignalingProducer<'a, T, I, const N: usize> {
    producer: Producer<'a, T, N>,
    indicator: I,
    dropped: u32,
}

impl<'a, T, I: Indicator, const N: usize> SignalingProducer<'a, T, I, N> {
    /// Wrap `producer`, firing `indicator` on each dropped value.
    pub fn new(producer: Producer<'a, T, N>, indicator: I) -> Self {
        SignalingProducer {
            producer,
            indicator,
            dropped: 0,
        }
    }

    /// Push `val`; on a full queue drop it and fire the indicator.
    ///
    /// Returns `true` if the value was queued.
    pub fn emit(&mut self, val: T) -> bool {
        match self.producer.try_push(val) {
            Ok(()) => true,
            Err(_) => {
                self.dropped = self.dropped.wrapping_add(1);
                self.indicator.signal();
                false
            }
        }
    }

    /// Number of values dropped so far (wraps at `u32::MAX`).
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Give back the wrapped producer and indicator.
    pub fn into_inner(self) -> (Producer<'a, T, N>, I) {
        (self.producer, self.indicator)
    }
}

#[cfg(feature = "embedded-hal")]
pub use pin::PinIndicator;

#[cfg(feature = "embedded-hal")]
mod pin {
    use embedded_hal::delay::DelayNs;
    use embedded_hal::digital::OutputPin;

    use super::Indicator;

    /// Pulses an output pin high for a fixed time, e.g. an overflow LED.
    ///
    /// The pulse is a busy wait inside the interrupt handler, so keep it
    /// short compared to the interrupt period.
    pub struct PinIndicator<P, D> {
        pin: P,
        delay: D,
        pulse_us: u32,
    }

    impl<P, D> PinIndicator<P, D>
    where
        P: OutputPin,
        D: DelayNs,
    {
        /// Create an indicator that holds `pin` high for `pulse_us` microseconds.
        pub fn new(pin: P, delay: D, pulse_us: u32) -> Self {
            PinIndicator {
                pin,
                delay,
                pulse_us,
            }
        }

        /// Release the pin and delay provider.
        pub fn release(self) -> (P, D) {
            (self.pin, self.delay)
        }
    }

    impl<P, D> Indicator for PinIndicator<P, D>
    where
        P: OutputPin,
        D: DelayNs,
    {
        fn signal(&mut self) {
            // Pin errors have no one to go to from an ISR.
            let _ = self.pin.set_high();
            self.delay.delay_us(self.pulse_us);
            let _ = self.pin.set_low();
        }
    }
}
