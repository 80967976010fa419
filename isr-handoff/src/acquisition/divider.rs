//! Timer prescaler/reload computation for trigger sources.
//!
//! A general-purpose timer divides its input clock twice: by `PSC + 1`, then
//! by `ARR + 1`. [`TimerDivider::for_rate`] picks the pair closest to a
//! requested trigger rate, using the smallest prescaler that lets the reload
//! fit in 16 bits (finest rate resolution).

use crate::error::StreamError;

const MAX_STAGE: u64 = 1 << 16;

/// Prescaler and reload register values for one trigger rate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerDivider {
    prescaler: u16,
    reload: u16,
    actual_hz: f32,
}

impl TimerDivider {
    /// Divider producing `rate_hz` from a `clock_hz` timer clock.
    ///
    /// Fails with [`StreamError::ZeroRate`] for non-positive or non-finite
    /// rates and [`StreamError::DivisorOutOfRange`] when the ratio is below 1
    /// or above `2^32`.
    pub fn for_rate(clock_hz: u32, rate_hz: f32) -> Result<Self, StreamError> {
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(StreamError::ZeroRate);
        }

        let ratio = libm::roundf(clock_hz as f32 / rate_hz);
        if !(1.0..=(MAX_STAGE * MAX_STAGE) as f32).contains(&ratio) {
            return Err(StreamError::DivisorOutOfRange);
        }

        let total = ratio as u64;
        let div1 = total.div_ceil(MAX_STAGE).max(1);
        let div2 = ((total + div1 / 2) / div1).clamp(1, MAX_STAGE);

        Ok(TimerDivider {
            prescaler: (div1 - 1) as u16,
            reload: (div2 - 1) as u16,
            actual_hz: clock_hz as f32 / (div1 * div2) as f32,
        })
    }

    /// Value for the prescaler register (`PSC`).
    pub fn prescaler(&self) -> u16 {
        self.prescaler
    }

    /// Value for the auto-reload register (`ARR`).
    pub fn reload(&self) -> u16 {
        self.reload
    }

    /// Trigger rate the register pair produces.
    pub fn actual_hz(&self) -> f32 {
        self.actual_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_rate_uses_reload_only() {
        // 72 MHz / 96 = 750 kHz
        let div = TimerDivider::for_rate(72_000_000, 750_000.0).unwrap();
        assert_eq!(div.prescaler(), 0);
        assert_eq!(div.reload(), 95);
        assert_eq!(div.actual_hz(), 750_000.0);
    }

    #[test]
    fn slow_rate_spreads_across_both_stages() {
        let div = TimerDivider::for_rate(72_000_000, 1.0).unwrap();
        assert_eq!(div.prescaler(), 1098);
        assert_eq!(div.reload(), 65513);
        assert!((div.actual_hz() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn rejects_bad_rates() {
        assert_eq!(
            TimerDivider::for_rate(72_000_000, 0.0),
            Err(StreamError::ZeroRate)
        );
        assert_eq!(
            TimerDivider::for_rate(72_000_000, f32::NAN),
            Err(StreamError::ZeroRate)
        );
        // Faster than the timer clock itself
        assert_eq!(
            TimerDivider::for_rate(1_000, 10_000.0),
            Err(StreamError::DivisorOutOfRange)
        );
    }

    #[test]
    fn rounds_to_nearest_divisor() {
        // 72 MHz / 44.1 kHz = 1632.65 → 1633
        let div = TimerDivider::for_rate(72_000_000, 44_100.0).unwrap();
        assert_eq!(div.prescaler(), 0);
        assert_eq!(div.reload(), 1632);
        assert!((div.actual_hz() - 44_090.63).abs() < 0.5);
    }
}
