//! Simulated peripherals for host tests.
//!
//! One [`SimBus`] backs a trigger, a transfer engine and a status register,
//! records what the driver did to them, and lets a test play the part of the
//! DMA controller by writing into whatever destination is currently armed.

use std::sync::{Arc, Mutex, MutexGuard};
use std::vec::Vec;

use super::capability::{Hardware, RegisterStatus, TransferEngine, TransferEvent, TriggerSource, Word};
use super::divider::TimerDivider;
use crate::error::StreamError;

/// 72 MHz / 6 / 14 cycles per conversion.
pub(crate) const MAX_RATE: f32 = 857_142.0;
pub(crate) const TIMER_CLOCK: u32 = 72_000_000;

/// Timer trigger outputs the simulated ADC can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trgo {
    Tim3,
}

#[derive(Default)]
pub(crate) struct SimState {
    pub configured: Option<(f32, Trgo)>,
    pub divider: Option<TimerDivider>,
    pub trigger_enabled: bool,
    pub destination: Option<(usize, usize)>,
    pub dma_running: bool,
    pub listen_complete: bool,
    pub listen_error: bool,
    pub overrun: bool,
    pub log: Vec<&'static str>,
}

#[derive(Clone, Default)]
pub(crate) struct SimBus(Arc<Mutex<SimState>>);

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hardware(&self) -> Hardware<SimTrigger, SimDma, SimStatus> {
        Hardware::new(
            SimTrigger(self.clone()),
            SimDma(self.clone()),
            SimStatus(self.clone()),
        )
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.0.lock().unwrap()
    }

    /// Fill the armed destination with `value`, as the DMA engine would.
    /// Returns `false` if the engine is not running.
    pub fn dma_write<W: Word>(&self, value: W) -> bool {
        let state = self.state();
        match (state.dma_running, state.destination) {
            (true, Some((addr, len))) => {
                // SAFETY: the driver handed this address out via
                // `set_destination` and keeps it valid while the engine runs.
                unsafe { core::slice::from_raw_parts_mut(addr as *mut W, len) }.fill(value);
                true
            }
            _ => false,
        }
    }

    pub fn raise_overrun(&self) {
        self.state().overrun = true;
    }

    pub fn destination(&self) -> Option<(usize, usize)> {
        self.state().destination
    }
}

pub(crate) struct SimTrigger(SimBus);

impl TriggerSource for SimTrigger {
    type Source = Trgo;

    fn max_rate(&self) -> f32 {
        MAX_RATE
    }

    fn configure(&mut self, rate: f32, source: Trgo) -> Result<f32, StreamError> {
        let divider = TimerDivider::for_rate(TIMER_CLOCK, rate)?;
        let mut state = self.0.state();
        state.configured = Some((rate, source));
        state.divider = Some(divider);
        state.log.push("trigger configure");
        Ok(divider.actual_hz())
    }

    fn enable(&mut self) {
        let mut state = self.0.state();
        state.trigger_enabled = true;
        state.log.push("trigger enable");
    }

    fn disable(&mut self) {
        let mut state = self.0.state();
        state.trigger_enabled = false;
        state.log.push("trigger disable");
    }
}

pub(crate) struct SimDma(SimBus);

impl<W: Word> TransferEngine<W> for SimDma {
    unsafe fn set_destination(&mut self, buffer: *mut W, len: usize) {
        self.0.state().destination = Some((buffer as usize, len));
    }

    fn start(&mut self) {
        let mut state = self.0.state();
        state.dma_running = true;
        state.log.push("dma start");
    }

    fn stop(&mut self) {
        let mut state = self.0.state();
        state.dma_running = false;
        state.log.push("dma stop");
    }

    fn listen(&mut self, event: TransferEvent) {
        let mut state = self.0.state();
        match event {
            TransferEvent::Complete => state.listen_complete = true,
            TransferEvent::Error => state.listen_error = true,
        }
    }

    fn unlisten(&mut self, event: TransferEvent) {
        let mut state = self.0.state();
        match event {
            TransferEvent::Complete => state.listen_complete = false,
            TransferEvent::Error => state.listen_error = false,
        }
    }

    fn clear(&mut self, _event: TransferEvent) {}
}

pub(crate) struct SimStatus(SimBus);

impl RegisterStatus for SimStatus {
    fn overrun(&self) -> bool {
        self.0.state().overrun
    }

    fn clear_overrun(&mut self) {
        self.0.state().overrun = false;
    }
}

/// Stream over the simulated peripherals.
pub(crate) type SimStream<'a, W, const LEN: usize, const SLOTS: usize, const Q: usize> =
    super::AcquisitionStream<'a, SimTrigger, SimDma, SimStatus, W, LEN, SLOTS, Q>;

pub(crate) fn config(sample_rate: f32, slot_len: usize) -> super::StreamConfig<Trgo> {
    super::StreamConfig::new(sample_rate, Trgo::Tim3, slot_len)
}

/// One DMA pass: fill the armed slot with `value`, then raise the
/// transfer-complete interrupt.
pub(crate) fn complete_with<W: Word, const LEN: usize, const SLOTS: usize, const Q: usize>(
    bus: &SimBus,
    stream: &SimStream<'_, W, LEN, SLOTS, Q>,
    value: W,
) {
    bus.dma_write(value);
    stream.on_transfer_complete();
}
