//! Hall-effect water flow sensor: interrupt-side pulse accumulation.
//!
//! The sensor pulls its output low once per fixed slug of water.  A GPIO
//! ISR on the falling edge calls [`flow_isr_handler`], which bumps an
//! atomic counter and stamps the pulse time.  The 1 Hz integration tick
//! drains the counter with a single atomic `swap`, so a pulse landing
//! between the read and the reset can be neither lost nor counted twice.
//!
//! No locks, no allocation, no storage access on the ISR path.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::app::ports::PulseSource;

/// Counter written by the ISR, drained by the main loop.
///
/// Single producer (interrupt context), single consumer (main loop).
pub struct PulseAccumulator {
    count: AtomicU32,
    last_pulse_ms: AtomicU32,
    seen_pulse: AtomicBool,
}

/// What one `snapshot_and_reset` observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseSnapshot {
    /// Pulses since the previous snapshot.
    pub pulses: u32,
    /// Monotonic time of the most recent pulse ever seen (wrapping ms).
    pub last_pulse_ms: Option<u32>,
}

impl PulseAccumulator {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            last_pulse_ms: AtomicU32::new(0),
            seen_pulse: AtomicBool::new(false),
        }
    }

    /// Record one pulse.  Interrupt context only.
    #[inline]
    pub fn on_pulse(&self, now_ms: u32) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.last_pulse_ms.store(now_ms, Ordering::Relaxed);
        self.seen_pulse.store(true, Ordering::Release);
    }

    /// Drain the counter and report the last pulse time.  Main loop only.
    pub fn snapshot_and_reset(&self) -> PulseSnapshot {
        let pulses = self.count.swap(0, Ordering::AcqRel);
        let last_pulse_ms = self
            .seen_pulse
            .load(Ordering::Acquire)
            .then(|| self.last_pulse_ms.load(Ordering::Relaxed));
        PulseSnapshot {
            pulses,
            last_pulse_ms,
        }
    }
}

impl Default for PulseAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseSource for &PulseAccumulator {
    fn take_pulses(&mut self) -> PulseSnapshot {
        self.snapshot_and_reset()
    }
}

/// The accumulator the flow-sensor GPIO ISR feeds.
/// `static` because ESP-IDF ISR callbacks cannot capture state.
pub static FLOW_PULSES: PulseAccumulator = PulseAccumulator::new();

/// Called from the GPIO ISR on each falling edge.
pub fn flow_isr_handler(now_ms: u32) {
    FLOW_PULSES.on_pulse(now_ms);
}

/// Flow sensor driver: the main-loop view of [`FLOW_PULSES`].
pub struct FlowSensor {
    accumulator: &'static PulseAccumulator,
    /// GPIO pin number (stored for diagnostics).
    gpio: i32,
}

impl FlowSensor {
    pub fn new(gpio: i32) -> Self {
        Self {
            accumulator: &FLOW_PULSES,
            gpio,
        }
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }
}

impl PulseSource for FlowSensor {
    fn take_pulses(&mut self) -> PulseSnapshot {
        self.accumulator.snapshot_and_reset()
    }
}
