//! Flow integration step.
//!
//! Runs once per tick on the main loop.  Converts the pulses drained from
//! the ISR accumulator into a volume delta, folds it into the ledger and
//! derives the (unpersisted) flow status.
//!
//! ```text
//! volume_delta_l  = pulses / pulses_per_litre * k_factor
//! flow_rate_l_min = (pulses / elapsed_s) / k_factor
//! flow_detected   = now - last_pulse <= no_flow_timeout
//! ```

use log::warn;

use crate::calibration::CalibrationProfile;
use crate::sensors::flow::PulseSnapshot;

use super::ledger::FilterLedger;

/// What one integration tick observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub pulses: u32,
    /// Volume folded into the ledger; `None` if the delta was discarded.
    pub volume_delta_l: Option<f32>,
    pub flow_rate_l_min: f32,
    pub flow_detected: bool,
}

impl Default for TickOutcome {
    fn default() -> Self {
        Self {
            pulses: 0,
            volume_delta_l: Some(0.0),
            flow_rate_l_min: 0.0,
            flow_detected: false,
        }
    }
}

pub struct FlowIntegrator {
    calibration: CalibrationProfile,
    no_flow_timeout_ms: u32,
    last_tick_ms: Option<u32>,
}

impl FlowIntegrator {
    pub fn new(calibration: CalibrationProfile, no_flow_timeout_ms: u32) -> Self {
        Self {
            calibration,
            no_flow_timeout_ms,
            last_tick_ms: None,
        }
    }

    pub fn calibration(&self) -> &CalibrationProfile {
        &self.calibration
    }

    /// Litres represented by `pulses`, or `None` if the calibration makes
    /// the result non-finite (e.g. zero pulses-per-litre).
    pub fn volume_delta(&self, pulses: u32) -> Option<f32> {
        let delta = pulses as f32 / self.calibration.pulses_per_litre * self.calibration.k_factor;
        delta.is_finite().then_some(delta)
    }

    /// Instantaneous flow rate from the pulse frequency over `elapsed_ms`.
    pub fn flow_rate(&self, pulses: u32, elapsed_ms: u32) -> f32 {
        if elapsed_ms == 0 {
            return 0.0;
        }
        let frequency_hz = pulses as f32 / (elapsed_ms as f32 / 1000.0);
        let rate = frequency_hz / self.calibration.k_factor;
        if rate.is_finite() { rate } else { 0.0 }
    }

    /// Fold one tick's pulses into `ledger`.
    ///
    /// A non-finite delta is discarded with a warning and the lifetime
    /// volume is left unchanged; processed volumes are still re-derived.
    pub fn integrate(
        &mut self,
        snapshot: PulseSnapshot,
        now_ms: u32,
        ledger: &mut FilterLedger,
    ) -> TickOutcome {
        let volume_delta_l = self.volume_delta(snapshot.pulses);
        match volume_delta_l {
            Some(delta) => ledger.add_volume(delta),
            None => {
                warn!(
                    "Flow: non-finite volume for {} pulses (pulses/L={}, k={}), total not updated",
                    snapshot.pulses, self.calibration.pulses_per_litre, self.calibration.k_factor
                );
                let total = ledger.aggregate().all_time_volume_l;
                ledger.recompute_processed(total);
            }
        }

        let elapsed_ms = self.last_tick_ms.map_or(0, |prev| now_ms.wrapping_sub(prev));
        self.last_tick_ms = Some(now_ms);

        let flow_detected = snapshot
            .last_pulse_ms
            .is_some_and(|t| now_ms.wrapping_sub(t) <= self.no_flow_timeout_ms);

        TickOutcome {
            pulses: snapshot.pulses,
            volume_delta_l,
            flow_rate_l_min: self.flow_rate(snapshot.pulses, elapsed_ms),
            flow_detected,
        }
    }
}
