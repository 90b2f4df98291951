//! Mock port adapters for integration tests.
//!
//! Each mock records what the service did to it so tests can assert on
//! the full history without touching flash, radio or timers.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;

use embedded_hal::delay::DelayNs;
use filtermon::app::events::AppEvent;
use filtermon::app::ports::{
    ClockPort, EventSink, PublishError, PublishPort, PulseSource, StorageError, StoragePort,
};
use filtermon::app::timestamp::Timestamp;
use filtermon::calibration::CalibrationProfile;
use filtermon::config::SystemConfig;
use filtermon::sensors::flow::PulseSnapshot;

// ── Storage ───────────────────────────────────────────────────

/// In-memory flash.  Survives a simulated reboot by being moved into the
/// next `AppService::start`.
#[derive(Default, Clone)]
pub struct MemStorage {
    pub blobs: HashMap<String, Vec<u8>>,
    pub writes: usize,
    pub fail_writes: bool,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for MemStorage {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.blobs.get(&format!("{ns}::{key}")).ok_or(StorageError::NotFound)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.writes += 1;
        self.blobs.insert(format!("{ns}::{key}"), data.to_vec());
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.blobs.contains_key(&format!("{ns}::{key}"))
    }
}

// ── Clock ─────────────────────────────────────────────────────

/// Manually advanced clock.  `wall == None` models "SNTP not synced".
pub struct ManualClock {
    pub mono_ms: Cell<u32>,
    pub wall: Cell<Option<Timestamp>>,
}

impl ManualClock {
    pub fn at(wall_secs: u32) -> Self {
        Self {
            mono_ms: Cell::new(0),
            wall: Cell::new(Some(Timestamp::from_epoch_secs(wall_secs))),
        }
    }

    pub fn unsynced() -> Self {
        Self {
            mono_ms: Cell::new(0),
            wall: Cell::new(None),
        }
    }

    /// Advance both clocks.
    pub fn advance_ms(&self, ms: u32) {
        self.mono_ms.set(self.mono_ms.get().wrapping_add(ms));
        if let Some(w) = self.wall.get() {
            self.wall
                .set(Some(Timestamp::from_epoch_secs(w.epoch_secs() + ms / 1_000)));
        }
    }
}

impl ClockPort for ManualClock {
    fn monotonic_ms(&self) -> u32 {
        self.mono_ms.get()
    }

    fn wall_clock(&self) -> Option<Timestamp> {
        self.wall.get()
    }
}

// ── Pulses ────────────────────────────────────────────────────

/// Hands out one queued snapshot per tick, then empty ones.
#[derive(Default)]
pub struct ScriptedPulses {
    pub queue: Vec<PulseSnapshot>,
}

impl ScriptedPulses {
    pub fn burst(pulses: u32, at_ms: u32) -> Self {
        Self {
            queue: vec![PulseSnapshot {
                pulses,
                last_pulse_ms: Some(at_ms),
            }],
        }
    }

    pub fn push(&mut self, pulses: u32, at_ms: u32) {
        self.queue.push(PulseSnapshot {
            pulses,
            last_pulse_ms: Some(at_ms),
        });
    }
}

impl PulseSource for ScriptedPulses {
    fn take_pulses(&mut self) -> PulseSnapshot {
        if self.queue.is_empty() {
            PulseSnapshot::default()
        } else {
            self.queue.remove(0)
        }
    }
}

// ── Publisher ─────────────────────────────────────────────────

/// Records every publish attempt.  The first `fail_next` attempts fail.
pub struct RecordingPublisher {
    pub connected: bool,
    pub fail_next: usize,
    pub attempts: usize,
    pub sent: Vec<(String, Vec<u8>)>,
}

impl RecordingPublisher {
    pub fn online() -> Self {
        Self {
            connected: true,
            fail_next: 0,
            attempts: 0,
            sent: Vec::new(),
        }
    }

    pub fn offline() -> Self {
        Self {
            connected: false,
            ..Self::online()
        }
    }

    pub fn json(&self, topic: &str) -> Option<serde_json::Value> {
        self.sent
            .iter()
            .rev()
            .find(|(t, _)| t == topic)
            .and_then(|(_, body)| serde_json::from_slice(body).ok())
    }
}

impl PublishPort for RecordingPublisher {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.attempts += 1;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(PublishError::Rejected);
        }
        self.sent.push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }
}

// ── Delay ─────────────────────────────────────────────────────

/// Counts requested delay instead of sleeping.
#[derive(Default)]
pub struct CountingDelay {
    pub total_ns: u64,
    pub calls: usize,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
        self.calls += 1;
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Fixtures ──────────────────────────────────────────────────

/// 2024-07-03 09:46:40 UTC.
pub const NOW_SECS: u32 = 1_720_000_000;

pub const DEVICE_ID: &str = "DEADBEEFCAFE";

pub fn profile(ppl: f32, k: f32) -> CalibrationProfile {
    CalibrationProfile {
        sensor_name: heapless::String::new(),
        pulses_per_litre: ppl,
        k_factor: k,
    }
}

/// Defaults with the idle estimator off, so projections reflect only
/// measured flow.
pub fn test_config() -> SystemConfig {
    SystemConfig {
        estimate_idle_usage: false,
        ..SystemConfig::default()
    }
}
