//! ESP32 time adapter.
//!
//! Implements [`ClockPort`] for FilterMon.
//!
//! - **`target_os = "espidf"`**: monotonic time from `esp_timer_get_time()`,
//!   wall clock from `gettimeofday()` (set by SNTP once the network is up).
//! - **`not(target_os = "espidf")`**: `std::time::Instant` and
//!   `SystemTime` for host-side testing and simulation.
//!
//! Also provides the blocking [`DelayNs`] used for publish backoff.

use embedded_hal::delay::DelayNs;

use crate::app::ports::ClockPort;
use crate::app::timestamp::Timestamp;

/// Anything earlier is an unsynced RTC, not a real date.
const EPOCH_2020: i64 = 1_577_836_800;

/// Time adapter for the ESP32 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        // SAFETY: esp_timer_get_time reads the high-resolution timer; no preconditions.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    #[cfg(target_os = "espidf")]
    fn unix_secs(&self) -> Option<i64> {
        let mut tv = esp_idf_svc::sys::timeval { tv_sec: 0, tv_usec: 0 };
        // SAFETY: tv is a valid out-pointer; a null timezone is permitted.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        Some(tv.tv_sec as i64)
    }

    #[cfg(not(target_os = "espidf"))]
    fn unix_secs(&self) -> Option<i64> {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .and_then(|d| i64::try_from(d.as_secs()).ok())
    }
}

impl ClockPort for Esp32TimeAdapter {
    /// Wraps after ~49.7 days; consumers use wrapping arithmetic.
    fn monotonic_ms(&self) -> u32 {
        (self.uptime_us() / 1_000) as u32
    }

    fn wall_clock(&self) -> Option<Timestamp> {
        let secs = self.unix_secs()?;
        if secs < EPOCH_2020 {
            return None;
        }
        u32::try_from(secs).ok().map(Timestamp::from_epoch_secs)
    }
}

/// Blocking delay.  FreeRTOS task delay on target, thread sleep on host.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskDelay;

impl DelayNs for TaskDelay {
    #[cfg(target_os = "espidf")]
    fn delay_ns(&mut self, ns: u32) {
        esp_idf_hal::delay::Delay::new_default().delay_us(ns.div_ceil(1_000));
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
