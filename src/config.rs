//! System configuration parameters
//!
//! All tunable parameters for the FilterMon system.
//! Values can be overridden via NVS (non-volatile storage); the sensor
//! calibration itself lives in the catalogue file (see [`crate::calibration`]).

use serde::{Deserialize, Serialize};

use crate::app::ledger::FilterId;

/// Replacement thresholds for one cartridge: whichever runs out first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifespanLimit {
    /// Rated throughput before replacement (litres).
    pub max_volume_l: f32,
    /// Rated service life before replacement (days).
    pub max_days: u32,
}

/// Per-cartridge limits, one slot per [`FilterId`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterLimits {
    pub carbon: LifespanLimit,
    pub kdf_gac: LifespanLimit,
    pub ceramic: LifespanLimit,
}

/// Rated lifetimes of the stock cartridges.
impl Default for FilterLimits {
    fn default() -> Self {
        Self {
            carbon: LifespanLimit { max_volume_l: 10_000.0, max_days: 180 },
            kdf_gac: LifespanLimit { max_volume_l: 20_000.0, max_days: 365 },
            ceramic: LifespanLimit { max_volume_l: 5_000.0, max_days: 180 },
        }
    }
}

impl FilterLimits {
    pub fn get(&self, id: FilterId) -> &LifespanLimit {
        match id {
            FilterId::Carbon => &self.carbon,
            FilterId::KdfGac => &self.kdf_gac,
            FilterId::Ceramic => &self.ceramic,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Flow sensor ---
    /// Catalogue entry name of the fitted sensor.
    pub sensor_model: heapless::String<32>,
    /// Path of the sensor catalogue JSON on the data partition.
    pub catalog_path: heapless::String<64>,
    /// Flow integration cadence (milliseconds)
    pub tick_interval_ms: u32,
    /// Time since last pulse after which flow is reported absent (milliseconds)
    pub no_flow_timeout_ms: u32,

    // --- Cartridges ---
    pub limits: FilterLimits,
    /// Impute usage from elapsed days while a cartridge shows no throughput.
    pub estimate_idle_usage: bool,

    // --- Publishing ---
    /// First topic segment, e.g. `home` → `home/<device>/allTime`.
    pub topic_base: heapless::String<32>,
    pub broker_url: heapless::String<64>,
    /// Publish attempts per message before it is dropped.
    pub publish_retry_count: u8,
    /// Blocking pause between publish attempts (milliseconds)
    pub publish_retry_backoff_ms: u32,
    /// Minimum spacing between broker reconnect attempts (milliseconds)
    pub mqtt_reconnect_interval_ms: u32,
}

fn fixed<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    let _ = out.push_str(s);
    out
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Flow sensor
            sensor_model: fixed("YF-G1"),
            catalog_path: fixed("/spiffs/config.json"),
            tick_interval_ms: 1000, // 1 Hz
            no_flow_timeout_ms: 2000,

            // Cartridges
            limits: FilterLimits::default(),
            estimate_idle_usage: true,

            // Publishing
            topic_base: fixed("home"),
            broker_url: fixed("mqtt://192.168.1.10:1883"),
            publish_retry_count: 3,
            publish_retry_backoff_ms: 1000,
            mqtt_reconnect_interval_ms: 5000,
        }
    }
}
