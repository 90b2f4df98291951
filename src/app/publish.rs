//! Outbound snapshots for the message bus.
//!
//! ```text
//! <base>/<deviceId>/carbonFilter    {"totalLitres":…,"lastChanged":"…",
//!                                    "remainingLife":"N days / X.XX L"}
//! <base>/<deviceId>/kdfGacFilter    (same)
//! <base>/<deviceId>/ceramicFilter   (same)
//! <base>/<deviceId>/allTime         {"allTimeLitres":…,"lastFullReset":<epoch secs>}
//! <base>/<deviceId>/resetFilter     inbound command topic
//! ```

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use log::warn;
use serde::Serialize;

use super::ledger::{AggregateState, FilterId, FilterRecord, LifeProjection};
use super::ports::{PublishError, PublishPort};

pub const TOPIC_ALL_TIME: &str = "allTime";
pub const TOPIC_RESET: &str = "resetFilter";

/// Fully qualified topic names for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    filters: [String; 3],
    all_time: String,
    reset: String,
}

impl TopicSet {
    pub fn new(base: &str, device_id: &str) -> Self {
        let topic = |leaf: &str| format!("{base}/{device_id}/{leaf}");
        Self {
            filters: FilterId::ALL.map(|id| topic(id.topic_name())),
            all_time: topic(TOPIC_ALL_TIME),
            reset: topic(TOPIC_RESET),
        }
    }

    pub fn filter(&self, id: FilterId) -> &str {
        &self.filters[id.index()]
    }

    pub fn all_time(&self) -> &str {
        &self.all_time
    }

    /// Topic the device subscribes to for reset commands.
    pub fn reset(&self) -> &str {
        &self.reset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPayload {
    pub total_litres: f32,
    pub last_changed: String,
    pub remaining_life: String,
}

impl FilterPayload {
    pub fn new(record: &FilterRecord, projection: &LifeProjection) -> Self {
        Self {
            total_litres: record.processed_volume_l,
            last_changed: record.last_changed_at.format().as_str().to_owned(),
            remaining_life: remaining_life_text(
                projection.remaining_days,
                projection.remaining_volume_l,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatePayload {
    pub all_time_litres: f32,
    /// Seconds since the Unix epoch.
    pub last_full_reset: u32,
}

impl AggregatePayload {
    pub fn new(aggregate: &AggregateState) -> Self {
        Self {
            all_time_litres: aggregate.all_time_volume_l,
            last_full_reset: aggregate.last_full_reset_at.epoch_secs(),
        }
    }
}

/// `"<days> days / <litres> L"`, litres to two decimals.
pub fn remaining_life_text(days: u32, litres: f32) -> String {
    let mut out = String::new();
    let _ = write!(out, "{} days / {:.2} L", days, litres);
    out
}

/// Publish with up to `attempts` tries, blocking `backoff_ms` between them.
///
/// Returns the last error once attempts are exhausted.  `attempts == 0`
/// is treated as one attempt.
pub fn publish_with_retry<P, D>(
    port: &mut P,
    delay: &mut D,
    topic: &str,
    payload: &[u8],
    attempts: u8,
    backoff_ms: u32,
) -> Result<(), PublishError>
where
    P: PublishPort + ?Sized,
    D: DelayNs + ?Sized,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match port.publish(topic, payload) {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!("PUBLISH | {} attempt {}/{} failed: {}", topic, attempt, attempts, e);
                delay.delay_ms(backoff_ms);
                attempt += 1;
            }
        }
    }
}
