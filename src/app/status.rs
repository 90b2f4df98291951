//! Status query rendering (`GET /data`).
//!
//! Volumes are human-scaled strings; day counts stay numeric.

use core::fmt::Write as _;

use serde::Serialize;

use super::ledger::{FilterId, FilterLedger, LifeProjection};

/// Confirmation page returned by `POST /reset`, whatever the outcome.
pub const RESET_CONFIRMATION_HTML: &str =
    "<html><body><h1>Reset Completed</h1><a href=\"/\">Back to Home</a></body></html>";

/// Render a volume with a `k`/`M` suffix above a thousand / a million.
pub fn format_value(value: f32) -> String {
    let mut out = String::new();
    let _ = if value >= 1_000_000.0 {
        write!(out, "{:.2}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        write!(out, "{:.2}k", value / 1_000.0)
    } else {
        write!(out, "{:.2}", value)
    };
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub total_litres: String,
    pub flowrate: String,
    pub last_reset: String,
    pub flow_detected: bool,

    pub carbon_total: String,
    pub carbon_changed: String,
    pub carbon_remaining: String,
    pub carbon_remaining_days: u32,

    pub kdfgac_total: String,
    pub kdfgac_changed: String,
    pub kdfgac_remaining: String,
    pub kdfgac_remaining_days: u32,

    pub ceramic_total: String,
    pub ceramic_changed: String,
    pub ceramic_remaining: String,
    pub ceramic_remaining_days: u32,
}

struct FilterFields {
    total: String,
    changed: String,
    remaining: String,
    remaining_days: u32,
}

impl StatusReport {
    pub fn new(
        ledger: &FilterLedger,
        projections: &[LifeProjection; 3],
        flow_rate_l_min: f32,
        flow_detected: bool,
    ) -> Self {
        let [carbon, kdfgac, ceramic] = FilterId::ALL.map(|id| {
            let record = ledger.record(id);
            let projection = &projections[id.index()];
            FilterFields {
                total: format_value(record.processed_volume_l),
                changed: record.last_changed_at.format().as_str().to_owned(),
                remaining: format_value(projection.remaining_volume_l),
                remaining_days: projection.remaining_days,
            }
        });
        let aggregate = ledger.aggregate();

        Self {
            total_litres: format_value(aggregate.all_time_volume_l),
            flowrate: format_value(flow_rate_l_min),
            last_reset: aggregate.last_reset_at.format().as_str().to_owned(),
            flow_detected,

            carbon_total: carbon.total,
            carbon_changed: carbon.changed,
            carbon_remaining: carbon.remaining,
            carbon_remaining_days: carbon.remaining_days,

            kdfgac_total: kdfgac.total,
            kdfgac_changed: kdfgac.changed,
            kdfgac_remaining: kdfgac.remaining,
            kdfgac_remaining_days: kdfgac.remaining_days,

            ceramic_total: ceramic.total,
            ceramic_changed: ceramic.changed,
            ceramic_remaining: ceramic.remaining,
            ceramic_remaining_days: ceramic.remaining_days,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}
