//! Filter consumption ledger.
//!
//! The ledger is the single owner of the three cartridge records and the
//! lifetime aggregate.  Every mutation (volume integration, resets) goes
//! through its methods so that the invariant
//!
//! ```text
//! record.processed_volume_l == aggregate.all_time_volume_l - record.initial_volume_l
//! ```
//!
//! holds after every tick and every reset.

use crate::config::{FilterLimits, LifespanLimit};

use super::timestamp::Timestamp;

// ───────────────────────────────────────────────────────────────
// Cartridge identity
// ───────────────────────────────────────────────────────────────

/// One of the three cartridges in the housing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterId {
    Carbon,
    KdfGac,
    Ceramic,
}

impl FilterId {
    /// Storage / iteration order.
    pub const ALL: [FilterId; 3] = [Self::Carbon, Self::KdfGac, Self::Ceramic];

    pub const fn index(self) -> usize {
        match self {
            Self::Carbon => 0,
            Self::KdfGac => 1,
            Self::Ceramic => 2,
        }
    }

    /// Identifier used by the reset form and command messages.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Carbon => "carbon",
            Self::KdfGac => "kdfgac",
            Self::Ceramic => "ceramic",
        }
    }

    /// Topic leaf for this cartridge's publish channel.
    pub const fn topic_name(self) -> &'static str {
        match self {
            Self::Carbon => "carbonFilter",
            Self::KdfGac => "kdfGacFilter",
            Self::Ceramic => "ceramicFilter",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.wire_name() == name)
    }
}

// ───────────────────────────────────────────────────────────────
// Records
// ───────────────────────────────────────────────────────────────

/// Usage record for one cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterRecord {
    /// Lifetime volume at the moment this cartridge was fitted.
    pub initial_volume_l: f32,
    /// Measured volume through this cartridge.
    pub processed_volume_l: f32,
    pub last_changed_at: Timestamp,
    /// Last projected remaining volume (see [`FilterLedger::project_remaining`]).
    pub remaining_volume_l: f32,
    /// Last projected remaining days.
    pub remaining_days: u32,
}

/// Lifetime totals across all cartridges.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AggregateState {
    /// Monotonically non-decreasing, except on a full reset.
    pub all_time_volume_l: f32,
    pub last_reset_at: Timestamp,
    pub last_full_reset_at: Timestamp,
}

/// Result of a remaining-life projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifeProjection {
    /// Volume counted against the cartridge's capacity.
    pub used_volume_l: f32,
    pub remaining_volume_l: f32,
    pub remaining_days: u32,
    pub days_since_changed: u32,
    /// `used_volume_l` came from [`estimate_idle_usage`], not the sensor.
    pub estimated: bool,
}

/// Usage imputed for a cartridge that has seen no measured throughput.
///
/// Assumes the cartridge is consumed evenly over its rated life:
/// `days * max_volume / max_days`.  This is an approximation standing in
/// for missing history, not a measurement.  Returns `None` when there is
/// nothing to impute (no elapsed days, or a zero-day rating).
pub fn estimate_idle_usage(limit: &LifespanLimit, days_since_changed: u32) -> Option<f32> {
    if days_since_changed == 0 || limit.max_days == 0 {
        return None;
    }
    let daily = limit.max_volume_l / limit.max_days as f32;
    Some(days_since_changed as f32 * daily)
}

// ───────────────────────────────────────────────────────────────
// FilterLedger
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterLedger {
    records: [FilterRecord; 3],
    aggregate: AggregateState,
}

impl FilterLedger {
    /// Zero-initialised ledger (first boot).
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted state.
    pub fn from_parts(records: [FilterRecord; 3], aggregate: AggregateState) -> Self {
        Self { records, aggregate }
    }

    pub fn record(&self, id: FilterId) -> &FilterRecord {
        &self.records[id.index()]
    }

    pub fn records(&self) -> &[FilterRecord; 3] {
        &self.records
    }

    pub fn aggregate(&self) -> &AggregateState {
        &self.aggregate
    }

    /// Add an integrated volume delta and re-derive every record's
    /// processed volume.  The caller guarantees `delta_l` is finite.
    pub fn add_volume(&mut self, delta_l: f32) {
        self.aggregate.all_time_volume_l += delta_l;
        self.recompute_processed(self.aggregate.all_time_volume_l);
    }

    /// `processed = all_time - initial` for each record.  Not clamped.
    pub fn recompute_processed(&mut self, all_time_volume_l: f32) {
        for record in &mut self.records {
            record.processed_volume_l = all_time_volume_l - record.initial_volume_l;
        }
    }

    /// Project remaining volume and days for one cartridge and store the
    /// result on its record.
    ///
    /// With `estimate_idle` set, a cartridge with zero measured throughput
    /// but at least one elapsed day is charged [`estimate_idle_usage`]
    /// instead.  The estimate only feeds the projection; the measured
    /// `processed_volume_l` is left untouched.
    pub fn project_remaining(
        &mut self,
        id: FilterId,
        limit: &LifespanLimit,
        now: Timestamp,
        estimate_idle: bool,
    ) -> LifeProjection {
        let record = &mut self.records[id.index()];
        let days = record.last_changed_at.days_until(now);

        let idle = record.processed_volume_l.abs() < f32::EPSILON;
        let estimate = if estimate_idle && idle {
            estimate_idle_usage(limit, days)
        } else {
            None
        };
        let used = estimate.unwrap_or(record.processed_volume_l);

        // f32::max returns the other operand for NaN, so this is never negative.
        let remaining_volume = (limit.max_volume_l - used).max(0.0);
        let remaining_days = limit.max_days.saturating_sub(days);

        record.remaining_volume_l = remaining_volume;
        record.remaining_days = remaining_days;

        LifeProjection {
            used_volume_l: used,
            remaining_volume_l: remaining_volume,
            remaining_days,
            days_since_changed: days,
            estimated: estimate.is_some(),
        }
    }

    /// Project every cartridge, in [`FilterId::ALL`] order.
    pub fn project_all(
        &mut self,
        limits: &FilterLimits,
        now: Timestamp,
        estimate_idle: bool,
    ) -> [LifeProjection; 3] {
        FilterId::ALL.map(|id| self.project_remaining(id, limits.get(id), now, estimate_idle))
    }

    /// Rebaseline one cartridge so its future usage is measured from zero.
    ///
    /// `baseline_volume_l` is normally the current lifetime volume.
    pub fn reset_filter(&mut self, id: FilterId, at: Timestamp, baseline_volume_l: f32) {
        let record = &mut self.records[id.index()];
        record.initial_volume_l = baseline_volume_l;
        record.processed_volume_l = 0.0;
        record.last_changed_at = at;
    }

    /// Zero the lifetime aggregate and rebaseline every cartridge to it.
    pub fn reset_all(&mut self, at: Timestamp) {
        for id in FilterId::ALL {
            self.reset_filter(id, at, 0.0);
        }
        self.aggregate.all_time_volume_l = 0.0;
        self.aggregate.last_reset_at = at;
        self.aggregate.last_full_reset_at = at;
    }
}
