//! Byte-exact durable layout.
//!
//! All integers and floats are little-endian, no padding.
//!
//! ```text
//! offset  size  field
//! ──────  ────  ─────────────────────────────
//!      0     1  initialized flag (0x01)
//!      1     1  schema version
//!      2    40  FilterRecord  carbon
//!     42    40  FilterRecord  kdf/gac
//!     82    40  FilterRecord  ceramic
//!    122    28  AggregateState
//!    150        end
//!
//! FilterRecord (40)                 AggregateState (28)
//!   0  f32      initial_volume_l      0  f32      all_time_volume_l
//!   4  f32      processed_volume_l    4  char[20] last_reset (text)
//!   8  char[20] last_changed (text)  24  u32      last_full_reset_at
//!  28  u32      last_changed_at
//!  32  f32      remaining_volume_l
//!  36  u32      remaining_days
//! ```
//!
//! Text slots hold the `YYYY-MM-DD HH:MM:SS` rendering, NUL padded.  For
//! a record the `u32` is authoritative and the text is informational.
//! The aggregate has no numeric slot for its last reset, so that one is
//! recovered from the text.

use crate::app::ledger::{AggregateState, FilterId, FilterLedger, FilterRecord};
use crate::app::timestamp::{TIMESTAMP_TEXT_LEN, Timestamp};

/// Written to byte 0 once the region has been initialised.
pub const INITIALIZED_FLAG: u8 = 0x01;

/// Bump on any change to the offsets or field sizes below.
pub const SCHEMA_VERSION: u8 = 1;

pub const HEADER_LEN: usize = 2;
pub const RECORD_LEN: usize = 40;
pub const AGGREGATE_LEN: usize = 28;
pub const AGGREGATE_OFFSET: usize = HEADER_LEN + 3 * RECORD_LEN;
pub const REGION_LEN: usize = AGGREGATE_OFFSET + AGGREGATE_LEN;

const _: () = assert!(REGION_LEN == 150);

pub const fn record_offset(id: FilterId) -> usize {
    HEADER_LEN + id.index() * RECORD_LEN
}

/// What the two header bytes say about the rest of the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    /// Flag unset (first boot or erased).
    Uninitialized,
    /// Flag set but written by a different layout.
    SchemaMismatch { found: u8 },
    Valid,
}

pub fn header_state(region: &[u8]) -> HeaderState {
    match region {
        [INITIALIZED_FLAG, SCHEMA_VERSION, ..] => HeaderState::Valid,
        [INITIALIZED_FLAG, found, ..] => HeaderState::SchemaMismatch { found: *found },
        _ => HeaderState::Uninitialized,
    }
}

pub fn write_header(region: &mut [u8; REGION_LEN]) {
    region[0] = INITIALIZED_FLAG;
    region[1] = SCHEMA_VERSION;
}

// ── Field helpers ─────────────────────────────────────────────

fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_f32(buf: &mut [u8], at: usize, v: f32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_text(buf: &mut [u8], at: usize, ts: Timestamp) {
    let slot = &mut buf[at..at + TIMESTAMP_TEXT_LEN];
    slot.fill(0);
    let text = ts.format();
    let n = text.len().min(TIMESTAMP_TEXT_LEN - 1);
    slot[..n].copy_from_slice(&text.as_bytes()[..n]);
}

fn get_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

/// Non-finite values (erased flash reads as NaN) decode as zero.
fn get_f32(buf: &[u8], at: usize) -> f32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    let v = f32::from_le_bytes(b);
    if v.is_finite() { v } else { 0.0 }
}

fn get_text(buf: &[u8], at: usize) -> Option<Timestamp> {
    let slot = &buf[at..at + TIMESTAMP_TEXT_LEN];
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    let text = core::str::from_utf8(&slot[..end]).ok()?;
    Timestamp::parse(text).ok()
}

// ── Records ───────────────────────────────────────────────────

pub fn encode_record(record: &FilterRecord, out: &mut [u8; RECORD_LEN]) {
    put_f32(out, 0, record.initial_volume_l);
    put_f32(out, 4, record.processed_volume_l);
    put_text(out, 8, record.last_changed_at);
    put_u32(out, 28, record.last_changed_at.epoch_secs());
    put_f32(out, 32, record.remaining_volume_l);
    put_u32(out, 36, record.remaining_days);
}

pub fn decode_record(buf: &[u8; RECORD_LEN]) -> FilterRecord {
    FilterRecord {
        initial_volume_l: get_f32(buf, 0),
        processed_volume_l: get_f32(buf, 4),
        last_changed_at: Timestamp::from_epoch_secs(get_u32(buf, 28)),
        remaining_volume_l: get_f32(buf, 32),
        remaining_days: get_u32(buf, 36),
    }
}

pub fn encode_aggregate(aggregate: &AggregateState, out: &mut [u8; AGGREGATE_LEN]) {
    put_f32(out, 0, aggregate.all_time_volume_l);
    put_text(out, 4, aggregate.last_reset_at);
    put_u32(out, 24, aggregate.last_full_reset_at.epoch_secs());
}

/// An unreadable `last_reset` text falls back to the full-reset time.
pub fn decode_aggregate(buf: &[u8; AGGREGATE_LEN]) -> AggregateState {
    let last_full_reset_at = Timestamp::from_epoch_secs(get_u32(buf, 24));
    AggregateState {
        all_time_volume_l: get_f32(buf, 0),
        last_reset_at: get_text(buf, 4).unwrap_or(last_full_reset_at),
        last_full_reset_at,
    }
}

// ── Whole region ──────────────────────────────────────────────

/// Patch one record in place.
pub fn store_record(region: &mut [u8; REGION_LEN], id: FilterId, record: &FilterRecord) {
    let mut slot = [0u8; RECORD_LEN];
    encode_record(record, &mut slot);
    let at = record_offset(id);
    region[at..at + RECORD_LEN].copy_from_slice(&slot);
}

/// Patch the aggregate in place.
pub fn store_aggregate(region: &mut [u8; REGION_LEN], aggregate: &AggregateState) {
    let mut slot = [0u8; AGGREGATE_LEN];
    encode_aggregate(aggregate, &mut slot);
    region[AGGREGATE_OFFSET..REGION_LEN].copy_from_slice(&slot);
}

/// Encode a full region, header included.
pub fn encode_region(ledger: &FilterLedger) -> [u8; REGION_LEN] {
    let mut region = [0u8; REGION_LEN];
    write_header(&mut region);
    for id in FilterId::ALL {
        store_record(&mut region, id, ledger.record(id));
    }
    store_aggregate(&mut region, ledger.aggregate());
    region
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Fewer than [`REGION_LEN`] bytes.
    Truncated { len: usize },
    /// Header is not [`HeaderState::Valid`].
    BadHeader(HeaderState),
}

impl core::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated { len } => {
                write!(f, "region truncated ({} of {} bytes)", len, REGION_LEN)
            }
            Self::BadHeader(HeaderState::Uninitialized) => write!(f, "region not initialised"),
            Self::BadHeader(HeaderState::SchemaMismatch { found }) => {
                write!(f, "schema version {} (expected {})", found, SCHEMA_VERSION)
            }
            Self::BadHeader(HeaderState::Valid) => write!(f, "header valid"),
        }
    }
}

/// Decode a full region.  Bytes past [`REGION_LEN`] are ignored.
pub fn decode_region(region: &[u8]) -> Result<FilterLedger, LayoutError> {
    let Some(region) = region.get(..REGION_LEN) else {
        return Err(LayoutError::Truncated { len: region.len() });
    };
    match header_state(region) {
        HeaderState::Valid => {}
        other => return Err(LayoutError::BadHeader(other)),
    }

    let records = FilterId::ALL.map(|id| {
        let at = record_offset(id);
        let mut slot = [0u8; RECORD_LEN];
        slot.copy_from_slice(&region[at..at + RECORD_LEN]);
        decode_record(&slot)
    });
    let mut agg = [0u8; AGGREGATE_LEN];
    agg.copy_from_slice(&region[AGGREGATE_OFFSET..REGION_LEN]);

    Ok(FilterLedger::from_parts(records, decode_aggregate(&agg)))
}
