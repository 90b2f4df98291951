//! Wall-clock timestamps.
//!
//! The ledger stores cartridge-change and reset times as whole seconds
//! since the Unix epoch (UTC).  The human-readable `YYYY-MM-DD HH:MM:SS`
//! form only exists at the edges: when parsing a reset command's `date`
//! field, when rendering status/publish payloads, and in the fixed-width
//! text slot of the durable layout.

use core::fmt::{self, Write};

use chrono::{DateTime, NaiveDateTime, Utc};

/// `strftime`-style pattern shared by commands, payloads and storage.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width of the rendered text slot, including the trailing NUL the
/// durable layout reserves.
pub const TIMESTAMP_TEXT_LEN: usize = 20;

pub const SECS_PER_DAY: u32 = 86_400;

/// Rendered timestamp (`YYYY-MM-DD HH:MM:SS`, 19 bytes).
pub type TimestampText = heapless::String<TIMESTAMP_TEXT_LEN>;

/// Seconds since 1970-01-01 00:00:00 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u32);

impl Timestamp {
    pub const EPOCH: Self = Self(0);

    pub const fn from_epoch_secs(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn epoch_secs(self) -> u32 {
        self.0
    }

    /// Parse a `YYYY-MM-DD HH:MM:SS` string (interpreted as UTC).
    pub fn parse(text: &str) -> Result<Self, TimestampError> {
        let naive = NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
            .map_err(|_| TimestampError::Malformed)?;
        u32::try_from(naive.and_utc().timestamp())
            .map(Self)
            .map_err(|_| TimestampError::OutOfRange)
    }

    /// Render as `YYYY-MM-DD HH:MM:SS`.
    pub fn format(self) -> TimestampText {
        let mut out = TimestampText::new();
        if let Some(dt) = DateTime::<Utc>::from_timestamp(i64::from(self.0), 0) {
            // Every u32 second count renders to exactly 19 bytes.
            let _ = write!(out, "{}", dt.format(TIMESTAMP_FORMAT));
        }
        out
    }

    /// Whole days elapsed from `self` until `now`.
    ///
    /// A `now` earlier than `self` (clock not yet synced, or a reset date
    /// in the future) yields 0 rather than wrapping.
    pub fn days_until(self, now: Timestamp) -> u32 {
        now.0.saturating_sub(self.0) / SECS_PER_DAY
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format().as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampError {
    /// Text does not match `YYYY-MM-DD HH:MM:SS`.
    Malformed,
    /// Date lies before 1970 or after 2106.
    OutOfRange,
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "expected YYYY-MM-DD HH:MM:SS"),
            Self::OutOfRange => write!(f, "date outside 1970-01-01..2106-02-07"),
        }
    }
}
