//! Reset commands: decoding and application.
//!
//! Two ingress channels carry the same request with the same semantics:
//!
//! - the web reset form (`application/x-www-form-urlencoded`,
//!   fields `filter` and `date`), and
//! - the remote command topic (JSON):
//!   `{ "command": "full_reset"?, "filter": "carbon"|"kdfgac"|"ceramic"?, "date": "..."? }`.
//!
//! Both decode into a [`ResetRequest`].  [`CommandProcessor`] applies it
//! to the [`FilterLedger`]; persisting the touched records is the
//! caller's job (see [`ResetOutcome`]).

use core::fmt;

use log::{debug, warn};
use serde::Deserialize;

use super::ledger::{FilterId, FilterLedger};
use super::timestamp::Timestamp;

/// Identifier accepted for a full reset on the `filter` field.
pub const FULL_RESET_FILTER: &str = "full";
/// Value of the message `command` field requesting a full reset.
pub const FULL_RESET_COMMAND: &str = "full_reset";

/// Maximum accepted command body (form or JSON).
pub const MAX_COMMAND_LEN: usize = 256;

// ───────────────────────────────────────────────────────────────
// Request types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    Filter(FilterId),
    Full,
}

/// Where a command came from.  Only used for logging; both sources
/// share one decoder output and one processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    WebForm,
    Message,
}

impl CommandSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebForm => "form",
            Self::Message => "message",
        }
    }
}

/// A decoded reset request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResetRequest {
    /// `None` for an absent or unrecognised filter id.
    pub target: Option<ResetTarget>,
    /// Raw `date` field, parsed later against the clock.
    pub date: Option<String>,
}

impl ResetRequest {
    pub fn filter(id: FilterId) -> Self {
        Self { target: Some(ResetTarget::Filter(id)), date: None }
    }

    pub fn full() -> Self {
        Self { target: Some(ResetTarget::Full), date: None }
    }

    pub fn with_date(mut self, date: &str) -> Self {
        self.date = Some(date.to_owned());
        self
    }
}

fn target_from_filter(name: &str) -> Option<ResetTarget> {
    if name == FULL_RESET_FILTER {
        return Some(ResetTarget::Full);
    }
    FilterId::from_wire(name).map(ResetTarget::Filter)
}

// ───────────────────────────────────────────────────────────────
// Decoders
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Body exceeds [`MAX_COMMAND_LEN`].
    TooLong,
    /// Body is not valid UTF-8 / JSON / form encoding.
    Malformed,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong => write!(f, "command body exceeds {} bytes", MAX_COMMAND_LEN),
            Self::Malformed => write!(f, "command body malformed"),
        }
    }
}

#[derive(Deserialize)]
struct CommandMessage {
    command: Option<String>,
    filter: Option<String>,
    date: Option<String>,
}

/// Decode a JSON command message.
///
/// `command == "full_reset"` wins over any `filter`.  Unknown fields are
/// ignored.
pub fn decode_message(payload: &[u8]) -> Result<ResetRequest, CommandError> {
    if payload.len() > MAX_COMMAND_LEN {
        return Err(CommandError::TooLong);
    }
    let msg: CommandMessage =
        serde_json::from_slice(payload).map_err(|_| CommandError::Malformed)?;

    let target = if msg.command.as_deref() == Some(FULL_RESET_COMMAND) {
        Some(ResetTarget::Full)
    } else {
        msg.filter.as_deref().and_then(target_from_filter)
    };

    Ok(ResetRequest { target, date: msg.date })
}

/// Decode an urlencoded reset form body (`filter=carbon&date=...`).
///
/// The first occurrence of each field wins; unknown fields are ignored.
pub fn decode_form(body: &str) -> Result<ResetRequest, CommandError> {
    if body.len() > MAX_COMMAND_LEN {
        return Err(CommandError::TooLong);
    }

    let mut filter: Option<String> = None;
    let mut date: Option<String> = None;

    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let slot = match key {
            "filter" => &mut filter,
            "date" => &mut date,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(form_unescape(value)?);
        }
    }

    Ok(ResetRequest {
        target: filter.as_deref().and_then(target_from_filter),
        date,
    })
}

fn form_unescape(value: &str) -> Result<String, CommandError> {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|_| CommandError::Malformed)
}

// ───────────────────────────────────────────────────────────────
// CommandProcessor
// ───────────────────────────────────────────────────────────────

/// What a reset changed, so the caller knows what to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// One record was rebaselined.
    Filter { id: FilterId, at: Timestamp },
    /// Aggregate and all records were reset.
    Full { at: Timestamp },
    /// No recognised target: nothing changed.
    Ignored,
}

/// Applies reset requests to the ledger.  Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandProcessor;

impl CommandProcessor {
    pub fn new() -> Self {
        Self
    }

    /// The request's `date` if it parses, otherwise `now`.
    pub fn resolve_reset_time(&self, date: Option<&str>, now: Timestamp) -> Timestamp {
        match date {
            Some(text) => match Timestamp::parse(text) {
                Ok(ts) => {
                    debug!("Reset: using supplied date {}", ts);
                    ts
                }
                Err(e) => {
                    warn!("Reset: date {:?} rejected ({}), using current time {}", text, e, now);
                    now
                }
            },
            None => now,
        }
    }

    /// Apply `request` to `ledger`.
    ///
    /// A single-filter reset uses the current lifetime volume as the new
    /// baseline.  An absent or unknown target is a no-op, not an error.
    pub fn apply(
        &self,
        ledger: &mut FilterLedger,
        request: &ResetRequest,
        now: Timestamp,
    ) -> ResetOutcome {
        let Some(target) = request.target else {
            return ResetOutcome::Ignored;
        };
        let at = self.resolve_reset_time(request.date.as_deref(), now);

        match target {
            ResetTarget::Filter(id) => {
                let baseline = ledger.aggregate().all_time_volume_l;
                ledger.reset_filter(id, at, baseline);
                ResetOutcome::Filter { id, at }
            }
            ResetTarget::Full => {
                ledger.reset_all(at);
                ResetOutcome::Full { at }
            }
        }
    }
}
