//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them (log to serial, count for
//! diagnostics, assert on in tests).

use super::commands::CommandSource;
use super::ledger::FilterId;
use super::ports::{PublishError, StorageError};
use super::timestamp::Timestamp;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has loaded its ledger and is ready.
    Started {
        all_time_volume_l: f32,
        /// The durable region was (re)initialised on this boot.
        fresh_store: bool,
    },

    /// One integration tick completed.
    FlowTick(FlowTelemetry),

    /// A non-finite volume delta was thrown away.
    VolumeDiscarded { pulses: u32 },

    /// One cartridge was rebaselined.
    FilterReset { id: FilterId, at: Timestamp, source: CommandSource },

    /// Aggregate and all cartridges were zeroed.
    FullReset { at: Timestamp, source: CommandSource },

    /// A command decoded but named no known target, or failed to decode.
    CommandIgnored { source: CommandSource },

    /// A message was dropped after the retry budget ran out.
    PublishDropped { topic: String, error: PublishError },

    /// Publishing skipped because the broker link is down.
    PublishSkipped,

    /// A durable write failed; in-memory state is ahead of flash.
    StorageFailed(StorageError),
}

/// Per-tick flow observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowTelemetry {
    pub pulses: u32,
    pub volume_delta_l: f32,
    pub all_time_volume_l: f32,
    pub flow_rate_l_min: f32,
    pub flow_detected: bool,
}
