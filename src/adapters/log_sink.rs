//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! Each event renders as one tagged line so the serial log can be
//! grepped by subsystem.

use log::{debug, error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { all_time_volume_l, fresh_store } => {
                info!(
                    "START | all_time={:.2}L | store={}",
                    all_time_volume_l,
                    if *fresh_store { "initialised" } else { "loaded" }
                );
            }
            AppEvent::FlowTick(t) => {
                // Quiet ticks would flood the console at 1 Hz.
                if t.pulses > 0 {
                    info!(
                        "FLOW | pulses={} | +{:.3}L | total={:.2}L | rate={:.2}L/min | flowing={}",
                        t.pulses,
                        t.volume_delta_l,
                        t.all_time_volume_l,
                        t.flow_rate_l_min,
                        t.flow_detected,
                    );
                } else {
                    debug!("FLOW | idle | total={:.2}L", t.all_time_volume_l);
                }
            }
            AppEvent::VolumeDiscarded { pulses } => {
                warn!("FLOW | discarded non-finite volume ({} pulses)", pulses);
            }
            AppEvent::FilterReset { id, at, source } => {
                info!("RESET | {} changed at {} (via {})", id.wire_name(), at, source.as_str());
            }
            AppEvent::FullReset { at, source } => {
                info!("RESET | full reset at {} (via {})", at, source.as_str());
            }
            AppEvent::CommandIgnored { source } => {
                info!("RESET | no recognised target (via {}), ignored", source.as_str());
            }
            AppEvent::PublishDropped { topic, error } => {
                error!("PUBLISH | {} dropped: {}", topic, error);
            }
            AppEvent::PublishSkipped => {
                debug!("PUBLISH | broker offline, skipped");
            }
            AppEvent::StorageFailed(e) => {
                error!("STORE | write failed: {}", e);
            }
        }
    }
}
