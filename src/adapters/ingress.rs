//! Bounded command ingress shared by the HTTP and MQTT tasks.
//!
//! Network handlers never touch the ledger.  They copy the raw request
//! body into an [`IngressFrame`] and `try_send` it here; the main loop
//! drains frames in arrival order and hands them to
//! `AppService::handle_command`.  A full channel drops the frame.
//!
//! Several ESP-IDF tasks produce, so this is an `embassy_sync` MPMC
//! channel rather than the SPSC ring in [`crate::events`].

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::commands::{CommandSource, MAX_COMMAND_LEN};

/// Frames that can wait for the main loop.
pub const INGRESS_DEPTH: usize = 8;

/// One undecoded command body and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressFrame {
    pub source: CommandSource,
    pub body: heapless::Vec<u8, MAX_COMMAND_LEN>,
}

impl IngressFrame {
    /// `None` when the body exceeds [`MAX_COMMAND_LEN`].
    pub fn new(source: CommandSource, body: &[u8]) -> Option<Self> {
        let body = heapless::Vec::from_slice(body).ok()?;
        Some(Self { source, body })
    }
}

pub type IngressChannel = Channel<CriticalSectionRawMutex, IngressFrame, INGRESS_DEPTH>;

/// The channel the firmware's HTTP and MQTT handlers feed.
pub static INGRESS: IngressChannel = Channel::new();

/// Queue a command body on [`INGRESS`].  Never blocks.
pub fn submit(source: CommandSource, body: &[u8]) -> bool {
    submit_to(&INGRESS, source, body)
}

/// Queue a command body on `channel`.  Returns `false` when the body is
/// oversized or the channel is full; the frame is dropped either way.
pub fn submit_to(channel: &IngressChannel, source: CommandSource, body: &[u8]) -> bool {
    let Some(frame) = IngressFrame::new(source, body) else {
        warn!(
            "INGRESS | {} body of {} bytes exceeds {}, dropped",
            source.as_str(),
            body.len(),
            MAX_COMMAND_LEN
        );
        return false;
    };
    if channel.try_send(frame).is_err() {
        warn!("INGRESS | channel full, {} command dropped", source.as_str());
        return false;
    }
    true
}

/// Hand every pending frame on [`INGRESS`] to `handler`, oldest first.
pub fn drain(handler: impl FnMut(IngressFrame)) -> usize {
    drain_from(&INGRESS, handler)
}

pub fn drain_from(channel: &IngressChannel, mut handler: impl FnMut(IngressFrame)) -> usize {
    let mut n = 0;
    while let Ok(frame) = channel.try_receive() {
        handler(frame);
        n += 1;
    }
    n
}
