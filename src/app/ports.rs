//! Port traits: what [`AppService`](super::service::AppService) needs from
//! the outside world.
//!
//! ```text
//!   FlowSensor ─┐                     ┌─▶ PublishPort (MQTT)
//!   Clock ──────┼─▶  AppService  ─────┼─▶ StoragePort (NVS)
//!               │                     └─▶ EventSink   (log)
//! ```
//!
//! The service is generic over every port, so host tests drive it with
//! in-memory doubles and the firmware with ESP-IDF adapters.

use core::fmt;

use crate::config::SystemConfig;
use crate::sensors::flow::PulseSnapshot;

use super::events::AppEvent;
use super::timestamp::Timestamp;

/// Read-and-clear access to the pulse counter.
pub trait PulseSource {
    /// Take every pulse counted since the previous call, as one atomic
    /// step against the interrupt handler.
    fn take_pulses(&mut self) -> PulseSnapshot;
}

pub trait ClockPort {
    /// Milliseconds since boot, wrapping.
    fn monotonic_ms(&self) -> u32;

    /// Wall-clock time, or `None` until network time has been set.
    fn wall_clock(&self) -> Option<Timestamp>;
}

pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

/// Broker link.  One call to [`publish`](Self::publish) is one attempt;
/// [`publish_with_retry`](super::publish::publish_with_retry) owns retries.
pub trait PublishPort {
    fn is_connected(&self) -> bool;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// Persistent [`SystemConfig`].
pub trait ConfigPort {
    /// [`ConfigError::NotFound`] on first boot; the caller picks defaults.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Range-check and persist.  Out-of-range values are rejected with
    /// [`ConfigError::ValidationFailed`], never clamped.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

/// Namespaced blob storage.  A write replaces the whole value or leaves
/// the old one; nothing spans two writes.
pub trait StoragePort {
    /// Copy the value into `buf`, returning the byte count.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Nothing stored yet.
    NotFound,
    /// Stored bytes do not decode.
    Corrupted,
    /// Names the offending field.
    ValidationFailed(&'static str),
    StorageFull,
    IoError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// No broker session.
    NotConnected,
    /// The client refused or failed to enqueue the message.
    Rejected,
    /// Payload exceeds the transport's message size.
    TooLarge,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("no stored config"),
            Self::Corrupted => f.write_str("stored config undecodable"),
            Self::ValidationFailed(why) => write!(f, "invalid config: {}", why),
            Self::StorageFull => f.write_str("config storage full"),
            Self::IoError => f.write_str("config storage I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("key not found"),
            Self::Full => f.write_str("storage full"),
            Self::IoError => f.write_str("storage I/O error"),
        }
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => f.write_str("broker not connected"),
            Self::Rejected => f.write_str("publish rejected"),
            Self::TooLarge => f.write_str("payload too large"),
        }
    }
}
