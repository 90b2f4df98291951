//! Unified error type for the FilterMon firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! top-level boot and loop error handling uniform.  All variants are
//! `Copy` so they can be passed around without allocation.

use core::fmt;

use crate::app::ports::{ConfigError, StorageError};
use crate::calibration::CalibrationError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Stored configuration could not be loaded or failed validation.
    Config(ConfigError),
    /// Sensor catalogue missing, malformed, or without the configured model.
    Calibration(CalibrationError),
    /// Durable ledger region could not be read or written.
    Storage(StorageError),
    /// Peripheral or service initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Calibration(e) => write!(f, "calibration: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<CalibrationError> for Error {
    fn from(e: CalibrationError) -> Self {
        Self::Calibration(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
