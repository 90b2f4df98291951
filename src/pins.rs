//! GPIO pin assignments for the FilterMon board.
//!
//! Single source of truth; drivers reference this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Sensors: digital pulse inputs
// ---------------------------------------------------------------------------

/// Hall-effect flow sensor, open-collector pulse output.  Internal pull-up,
/// one falling edge per pulse.
pub const FLOW_SENSOR_GPIO: i32 = 4;
