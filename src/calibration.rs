//! Flow-sensor calibration profiles.
//!
//! The sensor catalogue is a JSON document shipped on the data partition:
//!
//! ```json
//! { "sensors": [ { "name": "YF-G1", "calibrationFactor": 288.0, "kFactor": 1.0 } ] }
//! ```
//!
//! At boot the entry matching the configured sensor model becomes the
//! active [`CalibrationProfile`].  It is read-only for the rest of the
//! process; a missing or invalid profile is fatal.

use core::fmt;

use log::info;
use serde::Deserialize;

/// Conversion constants for the fitted flow sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationProfile {
    pub sensor_name: heapless::String<32>,
    /// Pulses emitted per litre of flow.
    pub pulses_per_litre: f32,
    /// Linear correction applied to the integrated volume; also the
    /// pulse-frequency divisor for the instantaneous flow rate.
    pub k_factor: f32,
}

impl CalibrationProfile {
    /// Build a profile, rejecting zero or non-finite factors.
    pub fn new(
        sensor_name: &str,
        pulses_per_litre: f32,
        k_factor: f32,
    ) -> Result<Self, CalibrationError> {
        if !pulses_per_litre.is_finite() || pulses_per_litre == 0.0 {
            return Err(CalibrationError::InvalidFactor(
                "calibrationFactor must be finite and non-zero",
            ));
        }
        if !k_factor.is_finite() || k_factor == 0.0 {
            return Err(CalibrationError::InvalidFactor("kFactor must be finite and non-zero"));
        }
        let mut name = heapless::String::new();
        name.push_str(sensor_name)
            .map_err(|_| CalibrationError::InvalidFactor("sensor name longer than 32 bytes"))?;
        Ok(Self {
            sensor_name: name,
            pulses_per_litre,
            k_factor,
        })
    }
}

#[derive(Deserialize)]
struct SensorCatalog {
    sensors: Vec<SensorEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SensorEntry {
    name: String,
    calibration_factor: f32,
    k_factor: f32,
}

/// Select `model` from a JSON sensor catalogue.
pub fn load_profile(
    catalog_json: &[u8],
    model: &str,
) -> Result<CalibrationProfile, CalibrationError> {
    let catalog: SensorCatalog =
        serde_json::from_slice(catalog_json).map_err(|_| CalibrationError::Malformed)?;

    let entry = catalog
        .sensors
        .iter()
        .find(|s| s.name == model)
        .ok_or(CalibrationError::SensorNotFound)?;

    let profile = CalibrationProfile::new(&entry.name, entry.calibration_factor, entry.k_factor)?;
    info!(
        "Calibration: '{}' pulses/L={} k={}",
        profile.sensor_name, profile.pulses_per_litre, profile.k_factor
    );
    Ok(profile)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// Catalogue file could not be read.
    Unreadable,
    /// Catalogue is not valid JSON or lacks the `sensors` array.
    Malformed,
    /// No entry matches the configured sensor model.
    SensorNotFound,
    /// The entry exists but cannot be used.
    InvalidFactor(&'static str),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable => write!(f, "sensor catalogue unreadable"),
            Self::Malformed => write!(f, "sensor catalogue malformed"),
            Self::SensorNotFound => write!(f, "sensor model not in catalogue"),
            Self::InvalidFactor(msg) => write!(f, "invalid calibration: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIPPED: &str = include_str!("../data/config.json");

    #[test]
    fn selects_shipped_default_model() {
        let p = load_profile(SHIPPED.as_bytes(), "YF-G1").unwrap();
        assert_eq!(p.sensor_name.as_str(), "YF-G1");
        assert!((p.pulses_per_litre - 288.0).abs() < f32::EPSILON);
        assert!((p.k_factor - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_model_is_not_found() {
        assert_eq!(
            load_profile(SHIPPED.as_bytes(), "NOPE-1"),
            Err(CalibrationError::SensorNotFound)
        );
    }

    #[test]
    fn zero_factor_is_a_configuration_error() {
        let json = br#"{"sensors":[{"name":"Z","calibrationFactor":0.0,"kFactor":1.0}]}"#;
        assert!(matches!(
            load_profile(json, "Z"),
            Err(CalibrationError::InvalidFactor(_))
        ));
        let json = br#"{"sensors":[{"name":"Z","calibrationFactor":450.0,"kFactor":0}]}"#;
        assert!(matches!(
            load_profile(json, "Z"),
            Err(CalibrationError::InvalidFactor(_))
        ));
    }

    #[test]
    fn malformed_catalogue() {
        assert_eq!(load_profile(b"not json", "YF-G1"), Err(CalibrationError::Malformed));
        assert_eq!(load_profile(br#"{"sensor":[]}"#, "YF-G1"), Err(CalibrationError::Malformed));
        assert_eq!(
            load_profile(br#"{"sensors":[{"name":"YF-G1"}]}"#, "YF-G1"),
            Err(CalibrationError::Malformed)
        );
    }

    #[test]
    fn first_matching_entry_wins() {
        let json = br#"{"sensors":[
            {"name":"A","calibrationFactor":100.0,"kFactor":1.0},
            {"name":"A","calibrationFactor":200.0,"kFactor":1.0}
        ]}"#;
        let p = load_profile(json, "A").unwrap();
        assert!((p.pulses_per_litre - 100.0).abs() < f32::EPSILON);
    }
}
