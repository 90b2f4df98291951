//! Sensor catalogue on the SPIFFS data partition.
//!
//! On target the `storage` SPIFFS partition is mounted at `/spiffs` and
//! the catalogue is read with `std::fs`.  Off target, `/spiffs/<file>`
//! maps to the crate's `data/<file>`, which is what gets flashed.

use log::{error, info};

use crate::calibration::{self, CalibrationError, CalibrationProfile};

pub const SPIFFS_BASE: &str = "/spiffs";

/// Mount the SPIFFS data partition.  Idempotent.
#[cfg(target_os = "espidf")]
pub fn mount() -> crate::error::Result<()> {
    use esp_idf_svc::sys::*;

    let conf = esp_vfs_spiffs_conf_t {
        base_path: c"/spiffs".as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: false,
    };
    // SAFETY: conf and its C strings outlive the call; SPIFFS copies them.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
        error!("catalog: SPIFFS mount failed (rc={})", ret);
        return Err(crate::error::Error::Init("SPIFFS mount failed"));
    }
    info!("catalog: SPIFFS mounted at {}", SPIFFS_BASE);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn mount() -> crate::error::Result<()> {
    info!("catalog(sim): {} served from data/", SPIFFS_BASE);
    Ok(())
}

#[cfg(target_os = "espidf")]
fn resolve(path: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(path)
}

#[cfg(not(target_os = "espidf"))]
fn resolve(path: &str) -> std::path::PathBuf {
    match path.strip_prefix(SPIFFS_BASE) {
        Some(rest) => std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("data")
            .join(rest.trim_start_matches('/')),
        None => std::path::PathBuf::from(path),
    }
}

pub fn read_catalog(path: &str) -> Result<Vec<u8>, CalibrationError> {
    std::fs::read(resolve(path)).map_err(|e| {
        error!("catalog: cannot read {}: {}", path, e);
        CalibrationError::Unreadable
    })
}

/// Read the catalogue at `path` and select `model` from it.
pub fn load_active_profile(path: &str, model: &str) -> crate::error::Result<CalibrationProfile> {
    let raw = read_catalog(path)?;
    Ok(calibration::load_profile(&raw, model)?)
}
