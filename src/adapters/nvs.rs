//! NVS adapter: [`StoragePort`] for the ledger region and [`ConfigPort`]
//! for the postcard-encoded [`SystemConfig`].
//!
//! Both ports sit on one small blob backend.  On target that is the
//! ESP-IDF NVS C API; on host it is a map keyed `namespace::key`.  Each
//! blob write is a `nvs_set_blob` followed by `nvs_commit`, so a value is
//! replaced whole or not at all.

use log::{info, warn};

use crate::app::ledger::FilterId;
use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;

pub const CONFIG_NAMESPACE: &str = "filtermon";
pub const CONFIG_KEY: &str = "syscfg";

/// Upper bound for the encoded config.  Postcard output for the default
/// config is well under half of this.
const CONFIG_BLOB_MAX: usize = 256;

pub struct NvsAdapter {
    backend: Backend,
}

impl NvsAdapter {
    /// Bring up the NVS partition.  A partition with no free pages or
    /// written by a newer IDF is erased and initialised again.
    pub fn new() -> Result<Self, ConfigError> {
        let backend = Backend::init().map_err(|code| {
            warn!("NVS: flash init failed ({})", code);
            ConfigError::IoError
        })?;
        Ok(Self { backend })
    }
}

/// Range checks applied before any config reaches flash.
pub fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    use ConfigError::ValidationFailed as Invalid;

    if cfg.sensor_model.is_empty() {
        return Err(Invalid("sensor_model is empty"));
    }
    if !cfg.catalog_path.starts_with('/') {
        return Err(Invalid("catalog_path is not absolute"));
    }
    if !(100..=60_000).contains(&cfg.tick_interval_ms) {
        return Err(Invalid("tick_interval_ms outside 100..=60000"));
    }
    if cfg.no_flow_timeout_ms < cfg.tick_interval_ms {
        return Err(Invalid("no_flow_timeout_ms shorter than one tick"));
    }
    for id in FilterId::ALL {
        let limit = cfg.limits.get(id);
        if !limit.max_volume_l.is_finite() || limit.max_volume_l <= 0.0 {
            return Err(Invalid("max_volume_l not a positive finite number"));
        }
        if !(1..=3650).contains(&limit.max_days) {
            return Err(Invalid("max_days outside 1..=3650"));
        }
    }
    if cfg.topic_base.is_empty() || cfg.topic_base.contains(['#', '+']) {
        return Err(Invalid("topic_base empty or contains a wildcard"));
    }
    if !(1..=10).contains(&cfg.publish_retry_count) {
        return Err(Invalid("publish_retry_count outside 1..=10"));
    }
    if cfg.publish_retry_backoff_ms > 10_000 {
        return Err(Invalid("publish_retry_backoff_ms above 10000"));
    }
    if !(1_000..=300_000).contains(&cfg.mqtt_reconnect_interval_ms) {
        return Err(Invalid("mqtt_reconnect_interval_ms outside 1000..=300000"));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; CONFIG_BLOB_MAX];
        let len = self
            .backend
            .get(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf)
            .map_err(|e| match e {
                StorageError::NotFound => ConfigError::NotFound,
                StorageError::Full | StorageError::IoError => ConfigError::IoError,
            })?;
        let cfg: SystemConfig =
            postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
        validate_config(&cfg)?;
        info!("NVS: config loaded ({} bytes)", len);
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let mut buf = [0u8; CONFIG_BLOB_MAX];
        let bytes = postcard::to_slice(config, &mut buf).map_err(|_| ConfigError::StorageFull)?;
        self.backend
            .set(CONFIG_NAMESPACE, CONFIG_KEY, bytes)
            .map_err(|e| match e {
                StorageError::Full => ConfigError::StorageFull,
                StorageError::NotFound | StorageError::IoError => ConfigError::IoError,
            })?;
        info!("NVS: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.backend.get(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.backend.set(namespace, key, data)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.backend.contains(namespace, key)
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
struct Backend;

#[cfg(target_os = "espidf")]
impl Backend {
    fn init() -> Result<Self, i32> {
        use esp_idf_svc::sys::*;

        // SAFETY: called once from the main task before any other NVS use.
        let mut ret = unsafe { nvs_flash_init() };
        if ret == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t
            || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t
        {
            warn!("NVS: partition unusable ({}), erasing", ret);
            esp_ok(unsafe { nvs_flash_erase() })?;
            ret = unsafe { nvs_flash_init() };
        }
        esp_ok(ret)?;
        info!("NVS: flash ready");
        Ok(Self)
    }

    /// Run `f` with an open handle on `namespace`, closing it afterwards.
    fn with_handle<T>(
        namespace: &str,
        writable: bool,
        f: impl FnOnce(esp_idf_svc::sys::nvs_handle_t) -> Result<T, i32>,
    ) -> Result<T, i32> {
        use esp_idf_svc::sys::*;

        let ns = c_name(namespace);
        let mode = if writable {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        // SAFETY: `ns` is NUL-terminated and outlives the call.
        esp_ok(unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) })?;
        let result = f(handle);
        // SAFETY: `handle` was opened above and is not used after this.
        unsafe { nvs_close(handle) };
        result
    }

    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        use esp_idf_svc::sys::*;

        let key = c_name(key);
        Self::with_handle(namespace, false, |h| {
            let mut len = buf.len();
            // SAFETY: `len` holds the capacity of `buf`; NVS writes at most that.
            esp_ok(unsafe {
                nvs_get_blob(h, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut len)
            })?;
            Ok(len)
        })
        .map_err(storage_error)
    }

    fn set(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        use esp_idf_svc::sys::*;

        let key = c_name(key);
        Self::with_handle(namespace, true, |h| {
            // SAFETY: `data` is a valid slice for the duration of the call.
            esp_ok(unsafe {
                nvs_set_blob(h, key.as_ptr().cast(), data.as_ptr().cast(), data.len())
            })?;
            esp_ok(unsafe { nvs_commit(h) })
        })
        .map_err(storage_error)
    }

    fn contains(&self, namespace: &str, key: &str) -> bool {
        use esp_idf_svc::sys::*;

        let key = c_name(key);
        Self::with_handle(namespace, false, |h| {
            esp_ok(unsafe { nvs_find_key(h, key.as_ptr().cast(), core::ptr::null_mut()) })
        })
        .is_ok()
    }
}

#[cfg(target_os = "espidf")]
fn esp_ok(ret: esp_idf_svc::sys::esp_err_t) -> Result<(), i32> {
    if ret == esp_idf_svc::sys::ESP_OK as esp_idf_svc::sys::esp_err_t {
        Ok(())
    } else {
        Err(ret)
    }
}

#[cfg(target_os = "espidf")]
fn storage_error(code: i32) -> StorageError {
    use esp_idf_svc::sys::*;

    if code == ESP_ERR_NVS_NOT_FOUND as esp_err_t {
        StorageError::NotFound
    } else if code == ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t {
        StorageError::Full
    } else {
        warn!("NVS: error {}", code);
        StorageError::IoError
    }
}

/// NVS names are at most 15 bytes plus the terminator.
#[cfg(target_os = "espidf")]
fn c_name(name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let n = name.len().min(15);
    out[..n].copy_from_slice(&name.as_bytes()[..n]);
    out
}

// ───────────────────────────────────────────────────────────────
// Host backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
struct Backend {
    blobs: std::cell::RefCell<std::collections::HashMap<String, Vec<u8>>>,
}

#[cfg(not(target_os = "espidf"))]
impl Backend {
    fn init() -> Result<Self, i32> {
        info!("NVS: in-memory simulation");
        Ok(Self {
            blobs: std::cell::RefCell::default(),
        })
    }

    fn key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }

    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let blobs = self.blobs.borrow();
        let data = blobs.get(&Self::key(namespace, key)).ok_or(StorageError::NotFound)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn set(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.blobs.borrow_mut().insert(Self::key(namespace, key), data.to_vec());
        Ok(())
    }

    fn contains(&self, namespace: &str, key: &str) -> bool {
        self.blobs.borrow().contains_key(&Self::key(namespace, key))
    }
}
