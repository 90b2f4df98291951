//! Device identity from the factory (eFuse) MAC.
//!
//! The id names the MQTT topic tree (`home/<id>/...`) and doubles as the
//! MQTT client id; the hostname is what DHCP sees.

use core::fmt::Write;

pub type MacAddress = [u8; 6];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Whole MAC as 12 uppercase hex digits, no separators.
    pub id: heapless::String<12>,
    /// `filtermon-` plus the NIC-specific half of the MAC in lowercase.
    pub hostname: heapless::String<16>,
}

impl DeviceIdentity {
    pub fn from_mac(mac: &MacAddress) -> Self {
        let mut id = heapless::String::new();
        let mut hostname = heapless::String::new();
        // Both buffers are sized exactly for their output.
        for b in mac {
            let _ = write!(id, "{b:02X}");
        }
        let _ = write!(hostname, "filtermon-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
        Self { id, hostname }
    }

    pub fn read() -> Self {
        Self::from_mac(&read_mac())
    }
}

#[cfg(target_os = "espidf")]
fn read_mac() -> MacAddress {
    let mut mac = [0u8; 6];
    // SAFETY: `mac` is a 6-byte out-buffer as the call requires.
    let ret = unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    if ret != esp_idf_svc::sys::ESP_OK as esp_idf_svc::sys::esp_err_t {
        log::warn!("eFuse MAC unreadable ({}), id will be all zeros", ret);
    }
    mac
}

#[cfg(not(target_os = "espidf"))]
fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}
