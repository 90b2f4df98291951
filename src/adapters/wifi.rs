//! WiFi station bring-up and network time sync.
//!
//! The broker link and the HTTP endpoints need the station interface;
//! the wall clock needs SNTP.  Both are started once from `main()` and
//! kept alive by the returned [`NetworkLink`].
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspWifi` wrapped in `BlockingWifi`, plus `EspSntp`.
//! - **all other targets**: simulation stub that is always "up".
//!
//! Credentials are baked in at build time from `FILTERMON_WIFI_SSID` and
//! `FILTERMON_WIFI_PASS`.

use core::fmt;
use log::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

impl std::error::Error for ConnectivityError {}

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut creds = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        creds.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        creds
            .password
            .push_str(password)
            .map_err(|_| ConnectivityError::InvalidPassword)?;
        Ok(creds)
    }

    /// Build-time credentials.
    pub fn from_build_env() -> Result<Self, ConnectivityError> {
        let ssid = option_env!("FILTERMON_WIFI_SSID").ok_or(ConnectivityError::NoCredentials)?;
        Self::new(ssid, option_env!("FILTERMON_WIFI_PASS").unwrap_or(""))
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Network link
// ───────────────────────────────────────────────────────────────

/// Holds the WiFi driver and SNTP client; dropping it tears both down.
#[cfg(target_os = "espidf")]
pub struct NetworkLink {
    wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    _sntp: esp_idf_svc::sntp::EspSntp<'static>,
}

#[cfg(target_os = "espidf")]
impl NetworkLink {
    /// Join the configured access point and start SNTP.  Blocks until the
    /// station has an IP address.
    pub fn connect(
        modem: esp_idf_hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: esp_idf_svc::nvs::EspDefaultNvsPartition,
        creds: &WifiCredentials,
        hostname: &str,
    ) -> anyhow::Result<Self> {
        use esp_idf_svc::wifi::{
            AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi,
        };

        let mut esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
        esp_wifi.sta_netif_mut().set_hostname(hostname)?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        let auth_method = if creds.is_open() { AuthMethod::None } else { AuthMethod::WPA2Personal };
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: creds
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: creds
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        }))?;

        info!("WiFi: connecting to '{}' as {}", creds.ssid, hostname);
        wifi.start()?;
        wifi.connect()?;
        wifi.wait_netif_up()?;

        let ip = wifi.wifi().sta_netif().get_ip_info()?;
        info!("WiFi: connected, ip={}", ip.ip);

        let sntp = esp_idf_svc::sntp::EspSntp::new_default()?;
        info!("SNTP: started");

        Ok(Self { wifi, _sntp: sntp })
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }
}

/// Simulation link: always up, no radio.
#[cfg(not(target_os = "espidf"))]
pub struct NetworkLink {
    ssid: heapless::String<32>,
}

#[cfg(not(target_os = "espidf"))]
impl NetworkLink {
    pub fn connect(creds: &WifiCredentials, hostname: &str) -> Result<Self, ConnectivityError> {
        info!("WiFi(sim): connected to '{}' as {}", creds.ssid, hostname);
        Ok(Self { ssid: creds.ssid.clone() })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn is_connected(&self) -> bool {
        true
    }
}
