//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements              | Connects to                 |
//! |--------------|-------------------------|-----------------------------|
//! | `nvs`        | StoragePort, ConfigPort | NVS / in-memory store       |
//! | `time`       | ClockPort, DelayNs      | esp_timer, SNTP wall clock  |
//! | `log_sink`   | EventSink               | Serial log output           |
//! | `mqtt`       | PublishPort             | MQTT broker                 |
//! | `http`       |                         | `/data`, `/reset` endpoints |
//! | `ingress`    |                         | HTTP/MQTT → main loop       |
//! | `catalog_fs` |                         | SPIFFS sensor catalogue     |
//! | `wifi`       |                         | ESP-IDF WiFi STA + SNTP     |
//! | `device_id`  |                         | eFuse MAC                   |

pub mod catalog_fs;
pub mod device_id;
pub mod http;
pub mod ingress;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod time;
pub mod wifi;
