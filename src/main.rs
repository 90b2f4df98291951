//! FilterMon Firmware: Main Entry Point
//!
//! Hexagonal architecture with a single cooperative event loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  FlowSensor      LogEventSink   NvsAdapter     Esp32Time       │
//! │  (PulseSource)   (EventSink)    (Config+NVS)   (ClockPort)     │
//! │  MqttLink        HttpPortal     NetworkLink                    │
//! │  (PublishPort)   (/data,/reset) (WiFi + SNTP)                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Integrator · Ledger · CommandProcessor                │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  esp_timer ─▶ event queue ─┐                                   │
//! │  HTTP / MQTT ─▶ ingress ───┴─▶ main loop                       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};

use filtermon::adapters::catalog_fs;
use filtermon::adapters::device_id::DeviceIdentity;
use filtermon::adapters::http::{self, HttpPortal};
use filtermon::adapters::ingress;
use filtermon::adapters::log_sink::LogEventSink;
use filtermon::adapters::mqtt::MqttLink;
use filtermon::adapters::nvs::NvsAdapter;
use filtermon::adapters::time::{Esp32TimeAdapter, TaskDelay};
use filtermon::adapters::wifi::{NetworkLink, WifiCredentials};
use filtermon::app::ports::{ConfigError, ConfigPort};
use filtermon::app::service::AppService;
use filtermon::config::SystemConfig;
use filtermon::drivers::{hw_init, hw_timer};
use filtermon::events::{self, Event};
use filtermon::pins;
use filtermon::sensors::flow::FlowSensor;

/// Sleep between loop iterations once both queues are drained.
const LOOP_IDLE_MS: u32 = 10;

/// Log the reason and park the main task.  Nothing is measured while
/// halted; a power cycle retries the boot.
fn halt(reason: &dyn core::fmt::Display) -> ! {
    error!("FATAL: {} (halted)", reason);
    loop {
        FreeRtos::delay_ms(1_000);
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  FilterMon v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => halt(&e),
    };
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(ConfigError::NotFound) => {
            info!("Config: first boot, storing defaults");
            let cfg = SystemConfig::default();
            if let Err(e) = nvs.save(&cfg) {
                warn!("Config: saving defaults failed ({})", e);
            }
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    // ── 3. Calibration profile (fatal when absent) ────────────
    if let Err(e) = catalog_fs::mount() {
        halt(&e);
    }
    let calibration =
        match catalog_fs::load_active_profile(&config.catalog_path, &config.sensor_model) {
            Ok(p) => p,
            Err(e) => halt(&e),
        };

    // ── 4. Flow sensor GPIO + ISR ─────────────────────────────
    if let Err(e) = hw_init::init_flow_input().and_then(|()| hw_init::init_isr_service()) {
        halt(&e);
    }
    let mut flow = FlowSensor::new(pins::FLOW_SENSOR_GPIO);
    info!("Flow sensor on GPIO{}", flow.gpio());

    // ── 5. Device identity + network ──────────────────────────
    let identity = DeviceIdentity::read();
    info!("Device ID: {} (hostname: {})", identity.id, identity.hostname);

    let _network = match WifiCredentials::from_build_env() {
        Ok(creds) => {
            let nvs_partition = EspDefaultNvsPartition::take()?;
            match NetworkLink::connect(
                peripherals.modem,
                sysloop.clone(),
                nvs_partition,
                &creds,
                &identity.hostname,
            ) {
                Ok(link) => Some(link),
                Err(e) => {
                    warn!("WiFi: {:#}, running offline", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("WiFi: {}, running offline", e);
            None
        }
    };

    // ── 6. Construct app service ──────────────────────────────
    let clock = Esp32TimeAdapter::new();
    let mut delay = TaskDelay;
    let mut log_sink = LogEventSink::new();

    let started = AppService::start(config, calibration, nvs, &identity.id, &clock, &mut log_sink);
    let mut app = match started {
        Ok(app) => app,
        Err(e) => halt(&e),
    };
    http::store_status(app.status().to_json());

    let mut mqtt = MqttLink::connect(
        &app.config().broker_url,
        &identity.id,
        app.topics().reset(),
        app.config().mqtt_reconnect_interval_ms,
    )?;
    let _http = HttpPortal::start()?;

    hw_timer::start_flow_timer(app.config().tick_interval_ms);
    info!("System ready. Entering event loop.");

    // ── 7. Event loop ─────────────────────────────────────────
    loop {
        events::drain_events(|event| match event {
            Event::FlowTick => {
                app.tick(&mut flow, &clock, &mut mqtt, &mut delay, &mut log_sink);
                http::store_status(app.status().to_json());
            }
        });

        ingress::drain(|frame| {
            app.handle_command(frame.source, &frame.body, &clock, &mut log_sink);
            http::store_status(app.status().to_json());
        });

        mqtt.service();

        FreeRtos::delay_ms(LOOP_IDLE_MS);
    }
}
