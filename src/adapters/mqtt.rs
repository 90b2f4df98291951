//! MQTT broker link.
//!
//! Implements [`PublishPort`] and feeds the command topic into
//! [`ingress`](super::ingress).
//!
//! - **`target_os = "espidf"`**: `EspMqttClient` with an event callback.
//!   The client reconnects on its own, throttled by
//!   `SystemConfig::mqtt_reconnect_interval_ms`.  The callback runs in the
//!   MQTT task, so it only flips atomics and copies command bodies.
//!   The main loop calls [`MqttLink::service`] to (re)subscribe after
//!   each connect.
//! - **all other targets**: a recording simulation for host tests.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use super::ingress::{self, IngressChannel};
use crate::app::commands::CommandSource;
use crate::app::ports::{PublishError, PublishPort};

/// Larger payloads are refused before they reach the client.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// Connection state shared between the MQTT task and the main loop.
#[derive(Debug, Default)]
pub struct LinkState {
    connected: AtomicBool,
    subscribe_pending: AtomicBool,
}

impl LinkState {
    pub fn on_connected(&self) {
        self.connected.store(true, Ordering::Release);
        self.subscribe_pending.store(true, Ordering::Release);
    }

    pub fn on_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Claim the pending subscription, if any.
    pub fn take_subscribe(&self) -> bool {
        self.subscribe_pending.swap(false, Ordering::AcqRel)
    }

    pub fn retry_subscribe(&self) {
        self.subscribe_pending.store(true, Ordering::Release);
    }
}

/// Route one inbound message.  Only the command topic is accepted; the
/// body goes onto `channel` untouched.
pub fn route_inbound(
    channel: &IngressChannel,
    command_topic: &str,
    topic: Option<&str>,
    data: &[u8],
) -> bool {
    match topic {
        Some(t) if t == command_topic => ingress::submit_to(channel, CommandSource::Message, data),
        Some(t) => {
            warn!("MQTT: message on unexpected topic {}, ignored", t);
            false
        }
        None => {
            warn!("MQTT: fragmented or topicless message, ignored");
            false
        }
    }
}

fn check_publish(state: &LinkState, payload: &[u8]) -> Result<(), PublishError> {
    if !state.is_connected() {
        return Err(PublishError::NotConnected);
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(PublishError::TooLarge);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct MqttLink {
    client: esp_idf_svc::mqtt::client::EspMqttClient<'static>,
    state: Arc<LinkState>,
    command_topic: String,
}

#[cfg(target_os = "espidf")]
impl MqttLink {
    pub fn connect(
        broker_url: &str,
        client_id: &str,
        command_topic: &str,
        reconnect_interval_ms: u32,
    ) -> anyhow::Result<Self> {
        use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration};

        let state = Arc::new(LinkState::default());
        let conf = MqttClientConfiguration {
            client_id: Some(client_id),
            reconnect_timeout: Some(core::time::Duration::from_millis(u64::from(
                reconnect_interval_ms,
            ))),
            ..Default::default()
        };

        let cb_state = Arc::clone(&state);
        let cb_topic = command_topic.to_owned();
        let client = EspMqttClient::new_cb(broker_url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => {
                info!("MQTT: connected");
                cb_state.on_connected();
            }
            EventPayload::Disconnected => {
                warn!("MQTT: disconnected");
                cb_state.on_disconnected();
            }
            EventPayload::Received { topic, data, .. } => {
                route_inbound(&ingress::INGRESS, &cb_topic, topic, data);
            }
            EventPayload::Error(e) => warn!("MQTT: {:?}", e),
            _ => {}
        })?;

        info!("MQTT: client {} started against {}", client_id, broker_url);
        Ok(Self {
            client,
            state,
            command_topic: command_topic.to_owned(),
        })
    }

    /// Subscribe to the command topic after a (re)connect.  Main loop only.
    pub fn service(&mut self) {
        use esp_idf_svc::mqtt::client::QoS;

        if !self.state.is_connected() || !self.state.take_subscribe() {
            return;
        }
        match self.client.subscribe(&self.command_topic, QoS::AtLeastOnce) {
            Ok(_) => info!("MQTT: subscribed to {}", self.command_topic),
            Err(e) => {
                warn!("MQTT: subscribe to {} failed: {}", self.command_topic, e);
                self.state.retry_subscribe();
            }
        }
    }
}

#[cfg(target_os = "espidf")]
impl PublishPort for MqttLink {
    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        use esp_idf_svc::mqtt::client::QoS;

        check_publish(&self.state, payload)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT: publish to {} failed: {}", topic, e);
                PublishError::Rejected
            })
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// Host stand-in: records every accepted publish.
#[cfg(not(target_os = "espidf"))]
pub struct MqttLink {
    state: Arc<LinkState>,
    command_topic: String,
    subscribed: bool,
    published: Vec<(String, Vec<u8>)>,
}

#[cfg(not(target_os = "espidf"))]
impl MqttLink {
    pub fn connect(
        broker_url: &str,
        client_id: &str,
        command_topic: &str,
        _reconnect_interval_ms: u32,
    ) -> anyhow::Result<Self> {
        info!("MQTT(sim): client {} against {}", client_id, broker_url);
        Ok(Self {
            state: Arc::new(LinkState::default()),
            command_topic: command_topic.to_owned(),
            subscribed: false,
            published: Vec::new(),
        })
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn service(&mut self) {
        if self.state.is_connected() && self.state.take_subscribe() {
            self.subscribed = true;
            info!("MQTT(sim): subscribed to {}", self.command_topic);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Feed an inbound message as the broker would.
    pub fn deliver(&self, channel: &IngressChannel, topic: &str, data: &[u8]) -> bool {
        route_inbound(channel, &self.command_topic, Some(topic), data)
    }

    pub fn published(&self) -> &[(String, Vec<u8>)] {
        &self.published
    }
}

#[cfg(not(target_os = "espidf"))]
impl PublishPort for MqttLink {
    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        check_publish(&self.state, payload)?;
        self.published.push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }
}
