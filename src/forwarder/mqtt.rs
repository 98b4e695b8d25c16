//! MQTT telemetry with Home Assistant discovery.
//!
//! Topics are namespaced by the board's hardware address so several boards
//! can share a broker.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use macaddr::MacAddr6;
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    alerts::AlertKind,
    models::{Classification, Snapshot},
    persistence::settings::MqttSettings,
};

use super::{DeliveryError, TelemetrySink};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 32;
const DISCOVERY_PREFIX: &str = "homeassistant";

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

/// Read the hardware address of `interface` from a sysfs tree rooted at
/// `sys_root` (normally `/sys`).
pub fn read_mac(sys_root: &Path, interface: &str) -> Result<MacAddr6> {
    let path = sys_root.join("class/net").join(interface).join("address");
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    raw.trim()
        .parse::<MacAddr6>()
        .with_context(|| format!("invalid hardware address in {}", path.display()))
}

/// Lowercase hex without separators, e.g. `b827eb123456`.
pub fn node_id(mac: MacAddr6) -> String {
    mac.as_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub node_id: String,
    pub state: String,
    pub alert: String,
    pub availability: String,
}

impl Topics {
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_owned(),
            state: format!("calcifer/{node_id}/state"),
            alert: format!("calcifer/{node_id}/alert"),
            availability: format!("calcifer/{node_id}/availability"),
        }
    }

    pub fn discovery(&self, key: &str) -> String {
        format!("{DISCOVERY_PREFIX}/sensor/calcifer_{}/{key}/config", self.node_id)
    }
}

struct SensorDef {
    key: &'static str,
    name: &'static str,
    field: &'static str,
    unit: Option<&'static str>,
    device_class: Option<&'static str>,
}

const SENSORS: [SensorDef; 7] = [
    SensorDef { key: "co2", name: "CO2", field: "co2_ppm", unit: Some("ppm"), device_class: Some("carbon_dioxide") },
    SensorDef { key: "voc", name: "VOC", field: "voc_ppb", unit: Some("ppb"), device_class: Some("volatile_organic_compounds_parts") },
    SensorDef { key: "aqi", name: "Outdoor AQI", field: "aqi", unit: None, device_class: Some("aqi") },
    SensorDef { key: "temperature", name: "Temperature", field: "temperature_c", unit: Some("°C"), device_class: Some("temperature") },
    SensorDef { key: "humidity", name: "Humidity", field: "humidity_pct", unit: Some("%"), device_class: Some("humidity") },
    SensorDef { key: "pressure", name: "Pressure", field: "pressure_hpa", unit: Some("hPa"), device_class: Some("atmospheric_pressure") },
    SensorDef { key: "air_quality", name: "Air quality", field: "classification", unit: None, device_class: None },
];

/// Retained discovery messages, one per sensor: `(topic, payload)`.
pub fn discovery_configs(topics: &Topics) -> Vec<(String, Value)> {
    let device_id = format!("calcifer_{}", topics.node_id);
    SENSORS
        .iter()
        .map(|s| {
            let mut config = json!({
                "name": s.name,
                "unique_id": format!("{device_id}_{}", s.key),
                "state_topic": topics.state,
                "value_template": format!("{{{{ value_json.{} }}}}", s.field),
                "availability_topic": topics.availability,
                "device": {
                    "identifiers": [device_id],
                    "name": "Calcifer",
                    "manufacturer": "Pimoroni",
                    "model": "Enviro",
                },
            });
            if let Some(unit) = s.unit {
                config["unit_of_measurement"] = json!(unit);
                config["state_class"] = json!("measurement");
            }
            if let Some(class) = s.device_class {
                config["device_class"] = json!(class);
            }
            (topics.discovery(s.key), config)
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct StatePayload {
    pub co2_ppm: Option<u16>,
    pub voc_ppb: Option<u16>,
    pub aqi: Option<u32>,
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub pressure_hpa: Option<f32>,
    pub classification: Classification,
    pub timestamp: DateTime<Utc>,
}

impl From<&Snapshot> for StatePayload {
    fn from(s: &Snapshot) -> Self {
        Self {
            co2_ppm: s.reading.co2_ppm,
            voc_ppb: s.reading.voc_ppb,
            aqi: s.aqi(),
            temperature_c: s.reading.temperature_c,
            humidity_pct: s.reading.humidity_pct,
            pressure_hpa: s.reading.pressure_hpa,
            classification: s.classification,
            timestamp: s.reading.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AlertPayload {
    pub kind: AlertKind,
    pub co2_ppm: Option<u16>,
    pub voc_ppb: Option<u16>,
    pub aqi: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

pub struct MqttSink {
    client: AsyncClient,
    topics: Topics,
}

impl MqttSink {
    /// Configure the client and spawn its event loop.
    ///
    /// Availability and discovery are (re)published on every ConnAck, so a
    /// broker restart restores them.
    pub fn connect(settings: &MqttSettings, mac: MacAddr6) -> (Self, JoinHandle<()>) {
        let topics = Topics::new(&node_id(mac));

        let mut options = MqttOptions::new(format!("calcifer-{}", topics.node_id), &settings.host, settings.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_last_will(LastWill::new(&topics.availability, OFFLINE, QoS::AtLeastOnce, true));
        if let Some(username) = &settings.username {
            options.set_credentials(username, settings.password.as_deref().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        info!(host = %settings.host, port = settings.port, node_id = %topics.node_id, "MQTT configured");

        let handle = {
            let client = client.clone();
            let topics = topics.clone();
            tokio::spawn(async move {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("MQTT connected");
                            announce(&client, &topics);
                        }
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                            debug!("MQTT disconnected");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "MQTT connection error");
                            tokio::time::sleep(RECONNECT_DELAY).await;
                        }
                    }
                }
            })
        };

        (Self { client, topics }, handle)
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Publish `offline` and disconnect cleanly.
    pub async fn go_offline(&self) -> Result<(), DeliveryError> {
        self.client
            .try_publish(&self.topics.availability, QoS::AtLeastOnce, true, OFFLINE)
            .map_err(|e| DeliveryError::Transient(format!("MQTT offline: {e}")))?;
        self.client
            .try_disconnect()
            .map_err(|e| DeliveryError::Transient(format!("MQTT disconnect: {e}")))
    }

    fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), DeliveryError> {
        // Never blocks: a full request queue is a transient error.
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| DeliveryError::Transient(format!("MQTT publish to {topic}: {e}")))
    }
}

fn announce(client: &AsyncClient, topics: &Topics) {
    if let Err(e) = client.try_publish(&topics.availability, QoS::AtLeastOnce, true, ONLINE) {
        warn!(error = %e, "Failed to queue MQTT availability");
    }
    for (topic, config) in discovery_configs(topics) {
        if let Err(e) = client.try_publish(&topic, QoS::AtLeastOnce, true, config.to_string()) {
            warn!(topic = %topic, error = %e, "Failed to queue MQTT discovery");
        }
    }
}

impl TelemetrySink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn publish(&mut self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        let payload = serde_json::to_vec(&StatePayload::from(snapshot))
            .map_err(|e| DeliveryError::Permanent(format!("MQTT state payload: {e}")))?;
        self.send(&self.topics.state, payload)
    }

    async fn on_alert(&mut self, kind: AlertKind, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        let payload = AlertPayload {
            kind,
            co2_ppm: snapshot.reading.co2_ppm,
            voc_ppb: snapshot.reading.voc_ppb,
            aqi: snapshot.aqi(),
            timestamp: snapshot.reading.timestamp,
        };
        let payload = serde_json::to_vec(&payload)
            .map_err(|e| DeliveryError::Permanent(format!("MQTT alert payload: {e}")))?;
        self.send(&self.topics.alert, payload)
    }
}
