//! Pushes device readings into Home Assistant through its REST states API.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use common::Device;
use log::debug;
use reqwest::{header::AUTHORIZATION, StatusCode};

use crate::{config::HassConfig, utils::object_id};

pub const UNAVAILABLE: &str = "unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Sensor,
    BinarySensor,
}

impl Domain {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
        }
    }
}

struct EntityKind {
    key: &'static str,
    name: &'static str,
    domain: Domain,
    device_class: Option<&'static str>,
    unit: Option<&'static str>,
    state_class: Option<&'static str>,
    state: fn(&Device) -> Option<String>,
}

fn number(v: Option<f64>) -> Option<String> {
    v.map(|v| v.to_string())
}

fn on_off(v: Option<bool>) -> Option<String> {
    v.map(|on| if on { "on" } else { "off" }.to_string())
}

const MEASUREMENT: Option<&str> = Some("measurement");
const CELSIUS: Option<&str> = Some("°C");
const PERCENT: Option<&str> = Some("%");

const ENTITY_KINDS: &[EntityKind] = &[
    EntityKind {
        key: "temperature",
        name: "Temperature",
        domain: Domain::Sensor,
        device_class: Some("temperature"),
        unit: CELSIUS,
        state_class: MEASUREMENT,
        state: |d| number(d.temperature),
    },
    EntityKind {
        key: "humidity",
        name: "Humidity",
        domain: Domain::Sensor,
        device_class: Some("humidity"),
        unit: PERCENT,
        state_class: MEASUREMENT,
        state: |d| number(d.humidity),
    },
    EntityKind {
        key: "battery",
        name: "Battery",
        domain: Domain::Sensor,
        device_class: Some("battery"),
        unit: PERCENT,
        state_class: MEASUREMENT,
        state: |d| d.battery.map(|b| b.to_string()),
    },
    EntityKind {
        key: "wifi_level",
        name: "WiFi Signal Level",
        domain: Domain::Sensor,
        device_class: None,
        unit: None,
        state_class: MEASUREMENT,
        state: |d| d.wifi_level.map(|l| l.to_string()),
    },
    EntityKind {
        key: "upload_rate",
        name: "Upload Rate",
        domain: Domain::Sensor,
        device_class: Some("duration"),
        unit: Some("s"),
        state_class: MEASUREMENT,
        state: |d| d.upload_rate.map(|r| r.to_string()),
    },
    EntityKind {
        key: "average_daily_temperature",
        name: "Average Daily Temperature",
        domain: Domain::Sensor,
        device_class: Some("temperature"),
        unit: CELSIUS,
        state_class: MEASUREMENT,
        state: |d| number(d.average_daily_temperature),
    },
    EntityKind {
        key: "average_daily_humidity",
        name: "Average Daily Humidity",
        domain: Domain::Sensor,
        device_class: Some("humidity"),
        unit: PERCENT,
        state_class: MEASUREMENT,
        state: |d| number(d.average_daily_humidity),
    },
    EntityKind {
        key: "online",
        name: "Online",
        domain: Domain::BinarySensor,
        device_class: Some("connectivity"),
        unit: None,
        state_class: None,
        state: |d| on_off(d.online),
    },
    EntityKind {
        key: "temperature_warning",
        name: "Temperature Warning",
        domain: Domain::BinarySensor,
        device_class: Some("problem"),
        unit: None,
        state_class: None,
        state: |d| on_off(d.temperature_warning),
    },
    EntityKind {
        key: "humidity_warning",
        name: "Humidity Warning",
        domain: Domain::BinarySensor,
        device_class: Some("problem"),
        unit: None,
        state_class: None,
        state: |d| on_off(d.humidity_warning),
    },
    EntityKind {
        key: "power_save_mode",
        name: "Power Save Mode",
        domain: Domain::BinarySensor,
        device_class: Some("power"),
        unit: None,
        state_class: None,
        state: |d| on_off(d.power_save_mode),
    },
];

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EntityAttributes {
    pub friendly_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'static str>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EntityState {
    #[serde(skip)]
    pub entity_id: String,
    pub state: String,
    pub attributes: EntityAttributes,
}

impl EntityState {
    /// Same entity, marked unavailable.
    pub fn unavailable(&self) -> Self {
        Self {
            state: UNAVAILABLE.to_string(),
            ..self.clone()
        }
    }
}

/// One entity per reading the device reports; absent readings produce no entity.
pub fn entity_states(device: &Device) -> Vec<EntityState> {
    let oid = object_id(&device.id);
    let model = device.model_label();

    ENTITY_KINDS
        .iter()
        .filter_map(|kind| {
            let state = (kind.state)(device)?;
            Some(EntityState {
                entity_id: format!("{}.govee_{oid}_{}", kind.domain.as_str(), kind.key),
                state,
                attributes: EntityAttributes {
                    friendly_name: format!("{} {}", device.name, kind.name),
                    unit_of_measurement: kind.unit,
                    device_class: kind.device_class,
                    state_class: kind.state_class,
                    model: model.clone(),
                },
            })
        })
        .collect()
}

/// Sink for entity states on the host platform.
#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn publish(&self, state: &EntityState) -> Result<()>;
}

pub struct HassPublisher {
    config: HassConfig,
    http: reqwest::Client,
}

impl HassPublisher {
    pub fn new(config: HassConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building Home Assistant http client")?;
        Ok(Self { config, http })
    }

    fn state_url(&self, entity_id: &str) -> String {
        format!(
            "{}/api/states/{entity_id}",
            self.config.url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl StatePublisher for HassPublisher {
    async fn publish(&self, state: &EntityState) -> Result<()> {
        let url = self.state_url(&state.entity_id);
        debug!("POST {url} = {}", state.state);

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.token))
            .json(state)
            .send()
            .await
            .with_context(|| format!("publishing {}", state.entity_id))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => bail!("Home Assistant rejected the access token"),
            s => bail!("Home Assistant returned {s} for {}", state.entity_id),
        }
    }
}
