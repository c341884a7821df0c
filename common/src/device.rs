use std::fmt;

use chrono::{DateTime, Utc};

/// Known Govee models and their display names.
pub const DEVICE_MODELS: &[(&str, &str)] = &[
    ("H5051", "WiFi Thermo-Hygrometer"),
    ("H5074", "Bluetooth Thermo-Hygrometer"),
    ("H5075", "Bluetooth Thermo-Hygrometer"),
    ("H5101", "WiFi Thermo-Hygrometer"),
    ("H5102", "WiFi Thermo-Hygrometer"),
    ("H5179", "WiFi Thermo-Hygrometer"),
];

/// Canonical sensor record, independent of the vendor payload shape.
///
/// Every reading is optional; `None` means the vendor did not report it,
/// which is different from a reported `0.0` or `false`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub model: Option<String>,

    pub temperature: Option<f64>, // °C
    pub humidity: Option<f64>,    // percent
    pub battery: Option<u8>,      // percent
    pub online: Option<bool>,
    pub wifi_level: Option<i64>,
    pub temperature_warning: Option<bool>,
    pub humidity_warning: Option<bool>,
    pub upload_rate: Option<u32>, // s
    pub power_save_mode: Option<bool>,
    pub average_daily_temperature: Option<f64>, // °C
    pub average_daily_humidity: Option<f64>,    // percent

    pub last_seen: Option<DateTime<Utc>>,
    pub hardware_version: Option<String>,
    pub software_version: Option<String>,
}

impl Device {
    /// A device with identity only and no readings.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model: None,
            temperature: None,
            humidity: None,
            battery: None,
            online: None,
            wifi_level: None,
            temperature_warning: None,
            humidity_warning: None,
            upload_rate: None,
            power_save_mode: None,
            average_daily_temperature: None,
            average_daily_humidity: None,
            last_seen: None,
            hardware_version: None,
            software_version: None,
        }
    }

    /// Reports temperature or humidity.
    pub fn is_sensor(&self) -> bool {
        self.temperature.is_some() || self.humidity.is_some()
    }

    /// Human readable model name, falling back to the readings when the model is unknown.
    pub fn model_label(&self) -> String {
        if let Some(model) = &self.model {
            return match DEVICE_MODELS.iter().find(|(code, _)| *code == model.as_str()) {
                Some((_, label)) => label.to_string(),
                None => format!("{model} Sensor"),
            };
        }

        match (self.temperature.is_some(), self.humidity.is_some()) {
            (true, true) => "Temperature/Humidity Sensor",
            (true, false) => "Temperature Sensor",
            (false, true) => "Humidity Sensor",
            (false, false) => "Sensor",
        }
        .to_string()
    }
}

/// Vendor credentials, fixed for the lifetime of a client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub auth_token: String,
    pub client_id: String,
}

impl Credentials {
    pub fn new(auth_token: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            client_id: client_id.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .finish()
    }
}
