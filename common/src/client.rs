use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde_json::Value;

use crate::device::{Credentials, Device};
use crate::error::{ClientError, NormalizationError, Result};
use crate::normalize::Normalizer;
use crate::transport::{
    HttpTransport, Transport, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, DEVICE_LIST_PATH,
};

pub const DEFAULT_USER_AGENT: &str =
    "GoveeHome/7.0.12 (com.ihoment.GoVeeSensor; build:3; iOS 18.5.0) Alamofire/5.6.4";
pub const DEFAULT_APP_VERSION: &str = "7.0.12";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub device_list_path: String,
    pub user_agent: String,
    pub app_version: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            device_list_path: DEVICE_LIST_PATH.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            app_version: DEFAULT_APP_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Raw entry that was dropped during a fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDevice {
    pub index: usize,
    pub error: NormalizationError,
}

/// Result of one fetch: normalized devices in vendor order plus the entries that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceList {
    pub devices: Vec<Device>,
    pub skipped: Vec<SkippedDevice>,
}

impl DeviceList {
    /// Devices reporting temperature or humidity.
    pub fn sensors(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_sensor())
    }

    /// First exact, case-sensitive name match.
    pub fn find_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// Stateless orchestrator over a [`Transport`] and a [`Normalizer`].
///
/// Every public call performs exactly one request; nothing is cached between calls.
pub struct DeviceClient {
    transport: Arc<dyn Transport>,
    normalizer: Normalizer,
    device_list_path: String,
    headers: HeaderMap,
}

impl DeviceClient {
    pub fn new(config: ClientConfig, credentials: Credentials) -> Result<Self> {
        let transport = HttpTransport::new(config.base_url.clone(), config.timeout)
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Self::with_transport(config, credentials, Arc::new(transport))
    }

    pub fn with_transport(
        config: ClientConfig,
        credentials: Credentials,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let headers = request_headers(&config, &credentials)?;
        Ok(Self {
            transport,
            normalizer: Normalizer::default(),
            device_list_path: config.device_list_path,
            headers,
        })
    }

    /// Replaces the field table, e.g. to add aliases for a new firmware.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub async fn fetch_devices(&self) -> Result<DeviceList> {
        let body = self
            .transport
            .request(&self.device_list_path, &self.headers)
            .await?;

        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("body is not JSON: {e}")))?;
        let entries = device_entries(&raw)
            .ok_or_else(|| ClientError::Protocol("no device array in response".to_string()))?;

        let mut list = DeviceList::default();
        for (index, entry) in entries.iter().enumerate() {
            match self.normalizer.parse(entry) {
                Ok(device) => list.devices.push(device),
                Err(error) => {
                    warn!("skipping device entry {index}: {error}");
                    list.skipped.push(SkippedDevice { index, error });
                }
            }
        }

        debug!(
            "fetched {} devices ({} skipped)",
            list.devices.len(),
            list.skipped.len()
        );
        Ok(list)
    }

    /// Devices reporting temperature or humidity.
    pub async fn sensor_devices(&self) -> Result<Vec<Device>> {
        let list = self.fetch_devices().await?;
        Ok(list.devices.into_iter().filter(Device::is_sensor).collect())
    }

    pub async fn get_device_by_name(&self, name: &str) -> Result<Device> {
        let list = self.fetch_devices().await?;
        list.find_by_name(name)
            .cloned()
            .ok_or_else(|| ClientError::DeviceNotFound {
                key: "name",
                value: name.to_string(),
            })
    }

    pub async fn get_device_by_id(&self, id: &str) -> Result<Device> {
        let list = self.fetch_devices().await?;
        list.find_by_id(id)
            .cloned()
            .ok_or_else(|| ClientError::DeviceNotFound {
                key: "id",
                value: id.to_string(),
            })
    }

    /// Temperature of the named device; `Ok(None)` when it reports none.
    pub async fn temperature(&self, name: &str) -> Result<Option<f64>> {
        Ok(self.get_device_by_name(name).await?.temperature)
    }
}

fn request_headers(config: &ClientConfig, credentials: &Credentials) -> Result<HeaderMap> {
    let value = |name: &str, v: &str| {
        HeaderValue::from_str(v)
            .map_err(|_| ClientError::Config(format!("invalid {name} header value")))
    };

    let mut headers = HeaderMap::new();
    let mut auth = value("Authorization", &format!("Bearer {}", credentials.auth_token))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert(
        HeaderName::from_static("clientid"),
        value("clientId", &credentials.client_id)?,
    );
    headers.insert(USER_AGENT, value("User-Agent", &config.user_agent)?);
    headers.insert(
        HeaderName::from_static("appversion"),
        value("appVersion", &config.app_version)?,
    );
    Ok(headers)
}

/// Locates the device array: a bare array, `{"data":{"devices":[..]}}`,
/// `{"devices":[..]}` or `{"data":[..]}`.
fn device_entries(raw: &Value) -> Option<&Vec<Value>> {
    if let Some(entries) = raw.as_array() {
        return Some(entries);
    }
    let data = raw.get("data");
    data.and_then(|d| d.get("devices"))
        .and_then(Value::as_array)
        .or_else(|| raw.get("devices").and_then(Value::as_array))
        .or_else(|| data.and_then(Value::as_array))
}
