use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use common::{client::ClientConfig, Credentials};
use log::warn;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(300);
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HassConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub client: ClientConfig,
    /// Device served by `/temperature`.
    pub device_name: Option<String>,
    pub host: String,
    pub port: u16,
    pub scan_interval: Duration,
    pub hass: Option<HassConfig>,
    pub cors_origin: Option<String>,
}

impl Config {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));

        let credentials = Credentials::new(
            required("GOVEE_AUTH_TOKEN")?,
            required("GOVEE_CLIENT_ID")?,
        );

        let defaults = ClientConfig::default();
        let client = ClientConfig {
            base_url: get("GOVEE_API_BASE").unwrap_or(defaults.base_url),
            device_list_path: get("GOVEE_DEVICE_LIST_PATH").unwrap_or(defaults.device_list_path),
            user_agent: get("GOVEE_USER_AGENT").unwrap_or(defaults.user_agent),
            app_version: get("GOVEE_APP_VERSION").unwrap_or(defaults.app_version),
            timeout: parsed::<u64>("GOVEE_TIMEOUT", get("GOVEE_TIMEOUT"))?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };

        let scan_interval = parsed::<u64>("SCAN_INTERVAL", get("SCAN_INTERVAL"))?
            .map(|secs| clamp_scan_interval(Duration::from_secs(secs)))
            .unwrap_or(DEFAULT_SCAN_INTERVAL);

        let hass = match (get("HASS_URL"), get("HASS_TOKEN")) {
            (Some(url), Some(token)) => Some(HassConfig { url, token }),
            (None, None) => None,
            _ => {
                warn!("HASS_URL and HASS_TOKEN must both be set, Home Assistant push disabled");
                None
            }
        };

        Ok(Self {
            credentials,
            client,
            device_name: get("GOVEE_DEVICE_NAME"),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("PORT", get("PORT"))?.unwrap_or(8000),
            scan_interval,
            hass,
            cors_origin: get("CORS_ORIGIN"),
        })
    }
}

fn parsed<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>()
                .ok()
                .with_context(|| format!("{key} has an invalid value '{v}'"))
        })
        .transpose()
}

/// Shorter intervals risk the vendor's rate limiting.
pub fn clamp_scan_interval(interval: Duration) -> Duration {
    if interval < MIN_SCAN_INTERVAL {
        warn!(
            "scan interval {}s below minimum, using {}s",
            interval.as_secs(),
            MIN_SCAN_INTERVAL.as_secs()
        );
        return MIN_SCAN_INTERVAL;
    }
    interval
}
