// JSON bodies of the backend's REST surface

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TemperatureResponse {
    pub device: String,
    pub temperature: f64, // °C
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Disabled,
    Starting,
    Ready,
    Unavailable,
    ReauthRequired,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub poller: PollerState,
    pub last_poll: Option<i64>, // s since epoch
    pub device_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct DevicesQuery {
    #[serde(default)]
    pub all: bool,
}
