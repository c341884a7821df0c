use std::{fmt, sync::Arc};

use actix_cors::Cors;
use actix_web::{
    get,
    http::{header, StatusCode},
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder, ResponseError,
};
use common::{
    req::{DevicesQuery, ErrorResponse, HealthResponse, TemperatureResponse},
    ClientError, Device, DeviceClient,
};
use log::info;
use tokio::sync::watch;

use crate::poller::PollStatus;

pub struct AppState {
    pub client: Arc<DeviceClient>,
    /// Device served by `/temperature`.
    pub device_name: Option<String>,
    pub status: watch::Receiver<PollStatus>,
}

#[derive(Debug)]
pub enum ApiError {
    Client(ClientError),
    MissingDeviceName,
    NoTemperature(String),
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        Self::Client(err)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(err) => write!(f, "{err}"),
            Self::MissingDeviceName => f.write_str("GOVEE_DEVICE_NAME is not configured"),
            Self::NoTemperature(name) => write!(f, "device '{name}' reports no temperature"),
        }
    }
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Client(ClientError::DeviceNotFound { .. }) => "device_not_found",
            Self::Client(ClientError::Unauthorized(_)) => "vendor_auth",
            Self::Client(ClientError::NetworkFailure(_) | ClientError::ServerError(_)) => {
                "vendor_unavailable"
            }
            Self::Client(
                ClientError::NotFound | ClientError::UnexpectedStatus(_) | ClientError::Protocol(_),
            ) => "vendor_protocol",
            Self::Client(ClientError::Config(_)) | Self::MissingDeviceName => "configuration",
            Self::NoTemperature(_) => "no_temperature",
        }
    }
}

// End users cannot fix vendor credentials, so auth failures surface as 503.
impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Client(ClientError::DeviceNotFound { .. }) | Self::NoTemperature(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Client(
                ClientError::Unauthorized(_)
                | ClientError::NetworkFailure(_)
                | ClientError::ServerError(_),
            ) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Client(
                ClientError::NotFound | ClientError::UnexpectedStatus(_) | ClientError::Protocol(_),
            ) => StatusCode::BAD_GATEWAY,
            Self::Client(ClientError::Config(_)) | Self::MissingDeviceName => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.kind().to_string(),
            detail: self.to_string(),
        })
    }
}

#[get("/health")]
async fn api_health(state: Data<AppState>) -> impl Responder {
    let status = state.status.borrow().clone();
    web::Json(HealthResponse {
        status: "ok".to_string(),
        poller: status.state,
        last_poll: status.last_poll.map(|ts| ts.timestamp()),
        device_count: status.device_count,
    })
}

#[get("/devices")]
async fn api_devices(
    query: web::Query<DevicesQuery>,
    state: Data<AppState>,
) -> Result<impl Responder, ApiError> {
    let list = state.client.fetch_devices().await?;
    let devices: Vec<Device> = if query.all {
        list.devices
    } else {
        list.sensors().cloned().collect()
    };
    Ok(web::Json(devices))
}

#[get("/device/id/{id}")]
async fn api_device_by_id(
    id: web::Path<String>,
    state: Data<AppState>,
) -> Result<impl Responder, ApiError> {
    Ok(web::Json(state.client.get_device_by_id(&id).await?))
}

#[get("/device/{name}")]
async fn api_device_by_name(
    name: web::Path<String>,
    state: Data<AppState>,
) -> Result<impl Responder, ApiError> {
    Ok(web::Json(state.client.get_device_by_name(&name).await?))
}

#[get("/temperature")]
async fn api_temperature(state: Data<AppState>) -> Result<impl Responder, ApiError> {
    let name = state.device_name.as_deref().ok_or(ApiError::MissingDeviceName)?;
    let temperature = state
        .client
        .temperature(name)
        .await?
        .ok_or_else(|| ApiError::NoTemperature(name.to_string()))?;

    Ok(web::Json(TemperatureResponse {
        device: name.to_string(),
        temperature,
    }))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(api_health)
        .service(api_devices)
        .service(api_device_by_id)
        .service(api_device_by_name)
        .service(api_temperature);
}

pub async fn new_http_server(
    state: AppState,
    bind: (String, u16),
    cors_origin: Option<String>,
) -> std::io::Result<()> {
    let state = Data::new(state);
    info!("listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allowed_methods(vec!["GET"])
                .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
                .allowed_header(header::CONTENT_TYPE)
                .max_age(3600),
            None => Cors::default(),
        };

        App::new()
            .app_data(state.clone())
            .configure(routes)
            .wrap(cors)
    })
    .bind(bind)?
    .run()
    .await
}
