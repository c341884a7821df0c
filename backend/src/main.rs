use std::sync::Arc;

use anyhow::{Context, Result};
use common::{req::PollerState, DeviceClient};
use log::info;
use tokio::{signal, sync::watch};

mod api;
mod config;
mod hass;
mod poller;
#[cfg(test)]
mod testing;
mod utils;

use crate::{
    config::Config,
    hass::HassPublisher,
    poller::{PollStatus, Poller},
};

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let client = Arc::new(
        DeviceClient::new(config.client.clone(), config.credentials.clone())
            .context("creating Govee client")?,
    );

    let (status, poll_task) = match config.hass.clone() {
        Some(hass) => {
            let publisher = Arc::new(HassPublisher::new(hass, config.client.timeout)?);
            let (poller, status) = Poller::new(client.clone(), publisher, config.scan_interval);
            let task = actix_web::rt::spawn(poller.run(async {
                signal::ctrl_c().await.ok();
            }));
            (status, Some(task))
        }
        None => {
            info!("HASS_URL not set, Home Assistant push disabled");
            let (_, status) = watch::channel(PollStatus::with_state(PollerState::Disabled));
            (status, None)
        }
    };

    let state = api::AppState {
        client,
        device_name: config.device_name.clone(),
        status,
    };
    api::new_http_server(state, (config.host.clone(), config.port), config.cors_origin.clone())
        .await
        .context("http server")?;

    if let Some(task) = poll_task {
        task.abort();
    }
    Ok(())
}
