use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use common::{req::PollerState, DeviceClient};
use log::{error, info, warn};
use tokio::{sync::watch, time::MissedTickBehavior};

use crate::hass::{entity_states, EntityState, StatePublisher};

#[derive(Debug, Clone, PartialEq)]
pub struct PollStatus {
    pub state: PollerState,
    pub last_poll: Option<DateTime<Utc>>,
    pub device_count: Option<usize>,
}

impl PollStatus {
    pub fn with_state(state: PollerState) -> Self {
        Self {
            state,
            last_poll: None,
            device_count: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Periodically fetches all devices and pushes their readings to the host platform.
///
/// Owns the cadence and the failure policy: auth failures stop polling, everything
/// else marks the known entities unavailable and waits for the next tick.
pub struct Poller {
    client: Arc<DeviceClient>,
    publisher: Arc<dyn StatePublisher>,
    interval: Duration,
    status: watch::Sender<PollStatus>,
    published: Vec<EntityState>,
}

impl Poller {
    pub fn new(
        client: Arc<DeviceClient>,
        publisher: Arc<dyn StatePublisher>,
        interval: Duration,
    ) -> (Self, watch::Receiver<PollStatus>) {
        let (status, rx) = watch::channel(PollStatus::with_state(PollerState::Starting));
        let poller = Self {
            client,
            publisher,
            interval,
            status,
            published: Vec::new(),
        };
        (poller, rx)
    }

    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("polling every {}s", self.interval.as_secs());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.poll_once().await == Flow::Stop {
                        break;
                    }
                }
                _ = &mut shutdown => {
                    info!("poller shutting down");
                    break;
                }
            }
        }
    }

    pub async fn poll_once(&mut self) -> Flow {
        let list = match self.client.fetch_devices().await {
            Ok(list) => list,
            Err(err) if err.is_auth_failure() => {
                error!("{err}; polling stopped until credentials are replaced");
                self.mark_unavailable().await;
                self.set_state(PollerState::ReauthRequired);
                return Flow::Stop;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!("poll failed, retrying next interval: {err}");
                } else {
                    error!("poll failed: {err}");
                }
                self.mark_unavailable().await;
                self.set_state(PollerState::Unavailable);
                return Flow::Continue;
            }
        };

        let states: Vec<EntityState> = list.devices.iter().flat_map(entity_states).collect();
        for state in &states {
            self.publish(state).await;
        }

        let gone: Vec<EntityState> = self
            .published
            .iter()
            .filter(|old| !states.iter().any(|s| s.entity_id == old.entity_id))
            .map(EntityState::unavailable)
            .collect();
        for state in &gone {
            self.publish(state).await;
        }

        info!(
            "polled {} devices ({} skipped), {} entities",
            list.devices.len(),
            list.skipped.len(),
            states.len()
        );
        self.published = states;
        self.status.send_replace(PollStatus {
            state: PollerState::Ready,
            last_poll: Some(Utc::now()),
            device_count: Some(list.devices.len()),
        });
        Flow::Continue
    }

    async fn mark_unavailable(&self) {
        for state in &self.published {
            self.publish(&state.unavailable()).await;
        }
    }

    async fn publish(&self, state: &EntityState) {
        if let Err(err) = self.publisher.publish(state).await {
            warn!("{err:#}");
        }
    }

    fn set_state(&self, state: PollerState) {
        self.status.send_modify(|status| status.state = state);
    }
}
