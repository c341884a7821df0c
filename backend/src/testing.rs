use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{client::ClientConfig, transport::Transport, Credentials, DeviceClient, TransportError};
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::hass::{EntityState, StatePublisher};

/// Replies in order; the last reply repeats.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<String, TransportError>>>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, _path: &str, _headers: &HeaderMap) -> Result<String, TransportError> {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().expect("no scripted reply")
        }
    }
}

pub fn scripted_client(replies: Vec<Result<Value, TransportError>>) -> Arc<DeviceClient> {
    let transport = ScriptedTransport {
        replies: Mutex::new(
            replies
                .into_iter()
                .map(|r| r.map(|body| body.to_string()))
                .collect(),
        ),
    };
    let client = DeviceClient::with_transport(
        ClientConfig::default(),
        Credentials::new("token", "client"),
        Arc::new(transport),
    )
    .unwrap();
    Arc::new(client)
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<EntityState>>,
}

impl RecordingPublisher {
    pub fn take(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap()
            .drain(..)
            .map(|s| (s.entity_id, s.state))
            .collect()
    }
}

#[async_trait]
impl StatePublisher for RecordingPublisher {
    async fn publish(&self, state: &EntityState) -> anyhow::Result<()> {
        self.published.lock().unwrap().push(state.clone());
        Ok(())
    }
}
