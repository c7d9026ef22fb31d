use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{TransferAck, TransferHost};
use crate::domain::{ClientId, Destination};
use crate::error::HostError;

/// Scripted reply of the simulated host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedResponse {
    Ack,
    Reject(String),
    Unavailable(String),
    /// Never answer; only the timeout watchdog can settle the attempt
    Hang,
}

/// In-process stand-in for a proxy host.
///
/// Replies come from a per-client script, then from the default response.
/// Every call is recorded.
pub struct SimulatedHost {
    default: SimulatedResponse,
    latency: Duration,
    scripts: Mutex<HashMap<ClientId, VecDeque<SimulatedResponse>>>,
    calls: Mutex<Vec<(ClientId, Destination)>>,
}

impl SimulatedHost {
    /// Host acknowledging every transfer immediately
    pub fn new() -> Self {
        Self::with_default(SimulatedResponse::Ack)
    }

    pub fn with_default(default: SimulatedResponse) -> Self {
        Self {
            default,
            latency: Duration::ZERO,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue replies for one client, consumed in order
    pub async fn script<I>(&self, client_id: &ClientId, responses: I)
    where
        I: IntoIterator<Item = SimulatedResponse>,
    {
        let mut scripts = self.scripts.lock().await;
        scripts
            .entry(client_id.clone())
            .or_default()
            .extend(responses);
    }

    pub async fn calls(&self) -> Vec<(ClientId, Destination)> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferHost for SimulatedHost {
    async fn transfer(
        &self,
        client_id: &ClientId,
        destination: &Destination,
    ) -> Result<TransferAck, HostError> {
        self.calls
            .lock()
            .await
            .push((client_id.clone(), destination.clone()));

        let response = {
            let mut scripts = self.scripts.lock().await;
            scripts
                .get_mut(client_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| self.default.clone())
        };
        debug!("Simulated host answering {:?} for {} -> {}", response, client_id, destination);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match response {
            SimulatedResponse::Ack => Ok(TransferAck::new(client_id.clone(), destination.clone())),
            SimulatedResponse::Reject(reason) => Err(HostError::Rejected(reason)),
            SimulatedResponse::Unavailable(reason) => Err(HostError::Unavailable(reason)),
            SimulatedResponse::Hang => std::future::pending().await,
        }
    }
}
