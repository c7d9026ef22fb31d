use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{ClientId, Destination};
use crate::error::HostError;

/// Host acknowledgement that the client was instructed to move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferAck {
    pub client_id: ClientId,
    pub destination: Destination,
    pub acknowledged_at: DateTime<Utc>,
}

impl TransferAck {
    pub fn new(client_id: ClientId, destination: Destination) -> Self {
        Self {
            client_id,
            destination,
            acknowledged_at: Utc::now(),
        }
    }
}

/// Capability to send a protocol-level transfer instruction to one client.
///
/// This is the only network I/O the core performs. Implementations may suspend
/// until the host acknowledges; callers bound the wait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferHost: Send + Sync {
    async fn transfer(
        &self,
        client_id: &ClientId,
        destination: &Destination,
    ) -> Result<TransferAck, HostError>;
}
