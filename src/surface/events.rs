use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::domain::{ClientId, Destination, Trigger};
use crate::error::Result;
use crate::mapping::MappingDecision;
use crate::orchestrator::{ReloadSummary, TransferOrchestrator};
use crate::tracker::TransferTicket;

/// A backend instructed a Java-edition transfer for one client.
///
/// The handler fills in `bedrock` when the client should land elsewhere; the
/// host keeps its own behaviour when it stays `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTransferEvent {
    pub client_id: ClientId,
    pub java_host: String,
    pub java_port: u16,
    pub bedrock: Option<Destination>,
}

impl ServerTransferEvent {
    pub fn new(client_id: ClientId, java_host: impl Into<String>, java_port: u16) -> Self {
        Self {
            client_id,
            java_host: java_host.into(),
            java_port,
            bedrock: None,
        }
    }
}

/// Host lifecycle callbacks feeding the pipeline
pub struct HostEventHandler {
    core: Arc<TransferOrchestrator>,
}

impl HostEventHandler {
    pub fn new(core: Arc<TransferOrchestrator>) -> Self {
        Self { core }
    }

    pub async fn on_client_connected(&self, client_id: &ClientId, current_server: Option<Destination>) {
        self.core.open_session(client_id, current_server).await;
    }

    pub async fn on_client_disconnected(&self, client_id: &ClientId) {
        if let Some(session) = self.core.close_session(client_id).await {
            debug!(
                "Dropped session of {} ({} history entries)",
                client_id,
                session.history.len()
            );
        }
    }

    /// Client landed on another server without going through this core
    pub async fn on_server_switched(&self, client_id: &ClientId, server: Destination) {
        if let Err(e) = self.core.set_current_server(client_id, server).await {
            debug!("Ignoring server switch: {}", e);
        }
    }

    /// External transfer request (trigger Automatic)
    pub async fn on_transfer_requested(
        &self,
        client_id: &ClientId,
        target: Option<&str>,
    ) -> Result<TransferTicket> {
        self.core
            .request_transfer(client_id, target, Trigger::Automatic)
            .await
    }

    /// Rewrite a backend-initiated Java transfer to its Bedrock destination
    pub async fn on_server_transfer(&self, event: &mut ServerTransferEvent) -> MappingDecision {
        let java = match Destination::new(&event.java_host, event.java_port) {
            Ok(java) => java,
            Err(e) => {
                warn!(
                    "Ignoring server transfer of {} to {}:{}: {}",
                    event.client_id, event.java_host, event.java_port, e
                );
                return MappingDecision::Unmapped;
            }
        };

        let decision = self.core.route_server_transfer(&java).await;
        if let Some(bedrock) = decision.destination() {
            debug!("Server transfer of {}: {}", event.client_id, decision);
            event.bedrock = Some(bedrock.clone());
        }
        decision
    }

    /// Host-wide reload event
    pub async fn on_reload(&self, config: &AppConfig) -> Result<ReloadSummary> {
        self.core.reload(config).await
    }
}
