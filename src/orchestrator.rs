//! Transfer orchestration core
//!
//! Wires the registry, resolver, tracker, dispatcher and timeout watchdog
//! together and exposes the pipeline to the command and event surface:
//! resolve -> begin -> dispatch -> report.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::domain::{ClientId, Destination, TransferRequest, TransferSession, TransferTarget, Trigger};
use crate::error::{Result, TransferError};
use crate::host::TransferHost;
use crate::locale::MessageCatalog;
use crate::mapping::{MappingDecision, TransferMappings};
use crate::registry::{TargetRegistry, TargetSet};
use crate::resolver::Resolver;
use crate::tracker::{TrackerConfig, TransferTicket, TransferTracker};
use crate::watchdog::{TimeoutWatchdog, WatchdogConfig};

/// Result of a successful configuration reload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub targets: usize,
    pub mappings: usize,
    pub generation: u64,
    pub command_enabled: bool,
    pub default_locale: String,
}

pub struct TransferOrchestrator {
    registry: Arc<TargetRegistry>,
    resolver: Arc<Resolver>,
    tracker: Arc<TransferTracker>,
    dispatcher: Arc<Dispatcher>,
    watchdog: TimeoutWatchdog,
    mappings: RwLock<Arc<TransferMappings>>,
    messages: RwLock<Arc<MessageCatalog>>,
    command_enabled: AtomicBool,
}

impl TransferOrchestrator {
    /// Build the core from validated configuration
    pub fn new(config: &AppConfig, host: Arc<dyn TransferHost>) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| TransferError::Config(errors.join("; ")))?;

        let registry = Arc::new(TargetRegistry::from_config(&config.targets)?);
        let mappings = TransferMappings::from_config(&config.mappings)?;
        let messages = MessageCatalog::from_config(&config.locale)?;
        let resolver = Arc::new(Resolver::new(registry.clone(), config.transfer.selection));
        let tracker = Arc::new(TransferTracker::new(TrackerConfig::from(&config.transfer)));
        let dispatcher = Arc::new(Dispatcher::new(
            host,
            tracker.clone(),
            resolver.clone(),
            config.transfer.fallback,
        ));
        let watchdog = TimeoutWatchdog::new(
            WatchdogConfig {
                sweep_interval: Duration::from_millis(config.transfer.sweep_interval_ms),
            },
            dispatcher.clone(),
        );

        info!(
            "Transfer core ready: {} targets, {} mappings, selection {}, retry ceiling {}, locale {}",
            config.targets.entries().len(),
            mappings.len(),
            resolver.policy(),
            tracker.config().limits.retry_ceiling,
            messages.default_locale()
        );

        Ok(Self {
            registry,
            resolver,
            tracker,
            dispatcher,
            watchdog,
            mappings: RwLock::new(Arc::new(mappings)),
            messages: RwLock::new(Arc::new(messages)),
            command_enabled: AtomicBool::new(config.command.enabled),
        })
    }

    /// Start the timeout watchdog
    pub fn start(&self) {
        self.watchdog.start();
    }

    pub fn shutdown(&self) {
        self.watchdog.stop();
        info!("Transfer core stopped");
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn tracker(&self) -> &Arc<TransferTracker> {
        &self.tracker
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn watchdog(&self) -> &TimeoutWatchdog {
        &self.watchdog
    }

    pub fn command_enabled(&self) -> bool {
        self.command_enabled.load(Ordering::SeqCst)
    }

    /// Current message catalog
    pub async fn messages(&self) -> Arc<MessageCatalog> {
        self.messages.read().await.clone()
    }

    pub async fn open_session(&self, client_id: &ClientId, current_server: Option<Destination>) {
        self.tracker.open_session(client_id, current_server).await;
    }

    pub async fn close_session(&self, client_id: &ClientId) -> Option<TransferSession> {
        self.tracker.close_session(client_id).await
    }

    /// Record a server switch the host performed on its own
    pub async fn set_current_server(&self, client_id: &ClientId, server: Destination) -> Result<()> {
        self.tracker.set_current_server(client_id, server).await
    }

    /// Resolve a target for `client_id` against its current server
    pub async fn resolve(
        &self,
        client_id: &ClientId,
        trigger: Trigger,
        requested: Option<&str>,
    ) -> Result<TransferTarget> {
        let current = self.tracker.current_server(client_id).await;
        self.resolver
            .resolve(trigger, requested, current.as_ref())
            .await
    }

    /// Open a Pending run for an already resolved target and dispatch it
    pub async fn start_resolved(
        &self,
        client_id: &ClientId,
        target: TransferTarget,
        trigger: Trigger,
    ) -> Result<TransferTicket> {
        let ticket = self
            .tracker
            .begin_transfer(client_id, target, trigger)
            .await?;
        self.dispatcher.dispatch(ticket.request.clone());
        Ok(ticket)
    }

    /// Full pipeline: resolve, begin and dispatch.
    ///
    /// Resolution and guard errors are returned synchronously; the host
    /// outcome arrives through the ticket.
    pub async fn request_transfer(
        &self,
        client_id: &ClientId,
        requested: Option<&str>,
        trigger: Trigger,
    ) -> Result<TransferTicket> {
        let target = self.resolve(client_id, trigger, requested).await?;
        self.start_resolved(client_id, target, trigger).await
    }

    /// Transfer to an address that is not a registered target
    pub async fn transfer_to_address(
        &self,
        client_id: &ClientId,
        destination: Destination,
    ) -> Result<TransferTicket> {
        let current = self.tracker.current_server(client_id).await;
        let target = self
            .resolver
            .resolve_address(destination, current.as_ref())?;
        self.start_resolved(client_id, target, Trigger::Command).await
    }

    pub async fn abort(&self, client_id: &ClientId, reason: &str) -> Result<TransferRequest> {
        self.tracker.abort(client_id, reason).await
    }

    /// Apply reloaded targets, mappings, messages and the command switch.
    ///
    /// Everything is validated before anything is swapped; on error the
    /// running configuration is untouched. Transfer tuning (ceiling, timeout,
    /// selection) only changes on restart.
    pub async fn reload(&self, config: &AppConfig) -> Result<ReloadSummary> {
        let (set, mappings, messages) = match prepare(config) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Reload rejected, keeping previous configuration: {}", e);
                return Err(e);
            }
        };

        let set = self.registry.replace(set).await;
        let mapping_count = mappings.len();
        *self.mappings.write().await = Arc::new(mappings);
        let default_locale = messages.default_locale().to_string();
        *self.messages.write().await = Arc::new(messages);
        self.command_enabled
            .store(config.command.enabled, Ordering::SeqCst);

        let summary = ReloadSummary {
            targets: set.len(),
            mappings: mapping_count,
            generation: self.registry.generation(),
            command_enabled: config.command.enabled,
            default_locale,
        };
        info!(
            "Configuration reloaded: {} targets, {} mappings (generation {})",
            summary.targets, summary.mappings, summary.generation
        );
        Ok(summary)
    }

    /// Decide the Bedrock destination of a backend-initiated Java transfer
    pub async fn route_server_transfer(&self, java: &Destination) -> MappingDecision {
        let mappings = self.mappings.read().await.clone();
        mappings.route(java)
    }
}

fn prepare(config: &AppConfig) -> Result<(TargetSet, TransferMappings, MessageCatalog)> {
    let set = TargetSet::from_config(&config.targets)?;
    let mappings = TransferMappings::from_config(&config.mappings)?;
    let messages = MessageCatalog::from_config(&config.locale)?;
    Ok((set, mappings, messages))
}

impl Drop for TransferOrchestrator {
    fn drop(&mut self) {
        self.watchdog.stop();
    }
}
