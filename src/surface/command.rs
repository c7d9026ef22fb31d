use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::domain::{
    check_port, ClientId, Destination, DestinationError, TransferStatus, Trigger,
    DEFAULT_BEDROCK_PORT,
};
use crate::error::{Result, TransferError};
use crate::locale::Messages;
use crate::orchestrator::{ReloadSummary, TransferOrchestrator};
use crate::tracker::TransferTicket;

/// Permission nodes checked by the commands
pub mod permissions {
    pub const TRANSFER: &str = "transfertool.command.transfer";
    /// Transfer to arbitrary addresses
    pub const TRANSFER_ANY: &str = "transfertool.command.transfer.any";
    pub const RELOAD: &str = "transfertool.command.reload";

    /// Per-target permission for `transfer <name>`
    pub fn shortcut(name: &str) -> String {
        format!("transfertool.shortcuts.{}", name)
    }
}

/// Whoever invoked a command: a player session or the console
pub trait CommandSource: Send + Sync {
    fn name(&self) -> &str;

    /// Client session of a player invoker; `None` for the console
    fn client_id(&self) -> Option<ClientId>;

    fn has_permission(&self, permission: &str) -> bool;

    fn send_message(&self, message: &str);

    /// Invoker's locale (`en_US`, `de_DE`, ...); `None` uses the default locale
    fn locale(&self) -> Option<&str> {
        None
    }
}

/// Final answer of a command, also sent to the invoker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    pub success: bool,
    pub message: String,
}

impl CommandReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    fn deliver(self, source: &dyn CommandSource) -> Self {
        source.send_message(&self.message);
        self
    }
}

/// `transfer [name | address | host port]`
pub struct TransferCommand {
    core: Arc<TransferOrchestrator>,
}

impl TransferCommand {
    pub const NAME: &'static str = "transfer";

    pub fn new(core: Arc<TransferOrchestrator>) -> Self {
        Self { core }
    }

    /// Command description in the default locale
    pub async fn description(&self) -> String {
        self.core
            .messages()
            .await
            .message(None, "commands.transfer.desc")
    }

    /// Permission nodes to register with the host
    pub async fn permission_nodes(&self) -> Vec<String> {
        let mut nodes = vec![
            permissions::TRANSFER.to_string(),
            permissions::TRANSFER_ANY.to_string(),
        ];
        nodes.extend(
            self.core
                .registry()
                .all()
                .await
                .iter()
                .map(|t| permissions::shortcut(&t.name)),
        );
        nodes
    }

    /// Run the command and wait for the transfer to finish
    pub async fn execute(&self, source: &dyn CommandSource, args: &[&str]) -> CommandReply {
        let catalog = self.core.messages().await;
        let messages = catalog.localized(source.locale());

        // The host cannot unregister commands, so a reload may disable it
        if !self.core.command_enabled() {
            return CommandReply::error(messages.get("commands.not_enabled")).deliver(source);
        }

        let Some(client_id) = source.client_id() else {
            return CommandReply::error(messages.get("commands.players_only")).deliver(source);
        };

        if !source.has_permission(permissions::TRANSFER) {
            return CommandReply::error(messages.get("commands.no_permission")).deliver(source);
        }

        debug!("{} ran transfer {:?}", source.name(), args);

        let started = match args {
            [] => self
                .core
                .request_transfer(&client_id, None, Trigger::Command)
                .await,
            [name] => match self.start_named(source, &messages, &client_id, name).await {
                Ok(ticket) => Ok(ticket),
                Err(reply) => return reply.deliver(source),
            },
            [host, port] => {
                if !source.has_permission(permissions::TRANSFER_ANY) {
                    return CommandReply::error(messages.get("commands.transfer.too_many_args"))
                        .deliver(source);
                }
                match parse_host_port(host, port) {
                    Ok(destination) => self.core.transfer_to_address(&client_id, destination).await,
                    Err(e) => Err(e.into()),
                }
            }
            _ => {
                let count = args.len().to_string();
                let provided = format!("[{}]", args.join(", "));
                return CommandReply::error(format!(
                    "{} {}",
                    messages.format("commands.transfer.unknown_args", &[("count", count.as_str())]),
                    messages.format("commands.transfer.args_provided", &[("args", provided.as_str())])
                ))
                .deliver(source);
            }
        };

        let reply = match started {
            Ok(ticket) => outcome_reply(ticket.wait().await, &messages),
            Err(e) => CommandReply::error(describe(&e, source, &messages)),
        };
        reply.deliver(source)
    }

    /// One argument: a registered name or alias, else an address for
    /// privileged invokers
    async fn start_named(
        &self,
        source: &dyn CommandSource,
        messages: &Messages<'_>,
        client_id: &ClientId,
        name: &str,
    ) -> std::result::Result<TransferTicket, CommandReply> {
        let started = match self.core.registry().lookup(name).await {
            Ok(target) => {
                if !source.has_permission(&permissions::shortcut(&target.name)) {
                    return Err(CommandReply::error(messages.format(
                        "commands.transfer.no_permission",
                        &[("target", target.name.as_str())],
                    )));
                }
                self.core
                    .request_transfer(client_id, Some(&target.name), Trigger::Command)
                    .await
            }
            Err(TransferError::NotFound(_)) if source.has_permission(permissions::TRANSFER_ANY) => {
                let destination = Destination::parse(name, DEFAULT_BEDROCK_PORT)
                    .map_err(|e| CommandReply::error(destination_message(&e, messages)))?;
                self.core.transfer_to_address(client_id, destination).await
            }
            Err(e) => Err(e),
        };
        started.map_err(|e| CommandReply::error(describe(&e, source, messages)))
    }
}

fn parse_host_port(host: &str, port: &str) -> std::result::Result<Destination, DestinationError> {
    let number: i64 = port.trim().parse().map_err(|_| DestinationError::InvalidPort {
        port: port.to_string(),
        input: format!("{} {}", host, port),
    })?;
    Destination::new(host, check_port(number)?)
}

fn outcome_reply(status: TransferStatus, messages: &Messages<'_>) -> CommandReply {
    match status {
        TransferStatus::Confirmed { target, .. } => CommandReply::ok(
            messages.format("commands.transfer.success", &[("target", target.as_str())]),
        ),
        TransferStatus::Failed {
            target,
            attempts,
            reason,
        } => CommandReply::error(messages.format(
            "commands.transfer.failed",
            &[
                ("target", target.as_str()),
                ("attempts", attempts.to_string().as_str()),
                ("reason", reason.as_str()),
            ],
        )),
        pending => CommandReply::error(messages.format(
            "commands.transfer.error",
            &[("reason", pending.to_string().as_str())],
        )),
    }
}

fn destination_message(err: &DestinationError, messages: &Messages<'_>) -> String {
    match err {
        DestinationError::InvalidPort { port, .. } => {
            messages.format("destination.port.invalid", &[("port", port.as_str())])
        }
        DestinationError::PortOutOfRange(port) => {
            messages.format("destination.port.invalid", &[("port", port.to_string().as_str())])
        }
        _ => messages.get("destination.ip.invalid"),
    }
}

/// Player-facing text for a synchronous pipeline error
fn describe(err: &TransferError, source: &dyn CommandSource, messages: &Messages<'_>) -> String {
    match err {
        TransferError::NotFound(name) => {
            messages.format("commands.transfer.not_found", &[("target", name.as_str())])
        }
        TransferError::AmbiguousTarget { candidates } => {
            let allowed: Vec<&str> = candidates
                .iter()
                .filter(|c| source.has_permission(&permissions::shortcut(c)))
                .map(String::as_str)
                .collect();
            if allowed.is_empty() {
                messages.get("commands.transfer.none_available")
            } else {
                messages.format("commands.transfer.choose", &[("targets", allowed.join(", ").as_str())])
            }
        }
        TransferError::SelfTransferDenied { target } => {
            messages.format("commands.transfer.already_connected", &[("target", target.as_str())])
        }
        TransferError::AlreadyPending { .. } => messages.get("commands.transfer.already_pending"),
        TransferError::Destination(e) => destination_message(e, messages),
        other => messages.format("commands.transfer.error", &[("reason", other.to_string().as_str())]),
    }
}

/// `reload`: re-read configuration from disk
pub struct ReloadCommand {
    core: Arc<TransferOrchestrator>,
    config_dir: PathBuf,
}

impl ReloadCommand {
    pub const NAME: &'static str = "reload";

    pub fn new(core: Arc<TransferOrchestrator>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            core,
            config_dir: config_dir.into(),
        }
    }

    /// Command description in the default locale
    pub async fn description(&self) -> String {
        self.core
            .messages()
            .await
            .message(None, "commands.reload.desc")
    }

    pub async fn execute(&self, source: &dyn CommandSource) -> CommandReply {
        if !source.has_permission(permissions::RELOAD) {
            let catalog = self.core.messages().await;
            let messages = catalog.localized(source.locale());
            return CommandReply::error(messages.get("commands.no_permission")).deliver(source);
        }

        info!("{} requested a configuration reload", source.name());

        let result = self.reload().await;

        // Replies use the catalog that is active after the reload
        let catalog = self.core.messages().await;
        let messages = catalog.localized(source.locale());
        let reply = match result {
            Ok(summary) => CommandReply::ok(messages.format(
                "commands.reload.success",
                &[
                    ("targets", summary.targets.to_string().as_str()),
                    ("mappings", summary.mappings.to_string().as_str()),
                ],
            )),
            Err(e) => {
                warn!("Reload from {} failed: {}", self.config_dir.display(), e);
                CommandReply::error(
                    messages.format("commands.reload.failed", &[("reason", e.to_string().as_str())]),
                )
            }
        };
        reply.deliver(source)
    }

    async fn reload(&self) -> Result<ReloadSummary> {
        let config = AppConfig::load_from(&self.config_dir)?;
        self.core.reload(&config).await
    }
}
