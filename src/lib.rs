pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod host;
pub mod locale;
pub mod mapping;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod surface;
pub mod tracker;
pub mod watchdog;

pub use config::AppConfig;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use domain::{
    AttemptOutcome, ClientId, Destination, Resolution, SessionState, TransferRequest,
    TransferSession, TransferStatus, TransferTarget, Trigger,
};
pub use error::{HostError, Result, TransferError};
pub use host::{SimulatedHost, SimulatedResponse, TransferAck, TransferHost};
pub use locale::MessageCatalog;
pub use mapping::{MappingDecision, TransferMappings};
pub use orchestrator::{ReloadSummary, TransferOrchestrator};
pub use registry::{TargetRegistry, TargetSet};
pub use resolver::{Resolver, SelectionPolicy};
pub use surface::{CommandReply, CommandSource, HostEventHandler, ReloadCommand, TransferCommand};
pub use tracker::{TrackerConfig, TransferTicket, TransferTracker};
pub use watchdog::{TimeoutWatchdog, WatchdogConfig};
