//! Event/Command Surface
//!
//! Adapters translating host commands and host events into the transfer
//! pipeline. Host-specific types stay behind the traits defined here.

pub mod command;
pub mod events;

pub use command::{permissions, CommandReply, CommandSource, ReloadCommand, TransferCommand};
pub use events::{HostEventHandler, ServerTransferEvent};
