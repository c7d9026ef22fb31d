//! Host capability boundary
//!
//! The proxy host is an external collaborator. The core only depends on the
//! traits defined here; `SimulatedHost` stands in for a real proxy in the
//! binary's simulate mode and in tests.

pub mod simulated;
pub mod traits;

pub use simulated::{SimulatedHost, SimulatedResponse};
pub use traits::{TransferAck, TransferHost};

#[cfg(test)]
pub use traits::MockTransferHost;
