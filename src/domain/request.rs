use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::TransferTarget;

/// Opaque identifier of a host client session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What initiated a transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Administrative or player command
    Command,
    /// Host event or external request
    Automatic,
    /// Retry redirected to a fallback target
    Fallback,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Command => "command",
            Trigger::Automatic => "automatic",
            Trigger::Fallback => "fallback",
        }
    }

    /// May a failed attempt be redirected to another target?
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, Trigger::Automatic | Trigger::Fallback)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single transfer attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    /// Shared by every attempt of one transfer run
    pub transfer_id: Uuid,
    pub client_id: ClientId,
    pub target: TransferTarget,
    pub trigger: Trigger,
    /// Attempt number within the client session, strictly increasing across runs
    pub attempt: u32,
    /// 1-based position of this attempt within its run; bounded by the retry ceiling
    pub run_attempt: u32,
    pub issued_at: DateTime<Utc>,
}

impl TransferRequest {
    /// First attempt of a new run, numbered `attempt` within the session
    pub fn first(client_id: ClientId, target: TransferTarget, trigger: Trigger, attempt: u32) -> Self {
        Self {
            transfer_id: Uuid::new_v4(),
            client_id,
            target,
            trigger,
            attempt,
            run_attempt: 1,
            issued_at: Utc::now(),
        }
    }

    /// Next attempt of the same run, optionally redirected to a fallback target
    pub fn next_attempt(&self, fallback: Option<TransferTarget>) -> Self {
        let (target, trigger) = match fallback {
            Some(target) => (target, Trigger::Fallback),
            None => (self.target.clone(), self.trigger),
        };

        Self {
            transfer_id: self.transfer_id,
            client_id: self.client_id.clone(),
            target,
            trigger,
            attempt: self.attempt + 1,
            run_attempt: self.run_attempt + 1,
            issued_at: Utc::now(),
        }
    }

    /// Does a reported outcome refer to this exact attempt?
    pub fn is_attempt(&self, transfer_id: Uuid, attempt: u32) -> bool {
        self.transfer_id == transfer_id && self.attempt == attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Destination;

    fn target(name: &str, port: u16) -> TransferTarget {
        TransferTarget::new(name, Destination::new("127.0.0.1", port).unwrap())
    }

    #[test]
    fn test_next_attempt_keeps_run_identity() {
        let first = TransferRequest::first("c1".into(), target("lobby", 19132), Trigger::Command, 4);
        let second = first.next_attempt(None);

        assert_eq!((first.attempt, first.run_attempt), (4, 1));
        assert_eq!((second.attempt, second.run_attempt), (5, 2));
        assert_eq!(second.transfer_id, first.transfer_id);
        assert_eq!(second.target, first.target);
        assert_eq!(second.trigger, Trigger::Command);
        assert!(second.is_attempt(first.transfer_id, 5));
        assert!(!second.is_attempt(first.transfer_id, 4));
    }

    #[test]
    fn test_fallback_attempt_switches_trigger() {
        let first = TransferRequest::first("c1".into(), target("lobby", 19132), Trigger::Automatic, 1);
        let second = first.next_attempt(Some(target("hub", 19133)));

        assert_eq!(second.target.name, "hub");
        assert_eq!(second.trigger, Trigger::Fallback);
        assert!(second.trigger.is_fallback_eligible());
        assert!(!Trigger::Command.is_fallback_eligible());
    }
}
