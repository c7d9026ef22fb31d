use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::{ClientId, Destination, TransferRequest, TransferTarget, Trigger};
use crate::error::{Result, TransferError};

/// Transfer session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    /// No transfer in flight
    Idle,
    /// Transfer instruction issued, waiting for the host outcome
    Pending,
    /// Client was handed over to the target
    Confirmed,
    /// Transfer gave up (retry ceiling, timeout or abort)
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Pending => "PENDING",
            SessionState::Confirmed => "CONFIRMED",
            SessionState::Failed => "FAILED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;

        match (self, target) {
            // From Idle
            (Idle, Pending) => true,

            // From Pending
            (Pending, Pending) => true,   // Retry below the ceiling
            (Pending, Confirmed) => true, // Host acknowledged
            (Pending, Failed) => true,    // Ceiling reached or aborted

            // Terminal states are cleared before the next run
            (Confirmed, Idle) => true,
            (Failed, Idle) => true,

            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<SessionState> {
        use SessionState::*;

        match self {
            Idle => vec![Pending],
            Pending => vec![Pending, Confirmed, Failed],
            Confirmed => vec![Idle],
            Failed => vec![Idle],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Confirmed | SessionState::Failed)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SessionState::Pending)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SessionState {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "IDLE" => Ok(SessionState::Idle),
            "PENDING" => Ok(SessionState::Pending),
            "CONFIRMED" => Ok(SessionState::Confirmed),
            "FAILED" => Ok(SessionState::Failed),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

/// Result of one attempt as recorded in the session history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Confirmed,
    Rejected(String),
    Unavailable(String),
    TimedOut { after_ms: u64 },
    Aborted(String),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Confirmed)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Confirmed => write!(f, "confirmed"),
            AttemptOutcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            AttemptOutcome::Unavailable(reason) => write!(f, "host unavailable: {}", reason),
            AttemptOutcome::TimedOut { after_ms } => write!(f, "timed out after {}ms", after_ms),
            AttemptOutcome::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

/// History entry for a finished attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    pub transfer_id: Uuid,
    pub attempt: u32,
    pub run_attempt: u32,
    pub target: String,
    pub destination: Destination,
    pub trigger: Trigger,
    pub outcome: AttemptOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    fn new(request: &TransferRequest, outcome: AttemptOutcome) -> Self {
        Self {
            transfer_id: request.transfer_id,
            attempt: request.attempt,
            run_attempt: request.run_attempt,
            target: request.target.name.clone(),
            destination: request.target.destination.clone(),
            trigger: request.trigger,
            outcome,
            recorded_at: Utc::now(),
        }
    }
}

/// Bounds applied to every session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Maximum attempts per transfer run
    pub retry_ceiling: u32,
    /// Maximum history entries kept per session
    pub history_limit: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            history_limit: 32,
        }
    }
}

/// What a reported outcome did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Run finished successfully; carries the confirmed attempt
    Confirmed(TransferRequest),
    /// Run continues; carries the next attempt to dispatch
    Retry(TransferRequest),
    /// Run gave up; carries the last attempt
    Failed(TransferRequest),
    /// Outcome did not match the current attempt and was ignored
    Stale,
}

/// Per-client bookkeeping of transfer attempts
#[derive(Debug, Clone, Serialize)]
pub struct TransferSession {
    pub client_id: ClientId,
    pub state: SessionState,
    pub current_attempt: Option<TransferRequest>,
    /// Last attempt number handed out in this session
    pub attempts_issued: u32,
    pub history: Vec<OutcomeRecord>,
}

impl TransferSession {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            state: SessionState::Idle,
            current_attempt: None,
            attempts_issued: 0,
            history: Vec::new(),
        }
    }

    fn transition(&mut self, to: SessionState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(TransferError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }

    fn record(&mut self, request: &TransferRequest, outcome: AttemptOutcome, limits: SessionLimits) {
        self.history.push(OutcomeRecord::new(request, outcome));
        if self.history.len() > limits.history_limit {
            let excess = self.history.len() - limits.history_limit;
            self.history.drain(..excess);
        }
    }

    /// Start a new run. A terminal session is cleared back to Idle first.
    pub fn begin(&mut self, client_id: &ClientId, target: TransferTarget, trigger: Trigger) -> Result<TransferRequest> {
        if self.state.is_pending() {
            return Err(TransferError::AlreadyPending {
                client_id: client_id.to_string(),
            });
        }
        if self.state.is_terminal() {
            self.transition(SessionState::Idle)?;
        }

        let request =
            TransferRequest::first(client_id.clone(), target, trigger, self.attempts_issued + 1);
        self.transition(SessionState::Pending)?;
        self.attempts_issued = request.attempt;
        self.current_attempt = Some(request.clone());
        Ok(request)
    }

    /// Apply the outcome of attempt `attempt` of run `transfer_id`.
    ///
    /// A failure below the retry ceiling re-enters Pending with the next
    /// attempt, redirected to `fallback` when the run's trigger allows it.
    pub fn report(
        &mut self,
        transfer_id: Uuid,
        attempt: u32,
        outcome: AttemptOutcome,
        fallback: Option<TransferTarget>,
        limits: SessionLimits,
    ) -> Result<Resolution> {
        let current = match self.current_attempt.as_ref() {
            Some(current) if self.state.is_pending() && current.is_attempt(transfer_id, attempt) => {
                current.clone()
            }
            _ => return Ok(Resolution::Stale),
        };

        let success = outcome.is_success();
        self.record(&current, outcome, limits);

        if success {
            self.transition(SessionState::Confirmed)?;
            self.current_attempt = None;
            return Ok(Resolution::Confirmed(current));
        }

        if current.run_attempt >= limits.retry_ceiling {
            self.transition(SessionState::Failed)?;
            self.current_attempt = None;
            return Ok(Resolution::Failed(current));
        }

        let fallback = fallback.filter(|_| current.trigger.is_fallback_eligible());
        let next = current.next_attempt(fallback);
        self.transition(SessionState::Pending)?;
        self.attempts_issued = next.attempt;
        self.current_attempt = Some(next.clone());
        Ok(Resolution::Retry(next))
    }

    /// Give up on the pending run
    pub fn abort(&mut self, reason: &str, limits: SessionLimits) -> Result<TransferRequest> {
        let current = match self.current_attempt.take() {
            Some(current) if self.state.is_pending() => current,
            other => {
                self.current_attempt = other;
                return Err(TransferError::NotPending {
                    client_id: self.client_id.to_string(),
                });
            }
        };

        self.record(&current, AttemptOutcome::Aborted(reason.to_string()), limits);
        self.transition(SessionState::Failed)?;
        Ok(current)
    }

    /// History entries of one run, oldest first
    pub fn run_history(&self, transfer_id: Uuid) -> impl Iterator<Item = &OutcomeRecord> {
        self.history
            .iter()
            .filter(move |r| r.transfer_id == transfer_id)
    }
}

/// Progress of a transfer run as seen by whoever triggered it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferStatus {
    Pending { target: String, attempt: u32 },
    Confirmed { target: String, attempts: u32 },
    Failed { target: String, attempts: u32, reason: String },
}

impl TransferStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, TransferStatus::Pending { .. })
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, TransferStatus::Confirmed { .. })
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Pending { target, attempt } => {
                write!(f, "transfer to {} pending (attempt {})", target, attempt)
            }
            TransferStatus::Confirmed { target, attempts } => {
                write!(f, "transferred to {} after {} attempt(s)", target, attempts)
            }
            TransferStatus::Failed {
                target,
                attempts,
                reason,
            } => write!(
                f,
                "transfer to {} failed after {} attempt(s): {}",
                target, attempts, reason
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, port: u16) -> TransferTarget {
        TransferTarget::new(name, Destination::new("10.0.0.1", port).unwrap())
    }

    fn limits(retry_ceiling: u32) -> SessionLimits {
        SessionLimits {
            retry_ceiling,
            history_limit: 8,
        }
    }

    fn rejected() -> AttemptOutcome {
        AttemptOutcome::Rejected("full".into())
    }

    #[test]
    fn test_valid_transitions() {
        use SessionState::*;

        assert!(Idle.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Confirmed.can_transition_to(Idle));
        assert!(Failed.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Confirmed));
        assert!(!Idle.can_transition_to(Failed));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Confirmed));
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!(SessionState::try_from("pending").unwrap(), SessionState::Pending);
        assert_eq!(SessionState::try_from("FAILED").unwrap(), SessionState::Failed);
        assert!(SessionState::try_from("INVALID").is_err());
    }

    #[test]
    fn test_begin_rejects_second_pending() {
        let client = ClientId::from("c1");
        let mut session = TransferSession::new(client.clone());

        session.begin(&client, target("lobby", 1), Trigger::Command).unwrap();
        let err = session
            .begin(&client, target("lobby", 1), Trigger::Command)
            .unwrap_err();

        assert!(matches!(err, TransferError::AlreadyPending { .. }));
        assert_eq!(session.state, SessionState::Pending);
        assert_eq!(session.current_attempt.as_ref().unwrap().attempt, 1);
    }

    #[test]
    fn test_success_confirms_and_clears_attempt() {
        let client = ClientId::from("c1");
        let mut session = TransferSession::new(client.clone());
        let req = session.begin(&client, target("lobby", 1), Trigger::Command).unwrap();

        let res = session
            .report(req.transfer_id, 1, AttemptOutcome::Confirmed, None, limits(3))
            .unwrap();

        assert!(matches!(res, Resolution::Confirmed(ref r) if r.attempt == 1));
        assert_eq!(session.state, SessionState::Confirmed);
        assert!(session.current_attempt.is_none());
        assert_eq!(session.history.len(), 1);
    }

    #[test]
    fn test_failures_retry_until_ceiling() {
        let client = ClientId::from("c1");
        let mut session = TransferSession::new(client.clone());
        let req = session.begin(&client, target("lobby", 1), Trigger::Command).unwrap();

        let res = session.report(req.transfer_id, 1, rejected(), None, limits(2)).unwrap();
        let next = match res {
            Resolution::Retry(next) => next,
            other => panic!("expected retry, got {:?}", other),
        };
        assert_eq!(next.attempt, 2);
        assert_eq!(session.state, SessionState::Pending);

        let res = session.report(req.transfer_id, 2, rejected(), None, limits(2)).unwrap();
        assert!(matches!(res, Resolution::Failed(ref r) if r.attempt == 2));
        assert_eq!(session.state, SessionState::Failed);
        assert!(session.current_attempt.is_none());

        let attempts: Vec<u32> = session.run_history(req.transfer_id).map(|r| r.attempt).collect();
        assert_eq!(attempts, vec![1, 2]);
    }

    #[test]
    fn test_stale_outcome_is_ignored() {
        let client = ClientId::from("c1");
        let mut session = TransferSession::new(client.clone());
        let req = session.begin(&client, target("lobby", 1), Trigger::Command).unwrap();
        session.report(req.transfer_id, 1, rejected(), None, limits(3)).unwrap();

        // Late reply for attempt 1
        let res = session
            .report(req.transfer_id, 1, AttemptOutcome::Confirmed, None, limits(3))
            .unwrap();
        assert_eq!(res, Resolution::Stale);
        assert_eq!(session.state, SessionState::Pending);
        assert_eq!(session.history.len(), 1);

        // Unknown run
        let res = session
            .report(Uuid::new_v4(), 2, AttemptOutcome::Confirmed, None, limits(3))
            .unwrap();
        assert_eq!(res, Resolution::Stale);
    }

    #[test]
    fn test_fallback_only_for_eligible_triggers() {
        let client = ClientId::from("c1");

        let mut by_command = TransferSession::new(client.clone());
        let req = by_command.begin(&client, target("lobby", 1), Trigger::Command).unwrap();
        let res = by_command
            .report(req.transfer_id, 1, rejected(), Some(target("hub", 2)), limits(3))
            .unwrap();
        assert!(matches!(res, Resolution::Retry(ref next) if next.target.name == "lobby"));

        let mut automatic = TransferSession::new(client.clone());
        let req = automatic.begin(&client, target("lobby", 1), Trigger::Automatic).unwrap();
        let res = automatic
            .report(req.transfer_id, 1, rejected(), Some(target("hub", 2)), limits(3))
            .unwrap();
        assert!(matches!(
            res,
            Resolution::Retry(ref next) if next.target.name == "hub" && next.trigger == Trigger::Fallback
        ));
    }

    #[test]
    fn test_abort_and_restart() {
        let client = ClientId::from("c1");
        let mut session = TransferSession::new(client.clone());

        assert!(matches!(
            session.abort("operator", limits(3)),
            Err(TransferError::NotPending { .. })
        ));

        let first = session.begin(&client, target("lobby", 1), Trigger::Command).unwrap();
        session.abort("operator", limits(3)).unwrap();
        assert_eq!(session.state, SessionState::Failed);
        assert!(session.current_attempt.is_none());

        let second = session.begin(&client, target("lobby", 1), Trigger::Command).unwrap();
        assert_ne!(second.transfer_id, first.transfer_id);
        assert_eq!(second.attempt, 2);
        assert_eq!(second.run_attempt, 1);
        assert_eq!(session.state, SessionState::Pending);
    }

    #[test]
    fn test_attempt_numbers_span_runs_but_ceiling_is_per_run() {
        let client = ClientId::from("c1");
        let mut session = TransferSession::new(client.clone());

        let first = session.begin(&client, target("lobby", 1), Trigger::Command).unwrap();
        session.report(first.transfer_id, 1, rejected(), None, limits(2)).unwrap();
        let res = session.report(first.transfer_id, 2, rejected(), None, limits(2)).unwrap();
        assert!(matches!(res, Resolution::Failed(ref r) if r.run_attempt == 2));

        let second = session.begin(&client, target("hub", 2), Trigger::Command).unwrap();
        assert_eq!((second.attempt, second.run_attempt), (3, 1));

        // A fresh run gets its own retry budget
        let res = session.report(second.transfer_id, 3, rejected(), None, limits(2)).unwrap();
        assert!(matches!(res, Resolution::Retry(ref next) if next.attempt == 4 && next.run_attempt == 2));

        let numbers: Vec<u32> = session.history.iter().map(|r| r.attempt).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(session.attempts_issued, 4);
    }

    #[test]
    fn test_history_is_bounded() {
        let client = ClientId::from("c1");
        let mut session = TransferSession::new(client.clone());
        let limits = SessionLimits {
            retry_ceiling: 1,
            history_limit: 3,
        };

        for _ in 0..5 {
            let req = session.begin(&client, target("lobby", 1), Trigger::Command).unwrap();
            session
                .report(req.transfer_id, req.attempt, rejected(), None, limits)
                .unwrap();
        }

        assert_eq!(session.history.len(), 3);
    }

    #[test]
    fn test_status_display() {
        let status = TransferStatus::Failed {
            target: "lobby".into(),
            attempts: 2,
            reason: "rejected by host: full".into(),
        };
        assert!(status.is_final());
        assert_eq!(
            status.to_string(),
            "transfer to lobby failed after 2 attempt(s): rejected by host: full"
        );
    }
}
