//! Transfer Session Tracker
//!
//! Owns one `TransferSession` per client in a concurrent table. Each entry has
//! its own lock, so transitions for one client never wait on another client.
//! Locks are held only while a transition is applied, never across host I/O.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::domain::{
    AttemptOutcome, ClientId, Destination, Resolution, SessionLimits, SessionState,
    TransferRequest, TransferSession, TransferStatus, TransferTarget, Trigger,
};
use crate::error::{Result, TransferError};

/// Configuration for the tracker
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub limits: SessionLimits,
    /// Bounded wait for an outcome after entering Pending
    pub attempt_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            limits: SessionLimits::default(),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&TransferConfig> for TrackerConfig {
    fn from(config: &TransferConfig) -> Self {
        Self {
            limits: SessionLimits {
                retry_ceiling: config.retry_ceiling.max(1),
                history_limit: config.history_limit.max(1),
            },
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
        }
    }
}

/// Session plus the runtime state that does not belong in the record itself
#[derive(Debug)]
struct SessionEntry {
    session: TransferSession,
    current_server: Option<Destination>,
    deadline: Option<Instant>,
    status_tx: Option<watch::Sender<TransferStatus>>,
}

impl SessionEntry {
    fn new(client_id: ClientId, current_server: Option<Destination>) -> Self {
        Self {
            session: TransferSession::new(client_id),
            current_server,
            deadline: None,
            status_tx: None,
        }
    }

    fn publish(&mut self, status: TransferStatus) {
        let finished = status.is_final();
        if let Some(tx) = self.status_tx.as_ref() {
            let _ = tx.send(status);
        }
        if finished {
            self.status_tx = None;
        }
    }
}

/// Handle given to whoever started a transfer run
#[derive(Debug)]
pub struct TransferTicket {
    pub request: TransferRequest,
    status: watch::Receiver<TransferStatus>,
}

impl TransferTicket {
    /// Latest known status
    pub fn status(&self) -> TransferStatus {
        self.status.borrow().clone()
    }

    /// Wait until the run is Confirmed or Failed.
    ///
    /// Dropping the ticket does not affect the run.
    pub async fn wait(mut self) -> TransferStatus {
        loop {
            let status = self.status.borrow_and_update().clone();
            if status.is_final() {
                return status;
            }
            if self.status.changed().await.is_err() {
                let last = self.status.borrow().clone();
                if last.is_final() {
                    return last;
                }
                return TransferStatus::Failed {
                    target: self.request.target.name.clone(),
                    attempts: self.request.run_attempt,
                    reason: "client session closed".to_string(),
                };
            }
        }
    }
}

pub struct TransferTracker {
    config: TrackerConfig,
    sessions: DashMap<ClientId, Arc<Mutex<SessionEntry>>>,
}

impl TransferTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.config.attempt_timeout
    }

    // The map guard is dropped before the entry lock is awaited
    fn entry(&self, client_id: &ClientId) -> Arc<Mutex<SessionEntry>> {
        self.sessions
            .entry(client_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SessionEntry::new(client_id.clone(), None))))
            .value()
            .clone()
    }

    fn existing(&self, client_id: &ClientId) -> Option<Arc<Mutex<SessionEntry>>> {
        self.sessions.get(client_id).map(|e| e.value().clone())
    }

    /// Client connected: create its session (or refresh its current server)
    pub async fn open_session(&self, client_id: &ClientId, current_server: Option<Destination>) {
        let entry = self.entry(client_id);
        let mut entry = entry.lock().await;
        if current_server.is_some() {
            entry.current_server = current_server;
        }
        debug!("Session opened for {}", client_id);
    }

    /// Client disconnected: destroy its session. A pending run ends as failed
    /// and any late host outcome for it is ignored.
    pub async fn close_session(&self, client_id: &ClientId) -> Option<TransferSession> {
        let (_, entry) = self.sessions.remove(client_id)?;
        let mut entry = entry.lock().await;

        if let Some(current) = entry.session.current_attempt.clone() {
            if entry.session.state.is_pending() {
                info!(
                    "Client {} disconnected with transfer to {} pending (attempt {})",
                    client_id, current.target.name, current.attempt
                );
                entry.deadline = None;
                entry.publish(TransferStatus::Failed {
                    target: current.target.name.clone(),
                    attempts: current.run_attempt,
                    reason: "client disconnected".to_string(),
                });
            }
        }

        debug!("Session closed for {}", client_id);
        Some(entry.session.clone())
    }

    /// Client moved to another server outside of this core
    pub async fn set_current_server(&self, client_id: &ClientId, server: Destination) -> Result<()> {
        let entry = self
            .existing(client_id)
            .ok_or_else(|| TransferError::NotFound(format!("session of {}", client_id)))?;
        entry.lock().await.current_server = Some(server);
        Ok(())
    }

    pub async fn current_server(&self, client_id: &ClientId) -> Option<Destination> {
        let entry = self.existing(client_id)?;
        let entry = entry.lock().await;
        entry.current_server.clone()
    }

    /// Idle -> Pending. Fails with `AlreadyPending` while a run is in flight.
    pub async fn begin_transfer(
        &self,
        client_id: &ClientId,
        target: TransferTarget,
        trigger: Trigger,
    ) -> Result<TransferTicket> {
        let entry = self.entry(client_id);
        let mut entry = entry.lock().await;

        let request = entry.session.begin(client_id, target, trigger)?;
        entry.deadline = Some(Instant::now() + self.config.attempt_timeout);

        let (status_tx, status_rx) = watch::channel(TransferStatus::Pending {
            target: request.target.name.clone(),
            attempt: request.run_attempt,
        });
        entry.status_tx = Some(status_tx);

        info!(
            "Transfer {} started: {} -> {} ({} trigger)",
            request.transfer_id, client_id, request.target, trigger
        );

        Ok(TransferTicket {
            request,
            status: status_rx,
        })
    }

    /// Apply the outcome of one attempt.
    ///
    /// Outcomes for attempts that are no longer current (already timed out,
    /// session closed) resolve to `Resolution::Stale` and change nothing.
    pub async fn report_outcome(
        &self,
        client_id: &ClientId,
        transfer_id: Uuid,
        attempt: u32,
        outcome: AttemptOutcome,
        fallback: Option<TransferTarget>,
    ) -> Result<Resolution> {
        let Some(entry) = self.existing(client_id) else {
            debug!("Outcome for {} ignored: no session", client_id);
            return Ok(Resolution::Stale);
        };
        let mut entry = entry.lock().await;

        let reason = outcome.to_string();
        let resolution =
            entry
                .session
                .report(transfer_id, attempt, outcome, fallback, self.config.limits)?;

        match &resolution {
            Resolution::Confirmed(request) => {
                entry.deadline = None;
                entry.current_server = Some(request.target.destination.clone());
                entry.publish(TransferStatus::Confirmed {
                    target: request.target.name.clone(),
                    attempts: request.run_attempt,
                });
                info!(
                    "Transfer {} confirmed: {} -> {} (attempt {})",
                    transfer_id, client_id, request.target, request.attempt
                );
            }
            Resolution::Retry(next) => {
                entry.deadline = Some(Instant::now() + self.config.attempt_timeout);
                entry.publish(TransferStatus::Pending {
                    target: next.target.name.clone(),
                    attempt: next.run_attempt,
                });
                warn!(
                    "Transfer {} attempt {} failed ({}), retrying against {} (attempt {}/{})",
                    transfer_id,
                    attempt,
                    reason,
                    next.target,
                    next.run_attempt,
                    self.config.limits.retry_ceiling
                );
            }
            Resolution::Failed(request) => {
                entry.deadline = None;
                entry.publish(TransferStatus::Failed {
                    target: request.target.name.clone(),
                    attempts: request.run_attempt,
                    reason: reason.clone(),
                });
                warn!(
                    "Transfer {} failed after {} attempt(s): {}",
                    transfer_id, request.run_attempt, reason
                );
            }
            Resolution::Stale => {
                debug!(
                    "Stale outcome for {} (transfer {}, attempt {}): {}",
                    client_id, transfer_id, attempt, reason
                );
            }
        }

        Ok(resolution)
    }

    /// Pending -> Failed on operator request
    pub async fn abort(&self, client_id: &ClientId, reason: &str) -> Result<TransferRequest> {
        let entry = self.existing(client_id).ok_or_else(|| TransferError::NotPending {
            client_id: client_id.to_string(),
        })?;
        let mut entry = entry.lock().await;

        let request = entry.session.abort(reason, self.config.limits)?;
        entry.deadline = None;
        entry.publish(TransferStatus::Failed {
            target: request.target.name.clone(),
            attempts: request.run_attempt,
            reason: format!("aborted: {}", reason),
        });
        warn!(
            "Transfer {} for {} aborted: {}",
            request.transfer_id, client_id, reason
        );
        Ok(request)
    }

    /// Pending attempts whose deadline has passed
    pub async fn overdue(&self) -> Vec<TransferRequest> {
        let entries: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let now = Instant::now();
        let mut due = Vec::new();

        for entry in entries {
            let entry = entry.lock().await;
            if let (Some(deadline), Some(current)) =
                (entry.deadline, entry.session.current_attempt.as_ref())
            {
                if deadline <= now && entry.session.state.is_pending() {
                    due.push(current.clone());
                }
            }
        }

        due
    }

    /// Snapshot of one client's session
    pub async fn session(&self, client_id: &ClientId) -> Option<TransferSession> {
        let entry = self.existing(client_id)?;
        let entry = entry.lock().await;
        Some(entry.session.clone())
    }

    pub async fn state(&self, client_id: &ClientId) -> Option<SessionState> {
        self.session(client_id).await.map(|s| s.state)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn pending_count(&self) -> usize {
        let entries: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut pending = 0;
        for entry in entries {
            if entry.lock().await.session.state.is_pending() {
                pending += 1;
            }
        }
        pending
    }
}
