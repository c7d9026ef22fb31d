//! Dispatcher
//!
//! The only caller of the host transfer capability. Each attempt is sent with
//! a bounded wait and its outcome is always handed to the tracker; the
//! dispatcher re-sends only what the tracker returns as a retry.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::domain::{AttemptOutcome, Resolution, TransferRequest};
use crate::error::{HostError, Result, TransferError};
use crate::host::TransferHost;
use crate::resolver::Resolver;
use crate::tracker::TransferTracker;

/// What happened to one sent attempt
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub request: TransferRequest,
    pub outcome: AttemptOutcome,
    pub resolution: Resolution,
}

impl DispatchReport {
    /// Host-side error of this attempt, if any
    pub fn error(&self) -> Option<TransferError> {
        match &self.outcome {
            AttemptOutcome::Confirmed => None,
            AttemptOutcome::Rejected(reason) => Some(TransferError::HostRejected(reason.clone())),
            AttemptOutcome::Unavailable(reason) => {
                Some(TransferError::HostUnavailable(reason.clone()))
            }
            AttemptOutcome::TimedOut { after_ms } => Some(TransferError::Timeout {
                elapsed_ms: *after_ms,
            }),
            AttemptOutcome::Aborted(reason) => Some(TransferError::Other(anyhow::anyhow!(
                "aborted: {}",
                reason
            ))),
        }
    }
}

pub struct Dispatcher {
    host: Arc<dyn TransferHost>,
    tracker: Arc<TransferTracker>,
    resolver: Arc<Resolver>,
    fallback_enabled: bool,
}

impl Dispatcher {
    pub fn new(
        host: Arc<dyn TransferHost>,
        tracker: Arc<TransferTracker>,
        resolver: Arc<Resolver>,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            host,
            tracker,
            resolver,
            fallback_enabled,
        }
    }

    pub fn tracker(&self) -> &Arc<TransferTracker> {
        &self.tracker
    }

    /// Send one attempt and report its outcome to the tracker
    pub async fn send(&self, request: &TransferRequest) -> Result<DispatchReport> {
        let timeout = self.tracker.attempt_timeout();
        let started = Instant::now();

        debug!(
            "Dispatching transfer {} attempt {}: {} -> {}",
            request.transfer_id, request.attempt, request.client_id, request.target
        );

        let reply = tokio::time::timeout(
            timeout,
            self.host
                .transfer(&request.client_id, &request.target.destination),
        )
        .await;

        let outcome = match reply {
            Ok(Ok(_ack)) => AttemptOutcome::Confirmed,
            Ok(Err(HostError::Rejected(reason))) => AttemptOutcome::Rejected(reason),
            Ok(Err(HostError::Unavailable(reason))) => AttemptOutcome::Unavailable(reason),
            Err(_) => AttemptOutcome::TimedOut {
                after_ms: started.elapsed().as_millis() as u64,
            },
        };

        let resolution = self.settle(request, outcome.clone()).await?;

        Ok(DispatchReport {
            request: request.clone(),
            outcome,
            resolution,
        })
    }

    /// Hand an outcome to the tracker, offering a fallback target on failure
    async fn settle(&self, request: &TransferRequest, outcome: AttemptOutcome) -> Result<Resolution> {
        let fallback = if !outcome.is_success()
            && self.fallback_enabled
            && request.trigger.is_fallback_eligible()
        {
            let current = self.tracker.current_server(&request.client_id).await;
            self.resolver
                .fallback_after(&request.target, current.as_ref())
                .await
        } else {
            None
        };

        self.tracker
            .report_outcome(
                &request.client_id,
                request.transfer_id,
                request.attempt,
                outcome,
                fallback,
            )
            .await
    }

    /// Drive a transfer run on its own task.
    ///
    /// The run continues even if whoever triggered it goes away.
    pub fn dispatch(self: &Arc<Self>, request: TransferRequest) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.run(request).await })
    }

    async fn run(&self, mut request: TransferRequest) {
        loop {
            match self.send(&request).await {
                Ok(report) => match report.resolution {
                    Resolution::Retry(next) => request = next,
                    Resolution::Stale => {
                        debug!(
                            "Transfer {} attempt {} superseded, run handed off",
                            request.transfer_id, request.attempt
                        );
                        break;
                    }
                    Resolution::Confirmed(_) | Resolution::Failed(_) => break,
                },
                Err(e) => {
                    error!(
                        "Transfer {} attempt {} could not be settled: {}",
                        request.transfer_id, request.attempt, e
                    );
                    break;
                }
            }
        }
    }

    /// Report every overdue attempt as timed out and dispatch the retries.
    ///
    /// Returns the number of attempts expired.
    pub async fn expire_overdue(self: &Arc<Self>) -> usize {
        let overdue = self.tracker.overdue().await;
        let after_ms = self.tracker.attempt_timeout().as_millis() as u64;
        let mut expired = 0;

        for request in overdue {
            match self
                .settle(&request, AttemptOutcome::TimedOut { after_ms })
                .await
            {
                Ok(Resolution::Stale) => {}
                Ok(Resolution::Retry(next)) => {
                    expired += 1;
                    self.dispatch(next);
                }
                Ok(_) => expired += 1,
                Err(e) => warn!(
                    "Failed to expire transfer {} for {}: {}",
                    request.transfer_id, request.client_id, e
                ),
            }
        }

        expired
    }
}
