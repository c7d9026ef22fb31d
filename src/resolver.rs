//! Resolver
//!
//! Turns a trigger into a concrete target: an explicit name or alias, an
//! address typed by a privileged invoker, or "next available" under the
//! configured selection policy. Never mutates session state.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{Destination, TransferTarget, Trigger};
use crate::error::{Result, TransferError};
use crate::registry::TargetRegistry;

/// How a target is picked when the trigger names none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Only succeed when exactly one target is eligible
    #[default]
    ExplicitOnly,
    /// First eligible target in configuration order
    FirstEligible,
    /// Rotate across eligible targets
    RoundRobin,
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicy::ExplicitOnly => write!(f, "explicit_only"),
            SelectionPolicy::FirstEligible => write!(f, "first_eligible"),
            SelectionPolicy::RoundRobin => write!(f, "round_robin"),
        }
    }
}

pub struct Resolver {
    registry: Arc<TargetRegistry>,
    policy: SelectionPolicy,
    cursor: AtomicUsize,
}

impl Resolver {
    pub fn new(registry: Arc<TargetRegistry>, policy: SelectionPolicy) -> Self {
        Self {
            registry,
            policy,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    /// Resolve a trigger to a target.
    ///
    /// Fails with `NotFound` for an unknown name, `SelfTransferDenied` when the
    /// result would be `current`, and `AmbiguousTarget` when the policy cannot
    /// choose between several eligible targets.
    pub async fn resolve(
        &self,
        trigger: Trigger,
        requested: Option<&str>,
        current: Option<&Destination>,
    ) -> Result<TransferTarget> {
        match requested.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => {
                let target = self.registry.lookup(name).await?;
                deny_self_transfer(&target, current)?;
                debug!("Resolved '{}' to {} ({} trigger)", name, target, trigger);
                Ok(target)
            }
            None => self.select(trigger, current).await,
        }
    }

    /// Wrap a raw address as a one-off target
    pub fn resolve_address(
        &self,
        destination: Destination,
        current: Option<&Destination>,
    ) -> Result<TransferTarget> {
        let target = TransferTarget::ad_hoc(destination);
        deny_self_transfer(&target, current)?;
        Ok(target)
    }

    async fn select(&self, trigger: Trigger, current: Option<&Destination>) -> Result<TransferTarget> {
        let set = self.registry.snapshot().await;
        if set.is_empty() {
            return Err(TransferError::NotFound("no transfer targets configured".into()));
        }

        let eligible: Vec<&TransferTarget> = set
            .all()
            .iter()
            .filter(|t| current.map_or(true, |c| !t.is_at(c)))
            .collect();

        if eligible.is_empty() {
            // Every configured target is the server the client is already on
            return Err(TransferError::SelfTransferDenied {
                target: set.all()[0].name.clone(),
            });
        }

        // Fallback retries always take the deterministic order
        let policy = match trigger {
            Trigger::Fallback => SelectionPolicy::FirstEligible,
            _ => self.policy,
        };

        let chosen = match policy {
            SelectionPolicy::ExplicitOnly if eligible.len() > 1 => {
                return Err(TransferError::AmbiguousTarget {
                    candidates: eligible.iter().map(|t| t.name.clone()).collect(),
                });
            }
            SelectionPolicy::ExplicitOnly | SelectionPolicy::FirstEligible => eligible[0],
            SelectionPolicy::RoundRobin => {
                let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
                eligible[turn % eligible.len()]
            }
        };

        debug!("Selected {} by {} policy ({} trigger)", chosen, policy, trigger);
        Ok(chosen.clone())
    }

    /// Next eligible target after `failed` in configuration order, wrapping.
    /// Never returns `failed` itself or the client's current server.
    pub async fn fallback_after(
        &self,
        failed: &TransferTarget,
        current: Option<&Destination>,
    ) -> Option<TransferTarget> {
        let set = self.registry.snapshot().await;
        let targets = set.all();
        if targets.is_empty() {
            return None;
        }

        let start = targets
            .iter()
            .position(|t| t.name == failed.name)
            .map_or(0, |pos| pos + 1);

        let fallback = (0..targets.len())
            .map(|offset| &targets[(start + offset) % targets.len()])
            .find(|t| {
                t.name != failed.name
                    && !t.is_at(&failed.destination)
                    && current.map_or(true, |c| !t.is_at(c))
            })
            .cloned();

        if let Some(ref target) = fallback {
            debug!("Fallback after {} is {}", failed.name, target);
        }
        fallback
    }
}

fn deny_self_transfer(target: &TransferTarget, current: Option<&Destination>) -> Result<()> {
    match current {
        Some(current) if target.is_at(current) => Err(TransferError::SelfTransferDenied {
            target: target.name.clone(),
        }),
        _ => Ok(()),
    }
}
