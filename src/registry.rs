//! Target Registry
//!
//! Holds the named transfer destinations. The whole set is immutable once
//! built and is swapped wholesale on reload, so readers always observe either
//! the previous or the new complete set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{TargetEntry, TargetsConfig};
use crate::domain::{
    check_port, normalize_name, Destination, DestinationError, TransferTarget,
    DEFAULT_BEDROCK_PORT,
};
use crate::error::{Result, TransferError};

/// Validated, immutable set of targets in configuration order
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    targets: Vec<TransferTarget>,
    /// Lowercased name or alias -> position in `targets`
    index: HashMap<String, usize>,
}

impl TargetSet {
    /// Build a set from configuration, rejecting duplicates and bad addresses
    pub fn from_config(config: &TargetsConfig) -> Result<Self> {
        let targets = config
            .entries()
            .iter()
            .map(|(name, entry)| build_target(name, entry))
            .collect::<Result<Vec<_>>>()?;
        Self::from_targets(targets)
    }

    pub fn from_targets(targets: Vec<TransferTarget>) -> Result<Self> {
        let mut index = HashMap::new();

        for (pos, target) in targets.iter().enumerate() {
            if target.name.is_empty() {
                return Err(TransferError::Config("target name must not be blank".into()));
            }

            for key in std::iter::once(&target.name).chain(target.aliases.iter()) {
                if key.is_empty() {
                    return Err(TransferError::Config(format!(
                        "target '{}' has a blank alias",
                        target.name
                    )));
                }
                if let Some(existing) = index.insert(key.clone(), pos) {
                    return Err(TransferError::Config(format!(
                        "duplicate target name '{}' (used by '{}' and '{}')",
                        key, targets[existing].name, target.name
                    )));
                }
            }
        }

        Ok(Self { targets, index })
    }

    pub fn lookup(&self, name: &str) -> Option<&TransferTarget> {
        self.index
            .get(&normalize_name(name))
            .and_then(|pos| self.targets.get(*pos))
    }

    pub fn all(&self) -> &[TransferTarget] {
        &self.targets
    }

    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn build_target(name: &str, entry: &TargetEntry) -> Result<TransferTarget> {
    let invalid = |e: DestinationError| TransferError::Config(format!("target '{}': {}", name, e));

    let target = match entry {
        TargetEntry::Address(addr) => {
            let destination = Destination::parse(addr, DEFAULT_BEDROCK_PORT).map_err(invalid)?;
            TransferTarget::new(name, destination)
        }
        TargetEntry::Detailed(detail) => {
            let port = match detail.port {
                Some(port) => check_port(port).map_err(invalid)?,
                None => DEFAULT_BEDROCK_PORT,
            };
            let destination = Destination::new(&detail.host, port).map_err(invalid)?;
            TransferTarget::new(name, destination)
                .with_aliases(&detail.aliases)
                .with_metadata(detail.metadata.clone())
        }
    };

    Ok(target)
}

/// Shared, reloadable registry of transfer targets
#[derive(Debug, Default)]
pub struct TargetRegistry {
    current: RwLock<Arc<TargetSet>>,
    generation: AtomicU64,
}

impl TargetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(set: TargetSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
            generation: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &TargetsConfig) -> Result<Self> {
        Ok(Self::with_targets(TargetSet::from_config(config)?))
    }

    /// Validate `config` and swap it in. On error the current set is kept.
    pub async fn load(&self, config: &TargetsConfig) -> Result<Arc<TargetSet>> {
        match TargetSet::from_config(config) {
            Ok(set) => Ok(self.replace(set).await),
            Err(e) => {
                warn!("Target reload rejected, keeping previous set: {}", e);
                Err(e)
            }
        }
    }

    /// Atomically replace the whole set
    pub async fn replace(&self, set: TargetSet) -> Arc<TargetSet> {
        let set = Arc::new(set);
        {
            let mut current = self.current.write().await;
            *current = set.clone();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Registered {} transfer targets (generation {})",
            set.len(),
            generation
        );
        set
    }

    /// Current complete set; the read lock is released before returning
    pub async fn snapshot(&self) -> Arc<TargetSet> {
        self.current.read().await.clone()
    }

    pub async fn lookup(&self, name: &str) -> Result<TransferTarget> {
        let set = self.snapshot().await;
        match set.lookup(name) {
            Some(target) => Ok(target.clone()),
            None => {
                debug!("Unknown transfer target '{}'", name);
                Err(TransferError::NotFound(name.trim().to_string()))
            }
        }
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.snapshot().await.lookup(name).is_some()
    }

    pub async fn all(&self) -> Vec<TransferTarget> {
        self.snapshot().await.all().to_vec()
    }

    /// Number of successful loads so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
