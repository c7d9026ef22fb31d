//! Java -> Bedrock transfer mappings
//!
//! Backend servers instruct Java-edition transfers. The proxy asks this table
//! which Bedrock address the client should be sent to instead.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::config::MappingConfig;
use crate::domain::{Destination, DEFAULT_BEDROCK_PORT, DEFAULT_JAVA_PORT};
use crate::error::{Result, TransferError};

/// What to do with a backend-initiated transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum MappingDecision {
    /// A configured route matched
    Mapped { bedrock: Destination },
    /// No route matched; the Java address is passed through as-is
    Forwarded { bedrock: Destination },
    /// No route matched and forwarding is off; the host keeps its default
    Unmapped,
}

impl MappingDecision {
    /// Bedrock destination to write back to the host, if any
    pub fn destination(&self) -> Option<&Destination> {
        match self {
            MappingDecision::Mapped { bedrock } | MappingDecision::Forwarded { bedrock } => {
                Some(bedrock)
            }
            MappingDecision::Unmapped => None,
        }
    }
}

impl fmt::Display for MappingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingDecision::Mapped { bedrock } => write!(f, "mapped to {}", bedrock),
            MappingDecision::Forwarded { bedrock } => write!(f, "forwarded to {}", bedrock),
            MappingDecision::Unmapped => write!(f, "no mapping"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferMappings {
    routes: HashMap<Destination, Destination>,
    forward_original_target: bool,
}

impl TransferMappings {
    pub fn from_config(config: &MappingConfig) -> Result<Self> {
        let mut routes = HashMap::with_capacity(config.routes.len());

        for route in &config.routes {
            let from = Destination::parse(&route.from, DEFAULT_JAVA_PORT).map_err(|e| {
                TransferError::Config(format!("mapping from '{}': {}", route.from, e))
            })?;
            let to = Destination::parse(&route.to, DEFAULT_BEDROCK_PORT).map_err(|e| {
                TransferError::Config(format!("mapping to '{}': {}", route.to, e))
            })?;

            if routes.insert(from.clone(), to).is_some() {
                return Err(TransferError::Config(format!(
                    "duplicate mapping for Java server {}",
                    from
                )));
            }
        }

        info!("Registered {} transfer mappings", routes.len());
        Ok(Self {
            routes,
            forward_original_target: config.forward_original_target,
        })
    }

    /// Decide where a Java transfer to `java` lands on Bedrock
    pub fn route(&self, java: &Destination) -> MappingDecision {
        if let Some(bedrock) = self.routes.get(java) {
            debug!("Java server {} mapped to {}", java, bedrock);
            return MappingDecision::Mapped {
                bedrock: bedrock.clone(),
            };
        }

        if self.forward_original_target {
            debug!("Forwarding Java server {} unchanged", java);
            return MappingDecision::Forwarded {
                bedrock: java.clone(),
            };
        }

        debug!("No mapping for Java server {}", java);
        MappingDecision::Unmapped
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
