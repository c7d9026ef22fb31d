use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::Destination;

/// A named destination clients may be transferred to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferTarget {
    /// Unique registry key (lowercased)
    pub name: String,
    pub destination: Destination,
    /// Alternative names resolving to this target (lowercased)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TransferTarget {
    pub fn new(name: impl AsRef<str>, destination: Destination) -> Self {
        Self {
            name: normalize_name(name.as_ref()),
            destination,
            aliases: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.aliases = aliases
            .into_iter()
            .map(|a| normalize_name(a.as_ref()))
            .collect();
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// One-off target for an address typed by an invoker; named after the address
    pub fn ad_hoc(destination: Destination) -> Self {
        Self::new(destination.to_string(), destination)
    }

    pub fn host(&self) -> &str {
        self.destination.host()
    }

    pub fn port(&self) -> u16 {
        self.destination.port()
    }

    /// Does `name` refer to this target (canonical name or alias)?
    pub fn answers_to(&self, name: &str) -> bool {
        let name = normalize_name(name);
        self.name == name || self.aliases.iter().any(|a| *a == name)
    }

    pub fn is_at(&self, destination: &Destination) -> bool {
        self.destination == *destination
    }
}

impl fmt::Display for TransferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.destination)
    }
}

/// Target names and aliases are matched case-insensitively
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_to_name_and_alias() {
        let target = TransferTarget::new("Survival", Destination::new("h2", 25566).unwrap())
            .with_aliases(["SMP", "vanilla"]);

        assert_eq!(target.name, "survival");
        assert!(target.answers_to("survival"));
        assert!(target.answers_to(" smp "));
        assert!(target.answers_to("VANILLA"));
        assert!(!target.answers_to("lobby"));
    }

    #[test]
    fn test_ad_hoc_target_named_after_address() {
        let target = TransferTarget::ad_hoc(Destination::new("10.0.0.5", 19133).unwrap());
        assert_eq!(target.name, "10.0.0.5:19133");
        assert_eq!(target.to_string(), "10.0.0.5:19133 (10.0.0.5:19133)");
    }
}
