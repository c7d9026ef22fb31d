use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::resolver::SelectionPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Named transfer destinations, in insertion order
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub mappings: MappingConfig,
    #[serde(default)]
    pub locale: LocaleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ordered `name -> entry` table of transfer targets.
///
/// Kept as a list so the registry can honour configuration order.
#[derive(Debug, Clone, Default)]
pub struct TargetsConfig {
    entries: Vec<(String, TargetEntry)>,
}

impl TargetsConfig {
    pub fn entries(&self) -> &[(String, TargetEntry)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry (used when building configuration in code)
    pub fn with(mut self, name: impl Into<String>, entry: TargetEntry) -> Self {
        self.entries.push((name.into(), entry));
        self
    }
}

impl<'de> Deserialize<'de> for TargetsConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedTargets;

        impl<'de> Visitor<'de> for OrderedTargets {
            type Value = TargetsConfig;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of transfer targets")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((name, entry)) = map.next_entry::<String, TargetEntry>()? {
                    entries.push((name, entry));
                }
                Ok(TargetsConfig { entries })
            }
        }

        deserializer.deserialize_map(OrderedTargets)
    }
}

/// A target is either an address string (`"host[:port]"`) or a full table
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TargetEntry {
    Address(String),
    Detailed(TargetSpec),
}

impl TargetEntry {
    pub fn address(addr: impl Into<String>) -> Self {
        TargetEntry::Address(addr.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetSpec {
    pub host: String,
    /// Bedrock port (default: 19132). Kept wide so range errors are reported
    /// as configuration errors rather than parse failures.
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Maximum attempts per transfer run (the retry ceiling)
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
    /// Bounded wait for a host outcome, in milliseconds
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// How often the timeout watchdog sweeps pending attempts
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Target selection when no name is given
    #[serde(default)]
    pub selection: SelectionPolicy,
    /// Redirect failed automatic transfers to the next eligible target
    #[serde(default = "default_true")]
    pub fallback: bool,
    /// History entries kept per client session
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_retry_ceiling() -> u32 {
    3
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

fn default_sweep_interval_ms() -> u64 {
    250
}

fn default_history_limit() -> usize {
    32
}

fn default_true() -> bool {
    true
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: default_retry_ceiling(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            selection: SelectionPolicy::default(),
            fallback: true,
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandConfig {
    /// Register the player `transfer` command (off unless configured)
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocaleConfig {
    /// Locale for invokers whose own locale has no messages
    #[serde(default = "default_locale")]
    pub default: String,
    /// Directory of `<locale>.toml` message files
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_locale() -> String {
    "en_US".to_string()
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            default: default_locale(),
            directory: None,
        }
    }
}

/// Rewrites applied to backend-initiated (Java edition) server transfers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingConfig {
    /// Pass the Java host/port through when no route matches
    #[serde(default)]
    pub forward_original_target: bool,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    /// Java address, default port 25565
    pub from: String,
    /// Bedrock address, default port 19132
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRANSFERTOOL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRANSFERTOOL__TRANSFER__RETRY_CEILING, etc.)
            .add_source(
                Environment::with_prefix("TRANSFERTOOL")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Parse configuration from an in-memory TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.transfer.retry_ceiling == 0 {
            errors.push("retry_ceiling must be at least 1".to_string());
        }

        if self.transfer.attempt_timeout_ms == 0 {
            errors.push("attempt_timeout_ms must be positive".to_string());
        }

        if self.transfer.sweep_interval_ms == 0 {
            errors.push("sweep_interval_ms must be positive".to_string());
        }

        if self.transfer.history_limit == 0 {
            errors.push("history_limit must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
