//! Localized player-facing messages
//!
//! Each locale is a TOML table of dotted keys (`commands.transfer.not_found`).
//! Lookups try the invoker's locale, then the configured default, then the
//! bundled en_US messages, and finally return the key itself.

use config::{Config, File, FileFormat};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::LocaleConfig;
use crate::error::Result;

/// Locale of the bundled messages
pub const FALLBACK_LOCALE: &str = "en_us";

const BUNDLED_EN_US: &str = include_str!("../translations/en_US.toml");

/// `en_US`, `en-us` and `EN_US.toml` all name the same locale
pub fn normalize_locale(locale: &str) -> String {
    let locale = locale.trim();
    let locale = locale.strip_suffix(".toml").unwrap_or(locale);
    locale.replace('-', "_").to_lowercase()
}

#[derive(Debug, Clone)]
pub struct MessageCatalog {
    default_locale: String,
    bundled: Config,
    locales: HashMap<String, Config>,
}

impl MessageCatalog {
    /// Only the bundled en_US messages
    pub fn bundled() -> Result<Self> {
        let bundled = Config::builder()
            .add_source(File::from_str(BUNDLED_EN_US, FileFormat::Toml))
            .build()?;

        Ok(Self {
            default_locale: FALLBACK_LOCALE.to_string(),
            bundled,
            locales: HashMap::new(),
        })
    }

    /// Bundled messages plus the locale files of `config.directory`
    pub fn from_config(config: &LocaleConfig) -> Result<Self> {
        let mut catalog = Self::bundled()?;

        if let Some(dir) = config.directory.as_deref() {
            let dir = Path::new(dir);
            if dir.is_dir() {
                let loaded = catalog.load_dir(dir)?;
                info!("Loaded {} locale(s) from {}", loaded, dir.display());
            } else {
                warn!("Locale directory {} not found, using bundled messages", dir.display());
            }
        }

        catalog.set_default_locale(&config.default);
        Ok(catalog)
    }

    /// Add every `<locale>.toml` file in `dir`, replacing locales of the same name
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let messages = Config::builder()
                .add_source(File::from(path.as_path()).format(FileFormat::Toml))
                .build()?;
            debug!("Loaded locale {} from {}", stem, path.display());
            self.locales.insert(normalize_locale(stem), messages);
            loaded += 1;
        }

        Ok(loaded)
    }

    /// Unknown locales fall back to en_US
    pub fn set_default_locale(&mut self, locale: &str) {
        let wanted = normalize_locale(locale);
        if wanted == FALLBACK_LOCALE || self.locales.contains_key(&wanted) {
            self.default_locale = wanted;
        } else {
            warn!(
                "Default locale {} not found, falling back to {}",
                locale, FALLBACK_LOCALE
            );
            self.default_locale = FALLBACK_LOCALE.to_string();
        }
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn has_locale(&self, locale: &str) -> bool {
        let locale = normalize_locale(locale);
        locale == FALLBACK_LOCALE || self.locales.contains_key(&locale)
    }

    /// Message `key` in `locale` (or the default locale when `None`)
    pub fn message(&self, locale: Option<&str>, key: &str) -> String {
        let requested = locale.map(normalize_locale);
        let chain = requested
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.default_locale.as_str()));

        for name in chain {
            if let Some(text) = self.locales.get(name).and_then(|m| m.get_string(key).ok()) {
                return text;
            }
        }

        match self.bundled.get_string(key) {
            Ok(text) => text,
            Err(_) => {
                warn!("No translation found for key {}", key);
                key.to_string()
            }
        }
    }

    /// View bound to one invoker's locale
    pub fn localized(&self, locale: Option<&str>) -> Messages<'_> {
        Messages {
            catalog: self,
            locale: locale.map(str::to_string),
        }
    }
}

/// Messages resolved for a single locale
pub struct Messages<'a> {
    catalog: &'a MessageCatalog,
    locale: Option<String>,
}

impl Messages<'_> {
    pub fn get(&self, key: &str) -> String {
        self.catalog.message(self.locale.as_deref(), key)
    }

    /// Message with `{name}` placeholders filled in
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        args.iter().fold(self.get(key), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), value)
        })
    }
}
