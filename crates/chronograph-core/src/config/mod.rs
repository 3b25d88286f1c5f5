//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::decay::{DecayFunction, DecayPolicy, ReinforcementConfig};
use crate::domain::index::IndexConfig;
use crate::domain::temporal::ServiceOptions;

/// Chronograph configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub decay: DecayConfig,
    pub index: IndexSettings,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub function: DecayFunction,
    pub half_life_hours: f64,
    pub minimum_confidence: f64,
    pub preserve_critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_threshold: Option<f64>,
    pub reinforcement_enabled: bool,
    pub reinforcement_bonus: f64,
    pub reinforcement_fade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub cache_enabled: bool,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            function: DecayFunction::Exponential,
            half_life_hours: 720.0,
            minimum_confidence: 0.0,
            preserve_critical: true,
            critical_threshold: None,
            reinforcement_enabled: true,
            reinforcement_bonus: 0.1,
            reinforcement_fade: 0.95,
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_capacity: 1024,
        }
    }
}

const KEYS: [&str; 11] = [
    "decay.function",
    "decay.half_life_hours",
    "decay.minimum_confidence",
    "decay.preserve_critical",
    "decay.critical_threshold",
    "decay.reinforcement_enabled",
    "decay.reinforcement_bonus",
    "decay.reinforcement_fade",
    "index.cache_enabled",
    "index.cache_capacity",
    "storage.journal_path",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("CHRONOGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("chronograph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create config directory: {}", dir.display())
            })?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.decay_policy()?;
        self.reinforcement_config()?;
        if self.index.cache_enabled && self.index.cache_capacity == 0 {
            return Err(anyhow!(
                "index.cache_capacity must be positive while the cache is enabled"
            ));
        }
        Ok(())
    }

    /// Decay policy described by the `decay` section
    pub fn decay_policy(&self) -> anyhow::Result<DecayPolicy> {
        if !self.decay.half_life_hours.is_finite() || self.decay.half_life_hours <= 0.0 {
            return Err(anyhow!("decay.half_life_hours must be a positive number"));
        }
        let half_life = Duration::milliseconds((self.decay.half_life_hours * 3_600_000.0) as i64);
        let policy = DecayPolicy::new(self.decay.function)
            .with_half_life(half_life)
            .with_minimum_confidence(self.decay.minimum_confidence)
            .with_preserve_critical(self.decay.preserve_critical)
            .with_critical_threshold(self.decay.critical_threshold);
        policy.validate().context("Invalid decay configuration")?;
        Ok(policy)
    }

    pub fn reinforcement_config(&self) -> anyhow::Result<ReinforcementConfig> {
        let config = ReinforcementConfig {
            enabled: self.decay.reinforcement_enabled,
            bonus: self.decay.reinforcement_bonus,
            fade: self.decay.reinforcement_fade,
        };
        config.validate().context("Invalid reinforcement configuration")?;
        Ok(config)
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            cache_enabled: self.index.cache_enabled,
            cache_capacity: self.index.cache_capacity,
        }
    }

    /// Everything the temporal service needs from configuration
    pub fn service_options(&self) -> anyhow::Result<ServiceOptions> {
        Ok(ServiceOptions {
            decay: Arc::new(self.decay_policy()?),
            reinforcement: self.reinforcement_config()?,
            index: self.index_config(),
        })
    }

    /// Journal location, falling back to the platform data directory
    pub fn journal_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.storage.journal_path {
            return Ok(path.clone());
        }
        Ok(dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("chronograph")
            .join("journal.jsonl"))
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "decay.function" => Ok(self.decay.function.to_string()),
            "decay.half_life_hours" => Ok(self.decay.half_life_hours.to_string()),
            "decay.minimum_confidence" => Ok(self.decay.minimum_confidence.to_string()),
            "decay.preserve_critical" => Ok(self.decay.preserve_critical.to_string()),
            "decay.critical_threshold" => Ok(self
                .decay
                .critical_threshold
                .map(|t| t.to_string())
                .unwrap_or_else(|| "(not set)".to_string())),
            "decay.reinforcement_enabled" => Ok(self.decay.reinforcement_enabled.to_string()),
            "decay.reinforcement_bonus" => Ok(self.decay.reinforcement_bonus.to_string()),
            "decay.reinforcement_fade" => Ok(self.decay.reinforcement_fade.to_string()),

            "index.cache_enabled" => Ok(self.index.cache_enabled.to_string()),
            "index.cache_capacity" => Ok(self.index.cache_capacity.to_string()),

            "storage.journal_path" => Ok(self
                .storage
                .journal_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `chronograph config show` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    ///
    /// The change is validated before it is applied; on error the
    /// configuration is left untouched.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut updated = self.clone();
        match key {
            "decay.function" => {
                updated.decay.function = DecayFunction::parse(value).ok_or_else(|| {
                    anyhow!(
                        "Invalid decay function: {}. Valid options: exponential, linear, logarithmic, step",
                        value
                    )
                })?;
            }
            "decay.half_life_hours" => {
                updated.decay.half_life_hours = parse_number(key, value)?;
            }
            "decay.minimum_confidence" => {
                updated.decay.minimum_confidence = parse_unit(key, value)?;
            }
            "decay.preserve_critical" => {
                updated.decay.preserve_critical = parse_bool(key, value)?;
            }
            "decay.critical_threshold" => {
                updated.decay.critical_threshold = match value.trim() {
                    "" | "none" | "off" => None,
                    other => Some(parse_unit(key, other)?),
                };
            }
            "decay.reinforcement_enabled" => {
                updated.decay.reinforcement_enabled = parse_bool(key, value)?;
            }
            "decay.reinforcement_bonus" => {
                updated.decay.reinforcement_bonus = parse_unit(key, value)?;
            }
            "decay.reinforcement_fade" => {
                updated.decay.reinforcement_fade = parse_unit(key, value)?;
            }
            "index.cache_enabled" => {
                updated.index.cache_enabled = parse_bool(key, value)?;
            }
            "index.cache_capacity" => {
                updated.index.cache_capacity = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid {} value: {}", key, value))?;
            }
            "storage.journal_path" => {
                updated.storage.journal_path = match value.trim() {
                    "" => None,
                    path => Some(PathBuf::from(path)),
                };
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `chronograph config show` to see available keys.",
                    key
                ));
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// All configuration keys
    pub fn keys() -> &'static [&'static str] {
        &KEYS
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> anyhow::Result<f64> {
    let number: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if !number.is_finite() {
        return Err(anyhow!("{} must be a finite number", key));
    }
    Ok(number)
}

fn parse_unit(key: &str, value: &str) -> anyhow::Result<f64> {
    let number = parse_number(key, value)?;
    if !(0.0..=1.0).contains(&number) {
        return Err(anyhow!("{} must be between 0.0 and 1.0", key));
    }
    Ok(number)
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(anyhow!("Invalid {} value: {} (expected true or false)", key, value)),
    }
}
