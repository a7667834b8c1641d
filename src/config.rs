use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "FEED_RELAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub fetch: FetchConfig,
    pub relay: RelayConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("feed_relay.db"),
            max_connections: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub process_interval_s: u64,
    pub publish_interval_s: u64,
    /// Feeds worked on at once within one cycle.
    pub max_concurrent_feeds: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            process_interval_s: 120,
            publish_interval_s: 60,
            max_concurrent_feeds: 8,
        }
    }
}

impl SchedulerConfig {
    pub fn process_interval(&self) -> Duration {
        Duration::from_secs(self.process_interval_s.max(1))
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_s.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_s: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_s: 60,
            user_agent: "NostrFeedBot/0.1".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub connect_timeout_s: u64,
    pub publish_timeout_s: u64,
    /// Pause before each message sent to a relay.
    pub publish_delay_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_s: 10,
            publish_timeout_s: 10,
            publish_delay_ms: 1000,
        }
    }
}

impl RelayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_s)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_s)
    }

    pub fn publish_delay(&self) -> Duration {
        Duration::from_millis(self.publish_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Log to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "feed_relay=info,tower_http=warn".to_string(),
            file: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML: {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    /// Returns whether the file was found.
    pub fn load_or_default(path: &Path) -> Result<(Self, bool)> {
        if path.exists() {
            Ok((Self::load(path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }

    /// First CLI argument, else `$FEED_RELAY_CONFIG`, else `config.toml`.
    pub fn resolve_path(arg: Option<String>) -> PathBuf {
        arg.filter(|a| !a.is_empty())
            .or_else(|| std::env::var(CONFIG_ENV).ok().filter(|v| !v.is_empty()))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}
