use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lode_util::errors::LodeError;

/// Registry used when neither the manifest nor the global config names one.
pub const DEFAULT_REGISTRY: &str = "https://index.lode.dev";

/// Global user configuration loaded from `$LODE_HOME/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub registry: RegistryGlobalConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Installer settings from `[install]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
        }
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Retry and timeout settings from `[network]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Total attempts per request, including the first.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_timeout_secs", rename = "timeout-secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_ms", rename = "backoff-ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms", rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            timeout_secs: default_timeout_secs(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based): the initial backoff
    /// doubled per attempt, capped at `max-backoff-ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }
}

fn default_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

/// Default registry from `[registry]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryGlobalConfig {
    #[serde(default = "default_registry")]
    pub url: String,
}

impl Default for RegistryGlobalConfig {
    fn default() -> Self {
        Self {
            url: default_registry(),
        }
    }
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

/// Artifact cache configuration from `[cache]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Defaults to `$LODE_HOME/cache`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load the global configuration, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> miette::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| LodeError::Generic {
            message: format!("Failed to read global config: {e}"),
        })?;
        toml::from_str(&content).map_err(|e| {
            LodeError::Generic {
                message: format!("Failed to parse global config: {e}"),
            }
            .into()
        })
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| dirs_path().join("cache"))
    }
}

/// Returns the lode data directory: `$LODE_HOME`, else `~/.lode/`.
pub fn dirs_path() -> PathBuf {
    if let Ok(home) = std::env::var("LODE_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".lode")
}
