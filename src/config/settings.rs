use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;

use super::defaults;

/// Top-level gateway configuration.
/// Deserializes from a TOML file with `[server]`, `[behaver]` and `[logging]`
/// sections. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "defaults::default_server_config")]
    pub server: ServerConfig,

    #[serde(default = "defaults::default_behaver_config")]
    pub behaver: BehaverConfig,

    #[serde(default = "defaults::default_logging_config")]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject combinations the detectors and sweeper cannot work with.
    pub fn validate(&self) -> Result<()> {
        let b = &self.behaver;
        if b.ipmax > 0 {
            if b.scan_sample < 3 {
                bail!("behaver.scan_sample must be at least 3 (got {})", b.scan_sample);
            }
            if b.scan_matches == 0 || b.scan_matches > b.scan_sample - 2 {
                bail!(
                    "behaver.scan_matches must be between 1 and scan_sample - 2 ({}), got {}",
                    b.scan_sample - 2,
                    b.scan_matches
                );
            }
            if b.history < b.scan_sample {
                bail!(
                    "behaver.history ({}) must hold at least scan_sample ({}) timestamps",
                    b.history,
                    b.scan_sample
                );
            }
            if b.expire == 0 {
                bail!("behaver.expire must be greater than zero");
            }
        }
        if self.server.ipmax > 0 && self.server.refill_ms == 0 {
            bail!("server.refill_ms must be greater than zero when rate limiting is on");
        }
        if self.server.max_body_size == 0 {
            bail!("server.max_body_size must be greater than zero");
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: defaults::default_server_config(),
            behaver: defaults::default_behaver_config(),
            logging: defaults::default_logging_config(),
        }
    }
}

/// Listener, rate-limiter and cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::default_bind")]
    pub bind: String,

    /// Rate-limiter client ceiling. 0 disables rate limiting.
    #[serde(default)]
    pub ipmax: usize,

    /// Token bucket capacity.
    #[serde(default = "defaults::default_ratelimit")]
    pub ratelimit: u32,

    /// One token is added to every bucket per interval.
    #[serde(default = "defaults::default_refill_ms")]
    pub refill_ms: u64,

    /// Response cache ceiling in MB. 0 disables caching.
    #[serde(default)]
    pub cache: u64,

    #[serde(default = "defaults::default_max_connections")]
    pub max_connections: usize,

    /// Largest request body read after admission, in bytes.
    #[serde(default = "defaults::default_max_body_size")]
    pub max_body_size: usize,
}

impl ServerConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_ms)
    }

    pub fn cache_bytes(&self) -> usize {
        usize::try_from(self.cache.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

/// Behavior monitor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BehaverConfig {
    /// Tracking ceiling. 0 disables monitoring.
    #[serde(default = "defaults::default_behaver_ipmax")]
    pub ipmax: usize,

    /// Window length and suspension length, in seconds.
    #[serde(default = "defaults::default_expire")]
    pub expire: u64,

    /// Sweep interval in seconds. 0 disables the sweeper.
    #[serde(default = "defaults::default_cleansecond")]
    pub cleansecond: u64,

    #[serde(default = "defaults::default_notfound_limit")]
    pub notfound_limit: u32,

    #[serde(default = "defaults::default_scan_sample")]
    pub scan_sample: usize,

    #[serde(default = "defaults::default_scan_tolerance")]
    pub scan_tolerance: u64,

    #[serde(default = "defaults::default_scan_matches")]
    pub scan_matches: usize,

    /// Timestamps kept per client.
    #[serde(default = "defaults::default_history")]
    pub history: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    pub level: String,

    /// Diagnostic log file. Empty means stdout only.
    #[serde(default)]
    pub file: String,

    /// Access log file (JSON lines). Empty sends access events to tracing.
    #[serde(default)]
    pub access_log: String,
}
