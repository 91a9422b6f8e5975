mod env;

pub use env::apply_env_overrides;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "PRESENCE_MONITOR_CONFIG";

/// Complete client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

/// Where the status feed lives
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// host[:port] of the feed server
    #[serde(default = "default_host")]
    pub host: String,
    /// WebSocket endpoint path
    #[serde(default = "default_path")]
    pub path: String,
    /// Use wss:// and https://
    #[serde(default)]
    pub secure: bool,
}

fn default_host() -> String {
    "localhost:8080".to_string()
}

fn default_path() -> String {
    "/ws/status".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            path: default_path(),
            secure: false,
        }
    }
}

impl FeedConfig {
    pub fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.host, self.path)
    }

    /// Base URL of the out-of-band HTTP endpoints
    pub fn http_base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.host)
    }
}

/// Reconnection timing
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Backoff step added per failed attempt
    #[serde(default = "default_increment_ms")]
    pub increment_ms: u64,
    /// Upper bound of the backoff delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Fixed delay of the direct retry after an ordinary drop
    #[serde(default = "default_close_retry_ms")]
    pub close_retry_ms: u64,
    /// Wait after a shutdown close before showing "unavailable"
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_countdown_tick_ms")]
    pub countdown_tick_ms: u64,
}

fn default_increment_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_close_retry_ms() -> u64 {
    5_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_countdown_tick_ms() -> u64 {
    1_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            increment_ms: default_increment_ms(),
            max_delay_ms: default_max_delay_ms(),
            close_retry_ms: default_close_retry_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            countdown_tick_ms: default_countdown_tick_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn increment(&self) -> Duration {
        Duration::from_millis(self.increment_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn close_retry(&self) -> Duration {
        Duration::from_millis(self.close_retry_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }
}

/// Display refresh and diagnostics
#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    /// Coarse re-render period for timestamps and uptime
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Tick of the disconnected-session elapsed clock
    #[serde(default = "default_session_clock_ms")]
    pub session_clock_ms: u64,
    /// Entries kept per diagnostic log category
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
}

fn default_refresh_interval_ms() -> u64 {
    5_000
}

fn default_session_clock_ms() -> u64 {
    1_000
}

fn default_max_log_entries() -> usize {
    100
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            session_clock_ms: default_session_clock_ms(),
            max_log_entries: default_max_log_entries(),
        }
    }
}

impl UiConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn session_clock(&self) -> Duration {
        Duration::from_millis(self.session_clock_ms)
    }
}

impl MonitorConfig {
    /// Periodic timers need a non-zero period
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("reconnect.countdown_tick_ms", self.reconnect.countdown_tick_ms),
            ("ui.refresh_interval_ms", self.ui.refresh_interval_ms),
            ("ui.session_clock_ms", self.ui.session_clock_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<MonitorConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: MonitorConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path))?;
    Ok(config)
}

/// File named by `PRESENCE_MONITOR_CONFIG` (or defaults), then env overrides
pub fn load_from_env() -> Result<MonitorConfig> {
    let mut config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => load_config(&path)?,
        Err(_) => MonitorConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
