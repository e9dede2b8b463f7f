//! Controller configuration.
//!
//! Loaded once at startup from a JSON file (every field optional), then
//! optionally adjusted by `VIP_LB_*` environment variables. Defaults
//! describe a three-backend deployment behind `10.0.0.100`.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::backend::{MacAddr, VirtualService};
use crate::domain::routing::BackendTable;
use crate::error::{ConfigError, ConfigResult};
use crate::load_balancer::rules::FlowSettings;
use crate::load_balancer::selector::SelectionPolicy;
use crate::stats::store::{StatsStore, DEFAULT_WINDOW_CAPACITY, MAX_WINDOW_CAPACITY};

/// Environment variable overriding the selection policy name.
pub const ENV_POLICY: &str = "VIP_LB_POLICY";
/// Environment variable overriding the dashboard URL (`off` disables it).
pub const ENV_DASHBOARD_URL: &str = "VIP_LB_DASHBOARD_URL";
/// Environment variable overriding the embedded stats API listen address.
pub const ENV_STATS_LISTEN: &str = "VIP_LB_STATS_LISTEN";
/// Environment variable overriding the log level.
pub const ENV_LOG_LEVEL: &str = "VIP_LB_LOG_LEVEL";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The virtual service clients connect to.
    pub virtual_service: VirtualService,
    /// Backends in selection order.
    pub backends: Vec<BackendConfig>,
    /// Selection policy name; unknown names mean round-robin.
    pub policy: String,
    /// Rule priority and timeouts.
    pub flow: FlowSettings,
    /// Statistics windows and reporting.
    pub stats: StatsConfig,
    /// Dashboard notification settings.
    pub dashboard: DashboardConfig,
    /// Logging settings.
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            virtual_service: VirtualService::new(
                Ipv4Addr::new(10, 0, 0, 100),
                MacAddr::new(0, 0, 0, 0, 0, 0xff),
            ),
            backends: (1..=3u8)
                .map(|i| BackendConfig {
                    address: Ipv4Addr::new(10, 0, 0, i),
                    mac: MacAddr::new(0, 0, 0, 0, 0, i),
                    port: u16::from(i),
                })
                .collect(),
            policy: SelectionPolicy::RoundRobin.as_str().to_string(),
            flow: FlowSettings::default(),
            stats: StatsConfig::default(),
            dashboard: DashboardConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// A single backend entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend address.
    pub address: Ipv4Addr,
    /// Backend link identity.
    pub mac: MacAddr,
    /// Switch port towards the backend.
    pub port: u16,
}

/// Statistics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Response-time samples kept per backend.
    pub window_capacity: usize,
    /// Entries kept in the recent-request log.
    pub recent_capacity: usize,
    /// Seconds between periodic summaries.
    pub report_interval_secs: u64,
    /// Serve the stats API from the controller process on this address.
    pub listen: Option<SocketAddr>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            recent_capacity: DEFAULT_WINDOW_CAPACITY,
            report_interval_secs: 5,
            listen: None,
        }
    }
}

impl StatsConfig {
    /// Interval of the periodic summary.
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

/// Where and how decisions are pushed to the dashboard API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Base URL of the stats API; `None` disables notifications.
    pub url: Option<String>,
    /// Per-notification timeout in milliseconds.
    pub timeout_ms: u64,
    /// Pending notifications kept before new ones are dropped.
    pub queue_depth: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            url: Some("http://localhost:8080".to_string()),
            timeout_ms: 1000,
            queue_depth: 256,
        }
    }
}

impl DashboardConfig {
    /// Per-notification timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Check the configuration is something the controller can run with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.backend_table()?;

        if self
            .backends
            .iter()
            .any(|b| b.address == self.virtual_service.address)
        {
            return Err(invalid(
                "backends",
                format!("{} is the virtual address", self.virtual_service.address),
            ));
        }
        for (field, capacity) in [
            ("stats.window_capacity", self.stats.window_capacity),
            ("stats.recent_capacity", self.stats.recent_capacity),
        ] {
            if !(1..=MAX_WINDOW_CAPACITY).contains(&capacity) {
                return Err(invalid(
                    field,
                    format!("must be between 1 and {MAX_WINDOW_CAPACITY}, got {capacity}"),
                ));
            }
        }
        if self.stats.report_interval_secs == 0 {
            return Err(invalid("stats.report_interval_secs", "must be at least 1"));
        }
        if self.flow.idle_timeout != 0
            && self.flow.hard_timeout != 0
            && self.flow.hard_timeout < self.flow.idle_timeout
        {
            return Err(invalid("flow.hard_timeout", "must not be shorter than idle_timeout"));
        }
        if let Some(url) = &self.dashboard.url {
            if !url.starts_with("http://") {
                return Err(invalid("dashboard.url", format!("'{url}' is not an http:// URL")));
            }
        }
        if self.dashboard.queue_depth == 0 {
            return Err(invalid("dashboard.queue_depth", "must be at least 1"));
        }

        Ok(())
    }

    /// Build the static backend table.
    pub fn backend_table(&self) -> ConfigResult<BackendTable> {
        BackendTable::new(self.backends.iter().map(|b| (b.address, b.mac, b.port)))
    }

    /// Base URL decisions are pushed to, if any.
    ///
    /// The embedded stats API already serves the engine's own store, so no
    /// URL is returned while `stats.listen` is set.
    pub fn notification_url(&self) -> Option<&str> {
        match self.stats.listen {
            Some(_) => None,
            None => self.dashboard.url.as_deref(),
        }
    }

    /// Resolve the configured policy name.
    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy::from_name(&self.policy)
    }

    /// A fresh statistics store sized by this configuration.
    pub fn stats_store(&self, backends: &BackendTable) -> StatsStore {
        StatsStore::with_capacity(
            backends,
            self.stats.window_capacity,
            self.stats.recent_capacity,
        )
    }

    /// Apply `VIP_LB_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(policy) = lookup(ENV_POLICY) {
            debug!("Policy overridden to {}", policy);
            self.policy = policy;
        }

        if let Some(url) = lookup(ENV_DASHBOARD_URL) {
            self.dashboard.url = match url.trim() {
                "" | "off" | "none" => None,
                other => Some(other.to_string()),
            };
            debug!("Dashboard URL overridden to {:?}", self.dashboard.url);
        }

        if let Some(listen) = lookup(ENV_STATS_LISTEN) {
            let addr = listen.parse().map_err(|_| ConfigError::EnvError {
                name: ENV_STATS_LISTEN.into(),
                reason: format!("Invalid socket address: {listen}"),
            })?;
            self.stats.listen = Some(addr);
            debug!("Stats listen address overridden to {}", addr);
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level;
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Load configuration from a JSON file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        "Configuration loaded: {} backends, policy={}",
        config.backends.len(),
        config.policy
    );

    Ok(config)
}

/// Load configuration from a JSON string.
pub fn load_config_str(json: &str) -> ConfigResult<Config> {
    let config: Config =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Load configuration from a file (or defaults when `path` is `None`) and
/// apply environment overrides.
pub fn load_config_with_env(path: Option<&Path>) -> ConfigResult<Config> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;

    Ok(config)
}

/// Render the default configuration as pretty JSON.
pub fn default_config_json() -> ConfigResult<String> {
    serde_json::to_string_pretty(&Config::default())
        .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {e}")))
}
