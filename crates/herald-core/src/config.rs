use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300; // full catalog resync cadence
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_MAX_WORKERS: usize = 25;
pub const DEFAULT_TICK_MILLIS: u64 = 1_000;
pub const DEFAULT_WORKER_PERIOD_SECS: u64 = 3; // per-recipient throttle
pub const DEFAULT_MAX_RETRY: u32 = 3;
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Top-level config (herald.toml + HERALD_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
}

/// Job catalog reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two catalog syncs.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// Upper bound for reading the whole catalog during one sync.
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_secs: u64,
    /// Capacity of the fired-task channel between the cron runtime and the task router.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            sync_timeout_secs: DEFAULT_SYNC_TIMEOUT_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Outbound notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of concurrently running per-recipient workers.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Pool reconciliation cadence in milliseconds.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// Delay between two delayed entries for the same recipient.
    #[serde(default = "default_worker_period")]
    pub worker_period_secs: u64,
    /// Rate-limit retries per delivery unit before the entry is abandoned.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            tick_millis: DEFAULT_TICK_MILLIS,
            worker_period_secs: DEFAULT_WORKER_PERIOD_SECS,
            max_retry: DEFAULT_MAX_RETRY,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}
fn default_sync_timeout() -> u64 {
    DEFAULT_SYNC_TIMEOUT_SECS
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}
fn default_tick_millis() -> u64 {
    DEFAULT_TICK_MILLIS
}
fn default_worker_period() -> u64 {
    DEFAULT_WORKER_PERIOD_SECS
}
fn default_max_retry() -> u32 {
    DEFAULT_MAX_RETRY
}
fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.db", home)
}

impl HeraldConfig {
    /// Load config from a TOML file with HERALD_* env var overrides.
    ///
    /// Uses the explicit path when given, `~/.herald/herald.toml` otherwise.
    /// Nested keys are addressed with a double underscore, e.g.
    /// `HERALD_DISPATCH__MAX_WORKERS=10`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: HeraldConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("HERALD_").split("__"))
            .extract()
            .map_err(|e| crate::error::HeraldError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot work with, e.g. a zero loop period.
    pub fn validate(&self) -> crate::error::Result<()> {
        let periods = [
            ("scheduler.sync_interval_secs", self.scheduler.sync_interval_secs),
            ("dispatch.tick_millis", self.dispatch.tick_millis),
            ("dispatch.worker_period_secs", self.dispatch.worker_period_secs),
        ];
        if let Some((key, _)) = periods.iter().find(|(_, value)| *value == 0) {
            return Err(crate::error::HeraldError::Config(format!(
                "{key} must be greater than zero"
            )));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.toml", home)
}
