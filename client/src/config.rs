//! Configuration for the sync client.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default cadence of scheduled passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default wait before retrying a failed initial sync.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Configuration for a device's sync client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the sync server (e.g. "http://localhost:3000").
    pub api_url: String,
    /// Interval between scheduled passes.
    pub sync_interval: Duration,
    /// Delay before retrying a failed initial sync.
    pub retry_delay: Duration,
    /// HTTP request timeout.
    pub request_timeout: Duration,
    /// Where the client snapshot is persisted.
    pub state_path: PathBuf,
    /// Trigger a pass right after every local mutation.
    pub push_on_write: bool,
}

impl ClientConfig {
    /// Creates a configuration with defaults for everything but the URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: Duration::from_secs(30),
            state_path: PathBuf::from("tally-state.json"),
            push_on_write: false,
        }
    }

    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("TALLY_API_URL").ok_or(ConfigError::MissingApiUrl)?;
        let mut config = Self::new(api_url.trim_end_matches('/'));

        if let Some(secs) = lookup("TALLY_SYNC_INTERVAL_SECS") {
            config.sync_interval = parse_secs("TALLY_SYNC_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("TALLY_RETRY_DELAY_SECS") {
            config.retry_delay = parse_secs("TALLY_RETRY_DELAY_SECS", &secs)?;
        }
        if let Some(path) = lookup("TALLY_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Sets the interval between scheduled passes.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the initial-sync retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the snapshot path.
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    /// Push immediately after each local mutation.
    pub fn with_push_on_write(mut self, enabled: bool) -> Self {
        self.push_on_write = enabled;
        self
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue(key)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TALLY_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid {0} value")]
    InvalidValue(&'static str),
}
