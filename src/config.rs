//! Client configuration
//!
//! Loaded from environment variables (optionally via `.env`), then
//! overridden by command line flags.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::engine::controller::DEFAULT_RUN_TIMEOUT;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/run";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Full URL of the backend's run endpoint
    pub api_url: String,
    /// Directory holding the durable session file
    pub state_dir: PathBuf,
    /// Time a run may take before it settles as a connection error
    pub run_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            state_dir: default_state_dir(),
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("RUNPAD_API_URL").filter(|v| !v.trim().is_empty()) {
            config.api_url = url.trim().to_string();
        }

        if let Some(dir) = lookup("RUNPAD_STATE_DIR").filter(|v| !v.trim().is_empty()) {
            config.state_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup("RUNPAD_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.run_timeout = Duration::from_secs(secs),
                _ => warn!(
                    "Invalid RUNPAD_TIMEOUT_SECS={:?}, using {}s",
                    raw,
                    config.run_timeout.as_secs()
                ),
            }
        }

        config
    }

    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url {
            self.api_url = url;
        }
        self
    }

    pub fn with_state_dir(mut self, state_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = state_dir {
            self.state_dir = dir;
        }
        self
    }

    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs.filter(|s| *s > 0) {
            self.run_timeout = Duration::from_secs(secs);
        }
        self
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("runpad"))
        .unwrap_or_else(|| PathBuf::from(".runpad"))
}
