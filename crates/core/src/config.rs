use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

/// Engine configuration, built once at startup and passed down explicitly.
///
/// Values come from `config.json` in the data dir when present, with
/// environment overrides applied on top. Nothing in the engine reads the
/// environment directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Browser executable path. Overrides the per-OS candidate search.
    #[serde(default)]
    pub browser_path: Option<String>,

    /// Fixed remote-debugging port. `None` picks an ephemeral free port.
    #[serde(default)]
    pub debug_port: Option<u16>,

    /// How long to wait for the debugging endpoint after spawn.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Default per-command response timeout on the wire protocol.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Selector resolver tick interval.
    #[serde(default = "default_selector_interval_ms")]
    pub selector_interval_ms: u64,

    /// Selector resolver default deadline.
    #[serde(default = "default_selector_timeout_ms")]
    pub selector_timeout_ms: u64,

    /// Login poller tick interval.
    #[serde(default = "default_login_interval_ms")]
    pub login_interval_ms: u64,

    /// Login poller total deadline. Generous: a human may be completing an
    /// SMS or email verification step in the window.
    #[serde(default = "default_login_timeout_ms")]
    pub login_timeout_ms: u64,
}

fn default_ready_timeout_ms() -> u64 {
    10_000
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_selector_interval_ms() -> u64 {
    150
}

fn default_selector_timeout_ms() -> u64 {
    5_000
}

fn default_login_interval_ms() -> u64 {
    3_000
}

fn default_login_timeout_ms() -> u64 {
    300_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_path: None,
            debug_port: None,
            ready_timeout_ms: default_ready_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            selector_interval_ms: default_selector_interval_ms(),
            selector_timeout_ms: default_selector_timeout_ms(),
            login_interval_ms: default_login_interval_ms(),
            login_timeout_ms: default_login_timeout_ms(),
        }
    }
}

impl Config {
    /// Load from `config.json` if present, else defaults; then apply
    /// environment overrides.
    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let mut config = if paths.config_file().exists() {
            Self::load(&paths.config_file())?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("PUBDRIVE_CHROME_PATH") {
            if !path.is_empty() {
                self.browser_path = Some(path);
            }
        }
        if let Ok(port) = std::env::var("PUBDRIVE_DEBUG_PORT") {
            if let Ok(port) = port.parse() {
                self.debug_port = Some(port);
            }
        }
    }
}
