//! Browser process supervision.
//!
//! Finds a Chrome-family executable, launches it against a persistent
//! profile directory with remote debugging enabled, and polls the HTTP
//! introspection endpoint until the browser is attachable.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use pubdrive_core::Config;

use crate::error::{EngineError, Result};

/// One entry from `GET /json/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub ws_url: Option<String>,
}

/// A launched browser process plus the endpoint it exposes.
///
/// Exactly one per automation run. Teardown is explicit: call [`close`] to
/// terminate the process, or [`keep_open`] to leave the window alive for
/// manual inspection (the failure path does this so an operator can finish
/// a login or see what broke).
///
/// [`close`]: Browser::close
/// [`keep_open`]: Browser::keep_open
pub struct Browser {
    process: Child,
    pub debug_port: u16,
    pub profile_dir: PathBuf,
    /// Browser-level WebSocket URL from `/json/version`.
    pub ws_url: String,
}

impl Browser {
    /// Launch the browser navigated to `initial_url`, persisting state in
    /// `profile_dir`, and wait for the debugging endpoint to come up.
    pub async fn launch(config: &Config, initial_url: &str, profile_dir: &Path) -> Result<Self> {
        let binary = match &config.browser_path {
            Some(path) if Path::new(path).exists() => path.clone(),
            Some(path) => {
                return Err(EngineError::LaunchFailed {
                    reason: format!(
                        "configured browser path does not exist: {path} \
                         (check PUBDRIVE_CHROME_PATH or config.json browserPath)"
                    ),
                })
            }
            None => find_browser_binary().ok_or_else(|| EngineError::LaunchFailed {
                reason: "no Chrome/Chromium found; install one or set PUBDRIVE_CHROME_PATH"
                    .to_string(),
            })?,
        };

        std::fs::create_dir_all(profile_dir)?;

        let debug_port = match config.debug_port {
            Some(port) => port,
            None => find_free_port().await?,
        };

        let args = build_browser_args(debug_port, profile_dir, initial_url);
        info!(
            binary = %binary,
            port = debug_port,
            profile = %profile_dir.display(),
            "launching browser"
        );

        let process = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::LaunchFailed {
                reason: format!("failed to spawn {binary}: {e}"),
            })?;

        let ready_timeout = Duration::from_millis(config.ready_timeout_ms);
        let ws_url = wait_for_endpoint_ready(debug_port, ready_timeout).await?;
        info!(port = debug_port, "debugging endpoint ready");

        Ok(Self {
            process,
            debug_port,
            profile_dir: profile_dir.to_path_buf(),
            ws_url,
        })
    }

    /// List open targets via the HTTP introspection endpoint.
    pub async fn list_targets(&self) -> Result<Vec<TargetInfo>> {
        list_targets(self.debug_port).await
    }

    /// Terminate the browser process. Used on the success path.
    pub async fn close(mut self) {
        if let Err(e) = self.process.kill().await {
            debug!("browser kill failed (may have exited): {}", e);
        }
    }

    /// Release the process without killing it, leaving the window open for
    /// manual inspection. Used on the failure path. Dropping the handle
    /// never kills the process; only [`close`](Browser::close) does.
    pub fn keep_open(self) {
        let pid = self.process.id();
        warn!(?pid, "leaving browser open for manual inspection");
    }
}

/// Build the launch flags: remote debugging, persistent profile, reduced
/// automation fingerprint, and the initial URL last.
pub fn build_browser_args(debug_port: u16, profile_dir: &Path, initial_url: &str) -> Vec<String> {
    vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", profile_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--metrics-recording-only".to_string(),
        "--password-store=basic".to_string(),
        "--window-size=1280,900".to_string(),
        initial_url.to_string(),
    ]
}

/// Find a browser binary via ordered per-OS candidates.
pub fn find_browser_binary() -> Option<String> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Poll `/json/version` with short backoff until the endpoint answers with
/// a WebSocket URL, or fail with launch guidance after `timeout`.
pub async fn wait_for_endpoint_ready(port: u16, timeout: Duration) -> Result<String> {
    let start = std::time::Instant::now();
    let url = format!("http://127.0.0.1:{port}/json/version");

    loop {
        if start.elapsed() > timeout {
            return Err(EngineError::LaunchFailed {
                reason: format!(
                    "browser did not become ready on port {port} within {timeout:?}; \
                     is another instance using the same profile directory?"
                ),
            });
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<serde_json::Value>().await {
                if let Some(ws) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws.to_string());
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Fetch the current target list from `/json/list`.
pub async fn list_targets(port: u16) -> Result<Vec<TargetInfo>> {
    let url = format!("http://127.0.0.1:{port}/json/list");
    let resp = reqwest::get(&url)
        .await
        .map_err(|e| EngineError::ConnectionFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;
    let targets = resp
        .json::<Vec<TargetInfo>>()
        .await
        .map_err(|e| EngineError::ConnectionFailed {
            url,
            reason: format!("bad target list: {e}"),
        })?;
    Ok(targets)
}
