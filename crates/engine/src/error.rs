use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the automation engine.
///
/// The taxonomy separates failures the caller can react to differently:
/// launch failures are fatal, a call timeout does not kill the connection,
/// and target/session failures can be retried without relaunching the
/// browser. A selector that never matched is NOT an error (the resolver
/// returns `found = false`); `ElementNotFound` only appears when an
/// interaction demanded an element that was not there.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("browser launch failed: {reason}")]
    LaunchFailed { reason: String },

    #[error("failed to connect to debugging endpoint {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The connection was closed (explicitly or by the browser). Calls
    /// issued afterwards fail with this immediately rather than hanging.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("command '{method}' timed out after {timeout:?}")]
    CallTimeout { method: String, timeout: Duration },

    /// The browser answered a command with a protocol-level error.
    #[error("protocol error {code} on '{method}': {message}")]
    CdpError {
        method: String,
        code: i64,
        message: String,
    },

    /// No attachable page target was found. Distinct from transport
    /// failures so callers can retry attachment instead of relaunching.
    #[error("no attachable page target (hint: {hint:?})")]
    NoPageTarget { hint: Option<String> },

    #[error("session detached from target {target_id}")]
    SessionInvalidated { target_id: String },

    #[error("script exception: {message}")]
    JsException { message: String },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    /// The readiness/login poller ran out its deadline.
    #[error("condition '{what}' not met after {waited:?}; complete the manual step and re-run")]
    PollTimeout { what: String, waited: Duration },

    /// Both the primary and the fallback strategy for one logical action
    /// failed. Carries both causes so neither is swallowed.
    #[error("action '{action}' failed (primary: {primary}; fallback: {fallback}{})",
            .screenshot.as_ref().map(|p| format!("; screenshot: {}", p.display())).unwrap_or_default())]
    ActionFailed {
        action: String,
        primary: Box<EngineError>,
        fallback: Box<EngineError>,
        screenshot: Option<PathBuf>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_error_is_distinguishable_from_timeout() {
        let closed = EngineError::ConnectionClosed;
        let timeout = EngineError::CallTimeout {
            method: "Page.navigate".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(matches!(closed, EngineError::ConnectionClosed));
        assert!(!matches!(timeout, EngineError::ConnectionClosed));
        assert!(timeout.to_string().contains("Page.navigate"));
    }

    #[test]
    fn test_action_failed_reports_both_causes() {
        let err = EngineError::ActionFailed {
            action: "submit".into(),
            primary: Box::new(EngineError::ElementNotFound {
                selector: "button[type=submit]".into(),
            }),
            fallback: Box::new(EngineError::JsException {
                message: "boom".into(),
            }),
            screenshot: Some(PathBuf::from("/tmp/shot.png")),
        };
        let msg = err.to_string();
        assert!(msg.contains("submit"));
        assert!(msg.contains("button[type=submit]"));
        assert!(msg.contains("boom"));
        assert!(msg.contains("/tmp/shot.png"));
    }
}
