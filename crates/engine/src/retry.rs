//! Retry and fallback wrappers around flaky page interactions.
//!
//! Platform editors are moving targets: the preferred strategy for an
//! action (trusted mouse events, a specific selector) can stop working
//! after a site release while a cruder strategy still does. One logical
//! action therefore carries a primary and a fallback; only when both fail
//! does the action fail, and the error keeps both causes.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Pause between a failed primary and its fallback, letting transient page
/// states (an animation, a toast overlay) clear.
const FALLBACK_DELAY: Duration = Duration::from_millis(300);

/// Run `primary`, and on failure run `fallback` after a short pause.
///
/// Primary failure is logged at WARN with the cause and the switch, so a
/// later site breakage shows up in logs before the fallback dies too. When
/// both fail the result is [`EngineError::ActionFailed`] naming the action
/// and carrying both causes; `screenshot` lets callers attach a failure
/// capture taken afterwards.
pub async fn with_fallback<T, P, PF, F, FF>(action: &str, primary: P, fallback: F) -> Result<T>
where
    P: FnOnce() -> PF,
    PF: Future<Output = Result<T>>,
    F: FnOnce() -> FF,
    FF: Future<Output = Result<T>>,
{
    let primary_err = match primary().await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };
    warn!(action, error = %primary_err, "primary strategy failed, trying fallback");
    tokio::time::sleep(FALLBACK_DELAY).await;

    match fallback().await {
        Ok(value) => {
            debug!(action, "fallback strategy succeeded");
            Ok(value)
        }
        Err(fallback_err) => Err(EngineError::ActionFailed {
            action: action.to_string(),
            primary: Box::new(primary_err),
            fallback: Box::new(fallback_err),
            screenshot: None,
        }),
    }
}

/// Attach a failure screenshot path to an [`EngineError::ActionFailed`].
/// Other errors pass through untouched.
pub fn attach_screenshot(err: EngineError, path: PathBuf) -> EngineError {
    match err {
        EngineError::ActionFailed {
            action,
            primary,
            fallback,
            ..
        } => EngineError::ActionFailed {
            action,
            primary,
            fallback,
            screenshot: Some(path),
        },
        other => other,
    }
}

/// Retry `op` up to `attempts` times with a fixed delay between tries.
/// Used for steps that fail transiently (target listing right after
/// launch) rather than structurally.
pub async fn retry<T, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    assert!(attempts > 0);
    let mut last = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(attempt, error = %e, "attempt failed");
                last = Some(e);
            }
        }
    }
    Err(last.unwrap_or(EngineError::ConnectionClosed))
}
