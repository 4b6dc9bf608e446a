//! Long-horizon readiness polling.
//!
//! Publishing flows block on conditions only a human can clear (QR-code
//! logins, captchas). The poller re-evaluates a predicate on a coarse
//! interval with a long deadline, logging a heartbeat each tick so an
//! operator watching the terminal knows the run is alive, not hung.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use pubdrive_core::Config;

use crate::actions::evaluate;
use crate::error::{EngineError, Result};
use crate::session::PageSession;

/// Where a poll run ended up. `Waiting` is only ever observed between
/// ticks; a finished run is `Ready` or `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Ready,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(300),
        }
    }
}

impl Poller {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_millis(config.login_interval_ms),
            timeout: Duration::from_millis(config.login_timeout_ms),
        }
    }

    /// Re-run `probe` until it reports ready or the deadline passes.
    ///
    /// The predicate decides readiness; this loop only owns pacing and the
    /// deadline. Probe errors propagate immediately (a dead session will
    /// not become ready by itself). Timing out is [`EngineError::PollTimeout`]
    /// whose message tells the operator to finish the manual step and
    /// re-run; the persistent profile makes the second run cheap.
    pub async fn run<F, Fut>(&self, what: &str, mut probe: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let start = tokio::time::Instant::now();
        let mut state = PollState::Waiting;
        let mut tick = 0u64;
        while state == PollState::Waiting {
            if probe().await? {
                state = PollState::Ready;
                break;
            }
            let waited = start.elapsed();
            if waited >= self.timeout {
                state = PollState::TimedOut;
                break;
            }
            tick += 1;
            info!(what, tick, waited_secs = waited.as_secs(), "still waiting");
            tokio::time::sleep(self.interval).await;
        }

        match state {
            PollState::Ready => {
                info!(what, ticks = tick + 1, "condition met");
                Ok(())
            }
            _ => Err(EngineError::PollTimeout {
                what: what.to_string(),
                waited: start.elapsed(),
            }),
        }
    }

    /// Poll an in-page script predicate until it evaluates truthy.
    ///
    /// The usual login check: `script` probes for an element that only
    /// exists once the user is signed in (an avatar, an editor toolbar).
    pub async fn wait_until(&self, session: &PageSession, what: &str, script: &str) -> Result<()> {
        self.run(what, || async move {
            Ok(is_truthy(&evaluate(session, script).await?))
        })
        .await
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_poller() -> Poller {
        Poller {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_truthiness_matches_page_semantics() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("user-42")));
        assert!(is_truthy(&json!({"id": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_tick_returns_promptly() {
        let ticks = AtomicUsize::new(0);
        let start = tokio::time::Instant::now();

        fast_poller()
            .run("login", || {
                let n = ticks.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n >= 2) }
            })
            .await
            .unwrap();

        // Became true on the third probe: after two intervals, before three.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < Duration::from_millis(300));
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_waited_duration() {
        let poller = Poller {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(1),
        };
        let err = poller
            .run("login", || async { Ok(false) })
            .await
            .unwrap_err();
        match err {
            EngineError::PollTimeout { what, waited } => {
                assert_eq!(what, "login");
                assert!(waited >= Duration::from_secs(1));
                assert!(waited <= Duration::from_millis(1100));
            }
            other => panic!("expected PollTimeout, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_message_suggests_rerun() {
        let poller = Poller {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(300),
        };
        let err = poller
            .run("zenn login", || async { Ok(false) })
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("zenn login"));
        assert!(msg.contains("re-run"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_stops_polling() {
        let ticks = AtomicUsize::new(0);
        let err = fast_poller()
            .run("login", || {
                ticks.fetch_add(1, Ordering::SeqCst);
                async { Err::<bool, _>(EngineError::ConnectionClosed) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConnectionClosed));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }
}
