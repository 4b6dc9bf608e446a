//! Resilient element location through ordered selector candidates.
//!
//! Target sites vary their markup across releases and locales, so a single
//! hard-coded selector is brittle. Callers supply a list ordered from most
//! specific to most generic; each poll tick evaluates one in-page probe
//! that checks the candidates in order, and the first match wins. Running
//! out the deadline is a `found = false` result, not an error — whether a
//! missing element is fatal is the caller's decision.

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use pubdrive_core::Config;

use crate::error::Result;
use crate::script::js_string;
use crate::session::PageSession;

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub timeout: Duration,
    pub interval: Duration,
    /// Require a non-zero rendered box and not `display:none`.
    pub require_visible: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            interval: Duration::from_millis(150),
            require_visible: true,
        }
    }
}

impl ResolveOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_millis(config.selector_timeout_ms),
            interval: Duration::from_millis(config.selector_interval_ms),
            require_visible: true,
        }
    }
}

/// Outcome of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorMatch {
    pub found: bool,
    pub matched_selector: Option<String>,
}

impl SelectorMatch {
    fn hit(selector: String) -> Self {
        Self {
            found: true,
            matched_selector: Some(selector),
        }
    }

    fn miss() -> Self {
        Self {
            found: false,
            matched_selector: None,
        }
    }
}

/// Poll the page until one candidate matches, or the deadline passes.
///
/// An empty candidate list is a programming error, not a runtime miss.
pub async fn try_selectors(
    session: &PageSession,
    candidates: &[String],
    opts: &ResolveOptions,
) -> Result<SelectorMatch> {
    assert!(
        !candidates.is_empty(),
        "selector candidate list must not be empty"
    );
    let probe = build_probe(candidates, opts.require_visible);
    let probe = probe.as_str();

    let index = poll_probe(
        || async move {
            let result = session
                .call(
                    "Runtime.evaluate",
                    json!({"expression": probe, "returnByValue": true}),
                )
                .await?;
            let idx = result
                .get("result")
                .and_then(|r| r.get("value"))
                .and_then(|v| v.as_i64())
                .unwrap_or(-1);
            Ok(usize::try_from(idx).ok())
        },
        opts.timeout,
        opts.interval,
    )
    .await?;

    match index {
        Some(i) if i < candidates.len() => {
            debug!(selector = %candidates[i], rank = i, "selector matched");
            Ok(SelectorMatch::hit(candidates[i].clone()))
        }
        _ => Ok(SelectorMatch::miss()),
    }
}

/// The generic poll loop behind [`try_selectors`], factored over the probe
/// so it can be driven by a paused clock in tests.
///
/// Returns no earlier than `timeout` and no later than `timeout` plus one
/// interval when the probe never matches.
pub(crate) async fn poll_probe<F, Fut>(
    mut probe: F,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<usize>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<usize>>>,
{
    let start = tokio::time::Instant::now();
    loop {
        if let Some(index) = probe().await? {
            return Ok(Some(index));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Build the in-page probe: returns the index of the first candidate that
/// matches (and is visible, when required), or -1.
pub fn build_probe(candidates: &[String], require_visible: bool) -> String {
    assert!(
        !candidates.is_empty(),
        "selector candidate list must not be empty"
    );
    let list = candidates
        .iter()
        .map(|s| js_string(s))
        .collect::<Vec<_>>()
        .join(",");
    let visible_check = if require_visible {
        concat!(
            " if (!el.isConnected) continue;",
            " var r = el.getBoundingClientRect();",
            " if (r.width === 0 || r.height === 0) continue;",
            " if (getComputedStyle(el).display === 'none') continue;",
        )
    } else {
        ""
    };
    format!(
        "(function() {{ var sels = [{list}]; \
         for (var i = 0; i < sels.length; i++) {{ \
         var el; try {{ el = document.querySelector(sels[i]); }} catch (e) {{ continue; }} \
         if (!el) continue;{visible_check} return i; }} return -1; }})()"
    )
}
