//! Target discovery and session attachment.
//!
//! Picks the page target of interest (by URL hint, falling back to the
//! newest page so a freshly opened tab is still found), attaches in
//! flattened mode so the sessionId rides on every later command, and
//! enables the domains the rest of the engine relies on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cdp::CdpConnection;
use crate::error::{EngineError, Result};

/// How long to keep re-listing targets before giving up. New tabs can take
/// a moment to register after launch.
const ATTACH_ATTEMPTS: u32 = 10;
const ATTACH_RETRY_DELAY: Duration = Duration::from_millis(300);

/// A logical attachment to one page target.
///
/// Commands are only valid while the target is alive: once the browser
/// reports the session detached, every later call fails with
/// [`EngineError::SessionInvalidated`] instead of hanging.
pub struct PageSession {
    conn: Arc<CdpConnection>,
    pub session_id: String,
    pub target_id: String,
    invalidated: Arc<AtomicBool>,
}

impl PageSession {
    /// Issue a command scoped to this session.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Err(EngineError::SessionInvalidated {
                target_id: self.target_id.clone(),
            });
        }
        self.conn
            .call_on_session(method, params, &self.session_id)
            .await
    }

    pub fn connection(&self) -> &CdpConnection {
        &self.conn
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }
}

/// Discover a page target, attach to it, and enable the inspection domains.
///
/// Selection: the first `type == "page"` target whose URL contains
/// `url_hint`; with no hint (or no hit) the most recently created page
/// wins. Failure to find any page target is [`EngineError::NoPageTarget`],
/// distinct from transport errors, so callers may retry attachment without
/// relaunching the browser.
pub async fn get_page_session(
    conn: Arc<CdpConnection>,
    url_hint: Option<&str>,
) -> Result<PageSession> {
    let target = find_page_target(&conn, url_hint).await?;
    let target_id = target
        .get("targetId")
        .and_then(|v| v.as_str())
        .ok_or(EngineError::NoPageTarget {
            hint: url_hint.map(|s| s.to_string()),
        })?
        .to_string();

    let attached = conn
        .call(
            "Target.attachToTarget",
            json!({"targetId": target_id, "flatten": true}),
        )
        .await?;
    let session_id = attached
        .get("sessionId")
        .and_then(|v| v.as_str())
        .ok_or(EngineError::NoPageTarget {
            hint: url_hint.map(|s| s.to_string()),
        })?
        .to_string();

    info!(target = %target_id, session = %session_id, "attached to page target");

    for method in ["Page.enable", "Runtime.enable", "DOM.enable"] {
        conn.call_on_session(method, json!({}), &session_id).await?;
    }

    let invalidated = Arc::new(AtomicBool::new(false));
    watch_for_detach(&conn, &session_id, invalidated.clone()).await;

    Ok(PageSession {
        conn,
        session_id,
        target_id,
        invalidated,
    })
}

async fn find_page_target(conn: &CdpConnection, url_hint: Option<&str>) -> Result<Value> {
    for attempt in 0..ATTACH_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(ATTACH_RETRY_DELAY).await;
        }

        let result = conn.call("Target.getTargets", json!({})).await?;
        let infos = result
            .get("targetInfos")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let pages: Vec<&Value> = infos
            .iter()
            .filter(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
            .collect();

        if let Some(hint) = url_hint {
            if let Some(hit) = pages.iter().find(|t| {
                t.get("url")
                    .and_then(|v| v.as_str())
                    .is_some_and(|u| u.contains(hint))
            }) {
                return Ok((**hit).clone());
            }
        }

        // Newest page target last in the list; tolerate the browser having
        // opened a fresh tab after launch.
        if let Some(last) = pages.last() {
            if url_hint.is_none() || attempt + 1 == ATTACH_ATTEMPTS {
                return Ok((**last).clone());
            }
        }

        debug!(attempt, "no matching page target yet");
    }

    Err(EngineError::NoPageTarget {
        hint: url_hint.map(|s| s.to_string()),
    })
}

/// Flip the session's invalidated flag when the browser detaches it.
async fn watch_for_detach(conn: &CdpConnection, session_id: &str, flag: Arc<AtomicBool>) {
    let (_listener, mut rx) = conn.subscribe("Target.detachedFromTarget", None).await;
    let session_id = session_id.to_string();
    tokio::spawn(async move {
        while let Some(params) = rx.recv().await {
            if params.get("sessionId").and_then(|v| v.as_str()) == Some(session_id.as_str()) {
                debug!(session = %session_id, "session detached from target");
                flag.store(true, Ordering::SeqCst);
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{stub_endpoint, targets_reply};

    #[tokio::test]
    async fn test_attaches_to_hinted_target_quickly() {
        let url = stub_endpoint(|method, _params, _session| match method {
            "Target.getTargets" => targets_reply(&[
                ("T-OLD", "https://example.com/"),
                ("T-ZENN", "https://zenn.dev/articles/new"),
            ]),
            "Target.attachToTarget" => json!({"sessionId": "SESS-1"}),
            _ => json!({}),
        })
        .await;

        let conn = Arc::new(
            CdpConnection::connect(&url, Duration::from_secs(2))
                .await
                .unwrap(),
        );

        let start = std::time::Instant::now();
        let session = get_page_session(conn, Some("zenn.dev")).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(session.target_id, "T-ZENN");
        assert_eq!(session.session_id, "SESS-1");
        assert!(!session.is_invalidated());
    }

    #[tokio::test]
    async fn test_falls_back_to_newest_page_without_hint() {
        let url = stub_endpoint(|method, _params, _session| match method {
            "Target.getTargets" => targets_reply(&[
                ("T-FIRST", "about:blank"),
                ("T-NEWEST", "https://juejin.cn/editor"),
            ]),
            "Target.attachToTarget" => json!({"sessionId": "SESS-2"}),
            _ => json!({}),
        })
        .await;

        let conn = Arc::new(
            CdpConnection::connect(&url, Duration::from_secs(2))
                .await
                .unwrap(),
        );
        let session = get_page_session(conn, None).await.unwrap();
        assert_eq!(session.target_id, "T-NEWEST");
    }

    #[tokio::test]
    async fn test_no_page_target_is_distinct_error() {
        let url = stub_endpoint(|method, _params, _session| match method {
            "Target.getTargets" => json!({"targetInfos": []}),
            _ => json!({}),
        })
        .await;

        let conn = Arc::new(
            CdpConnection::connect(&url, Duration::from_secs(2))
                .await
                .unwrap(),
        );
        let err = get_page_session(conn, Some("zenn.dev")).await.err().unwrap();
        assert!(matches!(err, EngineError::NoPageTarget { .. }));
    }

    #[tokio::test]
    async fn test_session_calls_carry_session_id() {
        let url = stub_endpoint(|method, _params, session| match method {
            "Target.getTargets" => targets_reply(&[("T1", "https://zenn.dev/")]),
            "Target.attachToTarget" => json!({"sessionId": "SESS-9"}),
            "Runtime.evaluate" => {
                assert_eq!(session, Some("SESS-9"));
                json!({"result": {"value": 42}})
            }
            _ => json!({}),
        })
        .await;

        let conn = Arc::new(
            CdpConnection::connect(&url, Duration::from_secs(2))
                .await
                .unwrap(),
        );
        let session = get_page_session(conn, None).await.unwrap();
        let result = session
            .call("Runtime.evaluate", json!({"expression": "42"}))
            .await
            .unwrap();
        assert_eq!(result["result"]["value"], 42);
    }
}
