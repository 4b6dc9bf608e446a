//! Interaction primitives against an attached page session.
//!
//! Everything here goes through two channels only: `Runtime.evaluate` for
//! in-page scripts and the `Input` domain for trusted events. User text is
//! embedded into scripts exclusively via [`js_string`], so titles and
//! bodies with quotes or newlines cannot break a script.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::script::js_string;
use crate::session::PageSession;

/// Pause after state-changing actions so the page's own handlers run
/// before the next step observes the DOM.
const SETTLE_AFTER_CLICK: Duration = Duration::from_millis(500);
const SETTLE_AFTER_NAVIGATE: Duration = Duration::from_millis(1500);

/// Evaluate a script in the page and return its value.
///
/// A page-side exception becomes [`EngineError::JsException`] with the
/// exception text, never a silent null.
pub async fn evaluate(session: &PageSession, expression: &str) -> Result<Value> {
    let result = session
        .call(
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "returnByValue": true,
                "awaitPromise": true,
            }),
        )
        .await?;

    if let Some(exc) = result.get("exceptionDetails") {
        let message = exc
            .get("exception")
            .and_then(|e| e.get("description"))
            .or_else(|| exc.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("unknown script exception")
            .to_string();
        return Err(EngineError::JsException { message });
    }

    Ok(result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(Value::Null))
}

/// Navigate the page and give it a moment to start loading.
pub async fn navigate(session: &PageSession, url: &str) -> Result<()> {
    session.call("Page.navigate", json!({"url": url})).await?;
    tokio::time::sleep(SETTLE_AFTER_NAVIGATE).await;
    Ok(())
}

pub async fn current_url(session: &PageSession) -> Result<String> {
    let value = evaluate(session, "window.location.href").await?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

pub async fn page_title(session: &PageSession) -> Result<String> {
    let value = evaluate(session, "document.title").await?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Read an element's visible text, or `innerText` of the body when
/// `selector` is `None`.
pub async fn read_text(session: &PageSession, selector: Option<&str>) -> Result<String> {
    let script = match selector {
        Some(sel) => format!(
            "(function() {{ var el = document.querySelector({}); \
             return el ? (el.value !== undefined && el.value !== '' ? el.value : el.innerText) : null; }})()",
            js_string(sel)
        ),
        None => "document.body ? document.body.innerText : ''".to_string(),
    };
    match evaluate(session, &script).await? {
        Value::Null => Err(EngineError::ElementNotFound {
            selector: selector.unwrap_or("body").to_string(),
        }),
        value => Ok(value.as_str().unwrap_or_default().to_string()),
    }
}

/// Click an element with trusted mouse events at its rendered center.
///
/// The element is scrolled into view first and its viewport-space center
/// measured in-page; a missing element (or zero-size box) is
/// [`EngineError::ElementNotFound`]. For React-style widgets that ignore
/// synthetic events this is the primary strategy; [`click_js`] is the
/// scripted fallback.
pub async fn click(session: &PageSession, selector: &str) -> Result<()> {
    let probe = format!(
        "(function() {{ var el = document.querySelector({}); \
         if (!el) return null; \
         el.scrollIntoView({{block: 'center'}}); \
         var r = el.getBoundingClientRect(); \
         if (r.width === 0 || r.height === 0) return null; \
         return {{x: r.left + r.width / 2, y: r.top + r.height / 2}}; }})()",
        js_string(selector)
    );
    let center = evaluate(session, &probe).await?;
    let (x, y) = match (
        center.get("x").and_then(|v| v.as_f64()),
        center.get("y").and_then(|v| v.as_f64()),
    ) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(EngineError::ElementNotFound {
                selector: selector.to_string(),
            })
        }
    };

    debug!(selector, x, y, "dispatching mouse click");
    for event in ["mousePressed", "mouseReleased"] {
        session
            .call(
                "Input.dispatchMouseEvent",
                json!({
                    "type": event,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "clickCount": 1,
                }),
            )
            .await?;
    }

    tokio::time::sleep(SETTLE_AFTER_CLICK).await;
    Ok(())
}

/// Scripted click fallback: `el.click()` in-page. Bypasses hit testing,
/// so it still works when an overlay covers the element.
pub async fn click_js(session: &PageSession, selector: &str) -> Result<()> {
    let script = format!(
        "(function() {{ var el = document.querySelector({}); \
         if (!el) return false; \
         el.scrollIntoView({{block: 'center'}}); el.click(); return true; }})()",
        js_string(selector)
    );
    if evaluate(session, &script).await? != Value::Bool(true) {
        return Err(EngineError::ElementNotFound {
            selector: selector.to_string(),
        });
    }
    tokio::time::sleep(SETTLE_AFTER_CLICK).await;
    Ok(())
}

/// Replace an input's content with `text`.
///
/// Focuses the element, sets the value through the native setter (so
/// framework-managed inputs see the change), then dispatches `input` and
/// `change` so the page's state stays in sync with the DOM.
pub async fn fill(session: &PageSession, selector: &str, text: &str) -> Result<()> {
    let script = format!(
        "(function() {{ var el = document.querySelector({sel}); \
         if (!el) return false; \
         el.focus(); \
         var v = {text}; \
         var proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype \
                   : el instanceof HTMLInputElement ? HTMLInputElement.prototype : null; \
         var desc = proto && Object.getOwnPropertyDescriptor(proto, 'value'); \
         if (desc && desc.set) {{ desc.set.call(el, v); }} \
         else if ('value' in el) {{ el.value = v; }} \
         else {{ el.textContent = v; }} \
         el.dispatchEvent(new Event('input', {{bubbles: true}})); \
         el.dispatchEvent(new Event('change', {{bubbles: true}})); \
         return true; }})()",
        sel = js_string(selector),
        text = js_string(text),
    );
    if evaluate(session, &script).await? != Value::Bool(true) {
        return Err(EngineError::ElementNotFound {
            selector: selector.to_string(),
        });
    }
    Ok(())
}

/// Insert text at the current focus as typed input. Unlike [`fill`] this
/// appends rather than replaces, and goes through the input pipeline so
/// editors with their own key handling (rich-text bodies) accept it.
pub async fn insert_text(session: &PageSession, text: &str) -> Result<()> {
    session
        .call("Input.insertText", json!({"text": text}))
        .await?;
    Ok(())
}

/// Focus an element, then emit the platform paste chord so the page's own
/// paste handler runs against the clipboard contents.
pub async fn paste_into(session: &PageSession, selector: &str) -> Result<()> {
    let script = format!(
        "(function() {{ var el = document.querySelector({}); \
         if (!el) return false; el.focus(); return true; }})()",
        js_string(selector)
    );
    if evaluate(session, &script).await? != Value::Bool(true) {
        return Err(EngineError::ElementNotFound {
            selector: selector.to_string(),
        });
    }
    let chord = if cfg!(target_os = "macos") { "Meta+v" } else { "Ctrl+v" };
    press_key(session, chord).await
}

/// Press a key, optionally with modifiers: `"Enter"`, `"Tab"`, `"Ctrl+a"`.
pub async fn press_key(session: &PageSession, spec: &str) -> Result<()> {
    let key = parse_key_spec(spec);
    for event in ["keyDown", "keyUp"] {
        session
            .call(
                "Input.dispatchKeyEvent",
                json!({
                    "type": event,
                    "key": key.name,
                    "code": key.code,
                    "modifiers": key.modifiers,
                }),
            )
            .await?;
    }
    Ok(())
}

pub async fn scroll_by(session: &PageSession, dx: i64, dy: i64) -> Result<()> {
    evaluate(session, &format!("window.scrollBy({dx}, {dy})")).await?;
    Ok(())
}

/// Capture the viewport as PNG into `media_dir` with a timestamped name.
/// Used for failure diagnostics, so the path goes into the error report.
pub async fn screenshot(session: &PageSession, media_dir: &Path) -> Result<PathBuf> {
    let result = session
        .call("Page.captureScreenshot", json!({"format": "png"}))
        .await?;
    let data = result
        .get("data")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| EngineError::JsException {
            message: format!("bad screenshot payload: {e}"),
        })?;

    std::fs::create_dir_all(media_dir)?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = media_dir.join(format!("failure_{ts}.png"));
    std::fs::write(&path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "screenshot saved");
    Ok(path)
}

/// A parsed key chord for `Input.dispatchKeyEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub name: String,
    pub code: String,
    /// Modifier bitmask: Alt=1, Ctrl=2, Meta=4, Shift=8.
    pub modifiers: i64,
}

/// Parse `"Enter"`, `"Ctrl+a"`, `"Meta+Shift+v"` and the like.
pub fn parse_key_spec(spec: &str) -> KeySpec {
    let parts: Vec<&str> = spec.split('+').collect();
    let mut modifiers = 0i64;
    let main = if parts.len() > 1 {
        for part in &parts[..parts.len() - 1] {
            match part.to_lowercase().as_str() {
                "alt" | "option" => modifiers |= 1,
                "ctrl" | "control" => modifiers |= 2,
                "meta" | "cmd" | "command" => modifiers |= 4,
                "shift" => modifiers |= 8,
                _ => {}
            }
        }
        parts.last().copied().unwrap_or(spec)
    } else {
        spec
    };

    let code = match main {
        "Enter" | "Return" => "Enter".to_string(),
        "Tab" => "Tab".to_string(),
        "Escape" | "Esc" => "Escape".to_string(),
        "Backspace" => "Backspace".to_string(),
        "Delete" => "Delete".to_string(),
        "ArrowUp" | "Up" => "ArrowUp".to_string(),
        "ArrowDown" | "Down" => "ArrowDown".to_string(),
        "ArrowLeft" | "Left" => "ArrowLeft".to_string(),
        "ArrowRight" | "Right" => "ArrowRight".to_string(),
        "Home" => "Home".to_string(),
        "End" => "End".to_string(),
        "PageUp" => "PageUp".to_string(),
        "PageDown" => "PageDown".to_string(),
        "Space" | " " => "Space".to_string(),
        k if k.chars().count() == 1 => format!("Key{}", k.to_uppercase()),
        k => k.to_string(),
    };

    KeySpec {
        name: main.to_string(),
        code,
        modifiers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::CdpConnection;
    use crate::session::get_page_session;
    use crate::testutil::{attach_handler, stub_endpoint};
    use std::sync::Arc;

    #[test]
    fn test_parse_plain_key() {
        let k = parse_key_spec("Enter");
        assert_eq!(k.name, "Enter");
        assert_eq!(k.code, "Enter");
        assert_eq!(k.modifiers, 0);
    }

    #[test]
    fn test_parse_single_char_key() {
        let k = parse_key_spec("a");
        assert_eq!(k.name, "a");
        assert_eq!(k.code, "KeyA");
    }

    #[test]
    fn test_parse_modifier_chords() {
        assert_eq!(parse_key_spec("Ctrl+a").modifiers, 2);
        assert_eq!(parse_key_spec("Meta+v").modifiers, 4);
        assert_eq!(parse_key_spec("Ctrl+Shift+Enter").modifiers, 2 | 8);
        assert_eq!(parse_key_spec("Alt+Tab").modifiers, 1);
        let k = parse_key_spec("Meta+Shift+v");
        assert_eq!(k.name, "v");
        assert_eq!(k.code, "KeyV");
        assert_eq!(k.modifiers, 4 | 8);
    }

    async fn attach_stub<F>(extra: F) -> PageSession
    where
        F: Fn(&str, &Value) -> Value + Send + 'static,
    {
        let url = stub_endpoint(move |method, params, _session| {
            match attach_handler(method, "SESS-ACT", "https://zenn.dev/articles/new") {
                Some(v) => v,
                None => extra(method, params),
            }
        })
        .await;
        let conn = Arc::new(
            CdpConnection::connect(&url, Duration::from_secs(2))
                .await
                .unwrap(),
        );
        get_page_session(conn, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_evaluate_surfaces_page_exception() {
        let session = attach_stub(|method, _| match method {
            "Runtime.evaluate" => json!({
                "result": {"type": "object", "subtype": "error"},
                "exceptionDetails": {
                    "text": "Uncaught",
                    "exception": {"description": "ReferenceError: nope is not defined"}
                }
            }),
            _ => json!({}),
        })
        .await;

        let err = evaluate(&session, "nope()").await.unwrap_err();
        match err {
            EngineError::JsException { message } => {
                assert!(message.contains("ReferenceError"));
            }
            other => panic!("expected JsException, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_click_dispatches_mouse_events_at_center() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let presses = Arc::new(AtomicUsize::new(0));
        let presses2 = presses.clone();

        let session = attach_stub(move |method, params| match method {
            "Runtime.evaluate" => json!({"result": {"value": {"x": 100.0, "y": 40.0}}}),
            "Input.dispatchMouseEvent" => {
                assert_eq!(params["x"].as_f64(), Some(100.0));
                assert_eq!(params["y"].as_f64(), Some(40.0));
                assert_eq!(params["button"].as_str(), Some("left"));
                presses2.fetch_add(1, Ordering::SeqCst);
                json!({})
            }
            _ => json!({}),
        })
        .await;

        click(&session, "button[data-testid=\"publish\"]")
            .await
            .unwrap();
        // One mousePressed plus one mouseReleased.
        assert_eq!(presses.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_click_missing_element_is_not_found() {
        let session = attach_stub(|method, _| match method {
            "Runtime.evaluate" => json!({"result": {"value": null}}),
            _ => json!({}),
        })
        .await;

        let err = click(&session, "#missing").await.unwrap_err();
        assert!(matches!(err, EngineError::ElementNotFound { .. }));
        assert!(err.to_string().contains("#missing"));
    }

    #[tokio::test]
    async fn test_fill_embeds_text_as_literal() {
        let session = attach_stub(|method, params| match method {
            "Runtime.evaluate" => {
                let expr = params["expression"].as_str().unwrap();
                // Hostile text must stay inside one string literal.
                assert!(expr.contains("\\\"quoted\\\""));
                assert!(!expr.contains("\n"));
                assert!(expr.contains("dispatchEvent(new Event('input'"));
                json!({"result": {"value": true}})
            }
            _ => json!({}),
        })
        .await;

        fill(&session, "#title", "a \"quoted\"\ntitle").await.unwrap();
    }

    #[tokio::test]
    async fn test_press_key_sends_down_and_up() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let events = Arc::new(AtomicUsize::new(0));
        let events2 = events.clone();

        let session = attach_stub(move |method, params| match method {
            "Input.dispatchKeyEvent" => {
                assert_eq!(params["key"].as_str(), Some("v"));
                assert_eq!(params["modifiers"].as_i64(), Some(2));
                events2.fetch_add(1, Ordering::SeqCst);
                json!({})
            }
            _ => json!({}),
        })
        .await;

        press_key(&session, "Ctrl+v").await.unwrap();
        assert_eq!(events.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_screenshot_writes_decoded_png() {
        // 1x1 transparent PNG.
        const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
        let session = attach_stub(|method, _| match method {
            "Page.captureScreenshot" => json!({"data": PNG_B64}),
            _ => json!({}),
        })
        .await;

        let dir = std::env::temp_dir().join(format!("pubdrive-test-{}", std::process::id()));
        let path = screenshot(&session, &dir).await.unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        std::fs::remove_dir_all(&dir).ok();
    }
}
