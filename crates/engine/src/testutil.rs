//! Shared in-process protocol stubs for unit tests. No real browser.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Stub debugging endpoint: accepts one WebSocket connection and answers
/// each command through `handler(method, params, session_id)`.
pub async fn stub_endpoint<F>(handler: F) -> String
where
    F: Fn(&str, &Value, Option<&str>) -> Value + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut sink, mut read) = ws.split();
        while let Some(Ok(msg)) = read.next().await {
            let Ok(text) = msg.to_text() else { continue };
            let Ok(v) = serde_json::from_str::<Value>(text) else {
                continue;
            };
            let id = v["id"].as_u64().unwrap();
            let method = v["method"].as_str().unwrap();
            let session = v.get("sessionId").and_then(|s| s.as_str());
            let result = handler(method, &v["params"], session);
            let reply = json!({"id": id, "result": result}).to_string();
            if sink.send(Message::Text(reply)).await.is_err() {
                break;
            }
        }
    });
    format!("ws://{}/devtools/browser/stub", addr)
}

/// `Target.getTargets` reply with page targets in creation order.
pub fn targets_reply(pages: &[(&str, &str)]) -> Value {
    let infos: Vec<Value> = pages
        .iter()
        .map(|(id, url)| json!({"targetId": id, "type": "page", "url": url}))
        .collect();
    json!({"targetInfos": infos})
}

/// Standard handler fragment for attach bookkeeping; returns `None` for
/// methods the caller should handle itself.
pub fn attach_handler(method: &str, session_id: &str, page_url: &str) -> Option<Value> {
    match method {
        "Target.getTargets" => Some(targets_reply(&[("T-STUB", page_url)])),
        "Target.attachToTarget" => Some(json!({"sessionId": session_id})),
        "Page.enable" | "Runtime.enable" | "DOM.enable" => Some(json!({})),
        _ => None,
    }
}
