//! Low-level client for the Chrome-style remote-debugging wire protocol.
//!
//! Speaks JSON over a WebSocket: outbound commands carry a monotonically
//! increasing `id`, inbound messages are either responses (matched back to
//! the pending command by id) or events (no id, dispatched to registered
//! listeners by method name, optionally scoped to a sessionId).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Protocol-level error object in a response.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
}

/// Classified inbound message.
#[derive(Debug)]
pub enum Inbound {
    /// A response to the pending command with this id.
    Reply {
        id: u64,
        result: Option<Value>,
        error: Option<RemoteError>,
    },
    /// An unsolicited event.
    Event {
        method: String,
        params: Value,
        session_id: Option<String>,
    },
}

/// What the reader hands back to a waiting caller.
enum Reply {
    Response {
        result: Option<Value>,
        error: Option<RemoteError>,
    },
    /// The socket went away before a response arrived.
    Closed,
}

struct Listener {
    id: u64,
    /// When set, only events carrying this sessionId are delivered.
    session: Option<String>,
    tx: mpsc::Sender<Value>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;
type ListenerTable = Arc<Mutex<HashMap<String, Vec<Listener>>>>;

/// Handle returned by [`CdpConnection::subscribe`]; pass to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// A connection to the browser's debugging endpoint.
///
/// Owns a writer task (fed through a channel) and a reader task that
/// correlates responses and dispatches events. Close is idempotent; any
/// command issued after close fails immediately with
/// [`EngineError::ConnectionClosed`] instead of hanging.
pub struct CdpConnection {
    ws_tx: mpsc::Sender<String>,
    pending: PendingMap,
    listeners: ListenerTable,
    next_id: AtomicU64,
    next_listener_id: AtomicU64,
    closed: Arc<AtomicBool>,
    default_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
    writer_handle: tokio::task::JoinHandle<()>,
}

impl CdpConnection {
    /// Open the socket and start the reader/writer tasks. `timeout` bounds
    /// the socket handshake only; per-command timeouts default to 30s and
    /// are tuned with [`set_default_timeout`](Self::set_default_timeout).
    pub async fn connect(ws_url: &str, timeout: Duration) -> Result<Self> {
        let connect = tokio::time::timeout(timeout, connect_async(ws_url));
        let (ws_stream, _) = match connect.await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                return Err(EngineError::ConnectionFailed {
                    url: ws_url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(EngineError::ConnectionFailed {
                    url: ws_url.to_string(),
                    reason: format!("no answer within {timeout:?}"),
                })
            }
        };

        let (mut ws_sink, mut ws_read) = ws_stream.split();
        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let listeners: ListenerTable = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(msg)).await {
                    warn!("debug socket write error: {}", e);
                    break;
                }
            }
        });

        let pending_clone = pending.clone();
        let listeners_clone = listeners.clone();
        let closed_clone = closed.clone();
        let reader_handle = tokio::spawn(async move {
            while let Some(msg_result) = ws_read.next().await {
                let text = match msg_result {
                    Ok(Message::Text(t)) => t,
                    Ok(Message::Close(_)) => {
                        debug!("debug socket closed by browser");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("debug socket read error: {}", e);
                        break;
                    }
                };

                let value: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("unparseable protocol message: {}", e);
                        continue;
                    }
                };

                match classify_message(value) {
                    Some(Inbound::Reply { id, result, error }) => {
                        let mut pending = pending_clone.lock().await;
                        if let Some(tx) = pending.remove(&id) {
                            let _ = tx.send(Reply::Response { result, error });
                        } else {
                            debug!(id, "response for unknown or timed-out command");
                        }
                    }
                    Some(Inbound::Event {
                        method,
                        params,
                        session_id,
                    }) => {
                        let mut table = listeners_clone.lock().await;
                        if let Some(entries) = table.get_mut(&method) {
                            entries.retain(|l| {
                                let in_scope = match (&l.session, &session_id) {
                                    (None, _) => true,
                                    (Some(want), Some(got)) => want == got,
                                    (Some(_), None) => false,
                                };
                                if !in_scope {
                                    return true;
                                }
                                // Drop listeners whose receiver is gone.
                                !matches!(
                                    l.tx.try_send(params.clone()),
                                    Err(mpsc::error::TrySendError::Closed(_))
                                )
                            });
                        }
                    }
                    None => {}
                }
            }

            // Socket gone: fail every caller still waiting, then flag the
            // connection so later calls short-circuit.
            closed_clone.store(true, Ordering::SeqCst);
            let mut pending = pending_clone.lock().await;
            for (_, tx) in pending.drain() {
                let _ = tx.send(Reply::Closed);
            }
        });

        Ok(Self {
            ws_tx,
            pending,
            listeners,
            next_id: AtomicU64::new(1),
            next_listener_id: AtomicU64::new(1),
            closed,
            default_timeout: Duration::from_secs(30),
            reader_handle,
            writer_handle,
        })
    }

    /// Override the default per-command timeout.
    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a command and wait for its response.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.call_full(method, params, None, self.default_timeout)
            .await
    }

    /// Send a session-scoped command.
    pub async fn call_on_session(
        &self,
        method: &str,
        params: Value,
        session_id: &str,
    ) -> Result<Value> {
        self.call_full(method, params, Some(session_id), self.default_timeout)
            .await
    }

    /// Send a command with explicit session scope and timeout.
    ///
    /// A timeout abandons this call only; the connection stays usable.
    pub async fn call_full(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(EngineError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let msg = encode_call(id, method, params, session_id);
        debug!(id, method, "sending command");

        // Register before sending so a fast response cannot race us.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        if self.ws_tx.send(msg.to_string()).await.is_err() {
            let mut pending = self.pending.lock().await;
            pending.remove(&id);
            return Err(EngineError::ConnectionClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Reply::Response { result, error })) => {
                if let Some(err) = error {
                    return Err(EngineError::CdpError {
                        method: method.to_string(),
                        code: err.code,
                        message: err.message,
                    });
                }
                Ok(result.unwrap_or(Value::Null))
            }
            Ok(Ok(Reply::Closed)) | Ok(Err(_)) => Err(EngineError::ConnectionClosed),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                pending.remove(&id);
                Err(EngineError::CallTimeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Register a listener for an event method, optionally scoped to one
    /// session. Returns the listener id and the receiving end.
    pub async fn subscribe(
        &self,
        method: &str,
        session_id: Option<&str>,
    ) -> (ListenerId, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(64);
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let mut table = self.listeners.lock().await;
        table.entry(method.to_string()).or_default().push(Listener {
            id,
            session: session_id.map(|s| s.to_string()),
            tx,
        });
        (ListenerId(id), rx)
    }

    /// Remove a previously registered listener.
    pub async fn unsubscribe(&self, listener: ListenerId) {
        let mut table = self.listeners.lock().await;
        for entries in table.values_mut() {
            entries.retain(|l| l.id != listener.0);
        }
        table.retain(|_, entries| !entries.is_empty());
    }

    /// Close the connection. Idempotent: a second close is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reader_handle.abort();
        self.writer_handle.abort();
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Reply::Closed);
        }
        debug!("connection closed");
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

/// Build the outbound wire message for one command.
pub fn encode_call(id: u64, method: &str, params: Value, session_id: Option<&str>) -> Value {
    let mut msg = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(session) = session_id {
        msg["sessionId"] = json!(session);
    }
    msg
}

/// Classify one inbound message: a response (has `id`), an event (has
/// `method`, no `id`), or neither.
pub fn classify_message(value: Value) -> Option<Inbound> {
    if let Some(id) = value.get("id").and_then(|v| v.as_u64()) {
        return Some(Inbound::Reply {
            id,
            result: value.get("result").cloned(),
            error: value
                .get("error")
                .and_then(|e| serde_json::from_value(e.clone()).ok()),
        });
    }
    let method = value.get("method")?.as_str()?.to_string();
    Some(Inbound::Event {
        method,
        params: value.get("params").cloned().unwrap_or(Value::Null),
        session_id: value
            .get("sessionId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    })
}
