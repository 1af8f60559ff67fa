// =============================================================================
// Session — per-connection state, wire messages, and the serialized writer
// =============================================================================
//
// A session's sends must be serialized even if the transport would allow
// concurrent writes. We satisfy that with a single writer task per session
// draining an unbounded mpsc channel — callers never touch the WebSocket
// sink directly.
//
// Heartbeat eviction needs to force-close a connection from outside its own
// receive loop. `Session::close` queues a native close frame
// on the same outbound channel (the writer recognizes `CloseConnection` and
// emits `Message::Close` instead of JSON text) and flips a `watch` flag that
// the connection task's receive loop selects on, so a hung read doesn't
// delay teardown.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::candle::Candle;

/// Messages the server sends to a client. Internally tagged on `type` to
/// match the documented wire schema exactly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Notice {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        ip: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
    Pong,
    Init {
        status: &'static str,
        message: String,
        tag: String,
        data: Vec<Candle>,
    },
    Update {
        data: Vec<Candle>,
    },
    History {
        data: Vec<Candle>,
    },
    Error {
        message: String,
    },
    /// Transport-level sentinel, never actually serialized: the writer task
    /// intercepts it and emits a native WebSocket close frame instead of a
    /// JSON text message.
    #[serde(skip)]
    CloseConnection {
        code: u16,
        reason: &'static str,
    },
}

impl OutboundMessage {
    pub fn connected(ip: String, port: u16) -> Self {
        OutboundMessage::Notice {
            message: "Connected".to_string(),
            ip: Some(ip),
            port: Some(port),
            status: None,
            tag: None,
        }
    }

    pub fn unlisten_notice(tag: String) -> Self {
        OutboundMessage::Notice {
            message: "unlistened".to_string(),
            ip: None,
            port: None,
            status: Some("success"),
            tag: Some(tag),
        }
    }

    pub fn no_listener_notice(tag: String) -> Self {
        OutboundMessage::Notice {
            message: "no listener".to_string(),
            ip: None,
            port: None,
            status: Some("success"),
            tag: Some(tag),
        }
    }

    pub fn init_success(tag: String, data: Vec<Candle>) -> Self {
        OutboundMessage::Init {
            status: "success",
            message: "ok".to_string(),
            tag,
            data,
        }
    }

    pub fn init_error(tag: String, message: String) -> Self {
        OutboundMessage::Init {
            status: "error",
            message,
            tag,
            data: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            message: message.into(),
        }
    }
}

/// Messages a client sends to the server, demultiplexed on `type`.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Ping,
    Listen { data: Value },
    Unlisten { data: Value },
    History { data: Value },
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

impl InboundMessage {
    /// Parse a raw text frame. A JSON object missing `type` (or not a JSON
    /// object at all) is exactly the error text `No message type`.
    pub fn parse(raw: &str) -> Result<InboundMessage, String> {
        let envelope: RawEnvelope =
            serde_json::from_str(raw).map_err(|_| "No message type".to_string())?;
        let kind = envelope.kind.ok_or_else(|| "No message type".to_string())?;
        match kind.as_str() {
            "ping" => Ok(InboundMessage::Ping),
            "listen" => Ok(InboundMessage::Listen { data: envelope.data }),
            "unlisten" => Ok(InboundMessage::Unlisten { data: envelope.data }),
            "history" => Ok(InboundMessage::History { data: envelope.data }),
            other => Err(format!("unknown message type '{other}'")),
        }
    }
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A connected client: outbound channel to its writer task, activity clock,
/// and the real address resolved at accept time.
pub struct Session {
    pub id: Uuid,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    last_activity: AtomicI64,
    closed: watch::Sender<bool>,
    pub host: String,
    pub port: u16,
}

impl Session {
    pub fn new(outbound: mpsc::UnboundedSender<OutboundMessage>, host: String, port: u16) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4(),
            outbound,
            last_activity: AtomicI64::new(now_secs()),
            closed,
            host,
            port,
        })
    }

    /// Queue a message for delivery. Swallows send failures — the peer's
    /// receive loop will observe the channel close and tear the session
    /// down on its own.
    pub fn send(&self, message: OutboundMessage) {
        if self.outbound.send(message).is_err() {
            debug!(session = %self.id, "dropped outbound message, channel closed");
        }
    }

    /// Force-close the connection: queues a close frame (delivered ahead of
    /// anything already in flight is not guaranteed, but the writer drains
    /// in order so prior sends still land first) and wakes any task
    /// subscribed via [`Session::subscribe_closed`].
    pub fn close(&self, code: u16, reason: &'static str) {
        self.send(OutboundMessage::CloseConnection { code, reason });
        let _ = self.closed.send(true);
    }

    /// A receiver a connection task can `select!` alongside its read loop to
    /// notice a forced close promptly, even if the peer never sends
    /// anything else.
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub fn touch(&self) {
        self.last_activity.store(now_secs(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Strictly greater-than: a session exactly `timeout_secs` old is not
    /// yet stale.
    pub fn is_stale(&self, now: i64, timeout_secs: i64) -> bool {
        now - self.last_activity() > timeout_secs
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Session {}

/// Process-wide directory of every connected session, independent of which
/// tags (if any) it has subscribed to. The heartbeat loop sweeps this to
/// find and evict stale connections that may hold zero subscriptions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.write().insert(session.id, session);
    }

    pub fn remove(&self, session_id: Uuid) {
        self.sessions.write().remove(&session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Close every session whose last activity is more than `timeout_secs`
    /// old. Does not remove them from the directory itself — each session's
    /// own connection task does that as part of its normal teardown once it
    /// observes the close signal.
    pub fn evict_stale(&self, timeout_secs: i64) {
        let now = now_secs();
        for session in self.sessions.read().values() {
            if session.is_stale(now, timeout_secs) {
                session.close(1006, "Heartbeat Timeout");
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains `rx` and writes each message to `sink` as JSON text, except
/// `CloseConnection`, which becomes a native close frame and ends the loop.
/// Runs until the channel closes or a send fails.
pub fn spawn_writer<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<OutboundMessage>) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let outcome = match message {
                OutboundMessage::CloseConnection { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let result = sink.send(Message::Close(Some(frame))).await;
                    if result.is_err() {
                        debug!("failed to send close frame");
                    }
                    break;
                }
                other => match serde_json::to_string(&other) {
                    Ok(text) => sink.send(Message::Text(text)).await,
                    Err(e) => {
                        debug!(error = %e, "failed to serialize outbound message");
                        continue;
                    }
                },
            };
            if outcome.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (Arc<Session>, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(tx, "127.0.0.1".into(), 9000), rx)
    }

    #[test]
    fn ping_parses() {
        assert!(matches!(InboundMessage::parse(r#"{"type":"ping"}"#), Ok(InboundMessage::Ping)));
    }

    #[test]
    fn missing_type_is_the_exact_spec_error_text() {
        let err = InboundMessage::parse(r#"{"data": {}}"#).unwrap_err();
        assert_eq!(err, "No message type");
    }

    #[test]
    fn non_object_input_is_the_exact_spec_error_text() {
        let err = InboundMessage::parse("not json at all").unwrap_err();
        assert_eq!(err, "No message type");
    }

    #[test]
    fn unknown_type_names_itself_in_the_error() {
        let err = InboundMessage::parse(r#"{"type":"frobnicate"}"#).unwrap_err();
        assert_eq!(err, "unknown message type 'frobnicate'");
    }

    #[test]
    fn listen_carries_its_data_payload() {
        match InboundMessage::parse(r#"{"type":"listen","data":{"symbol":"BTC-USDT"}}"#).unwrap() {
            InboundMessage::Listen { data } => assert_eq!(data["symbol"], "BTC-USDT"),
            other => panic!("expected Listen, got {other:?}"),
        }
    }

    #[test]
    fn notice_omits_unset_optional_fields() {
        let json = serde_json::to_string(&OutboundMessage::no_listener_notice("x".into())).unwrap();
        assert!(!json.contains("\"ip\""));
        assert!(!json.contains("\"port\""));
        assert!(json.contains("\"tag\":\"x\""));
    }

    #[test]
    fn heartbeat_boundary_is_strict() {
        let (session, _rx) = session();
        let now = session.last_activity();
        assert!(!session.is_stale(now + 60, 60), "exactly at the timeout is not yet stale");
        assert!(session.is_stale(now + 61, 60), "one second past the timeout is stale");
    }

    #[test]
    fn send_to_a_closed_channel_does_not_panic() {
        let (session, rx) = session();
        drop(rx);
        session.send(OutboundMessage::Pong);
    }

    #[test]
    fn close_wakes_a_subscribed_watcher() {
        let (session, _rx) = session();
        let mut watcher = session.subscribe_closed();
        assert!(!*watcher.borrow());
        session.close(1006, "Heartbeat Timeout");
        assert!(watcher.has_changed().unwrap());
    }

    #[test]
    fn session_registry_evicts_only_stale_sessions() {
        let registry = SessionRegistry::new();
        let (fresh, _fresh_rx) = session();
        let (stale, _stale_rx) = session();
        stale.last_activity.store(now_secs() - 120, Ordering::Relaxed);
        registry.insert(fresh.clone());
        registry.insert(stale.clone());

        let mut fresh_watch = fresh.subscribe_closed();
        let mut stale_watch = stale.subscribe_closed();
        registry.evict_stale(60);

        assert!(!fresh_watch.has_changed().unwrap());
        assert!(stale_watch.has_changed().unwrap());
    }
}
