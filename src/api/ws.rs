// =============================================================================
// WebSocket Handler — accept, demux, heartbeat touch, graceful teardown
// =============================================================================
//
// One session task per connection: it owns the receive loop and a dedicated
// writer task (see `session::spawn_writer`) drains the outbound channel so
// every send is serialized regardless of how many places in the registry
// hold a reference to this session.
// =============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::realip;
use crate::session::{spawn_writer, InboundMessage, OutboundMessage, Session};
use crate::tag;
use crate::AppState;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(transport): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, transport, headers))
}

async fn handle_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    transport: SocketAddr,
    headers: HeaderMap,
) {
    let (host, port) = realip::resolve(&headers, transport);
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let session = Session::new(tx, host.clone(), port);
    let writer = spawn_writer(sink, rx);
    let mut closed = session.subscribe_closed();

    state.sessions.insert(session.clone());
    info!(session = %session.id, %host, port, "session accepted");
    session.send(OutboundMessage::connected(host, port));

    loop {
        tokio::select! {
            // A background eviction (heartbeat timeout) has already queued
            // a close frame on the writer; stop reading rather than wait on
            // a peer that may never send anything else.
            _ = closed.changed() => {
                info!(session = %session.id, "session closed by server");
                break;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_inbound(&text, &session, &state).await,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = &frame {
                            if frame.code > 1001 && !frame.reason.is_empty() {
                                warn!(session = %session.id, code = frame.code, reason = %frame.reason, "client closed with a reason");
                            }
                        }
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Err(e)) => {
                        warn!(session = %session.id, error = %e, "websocket receive error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.sessions.remove(session.id);
    state.registry.disconnect(session.id);
    drop(session);
    let _ = writer.await;
}

async fn handle_inbound(text: &str, session: &Arc<Session>, state: &Arc<AppState>) {
    match InboundMessage::parse(text) {
        Ok(InboundMessage::Ping) => {
            session.touch();
            session.send(OutboundMessage::Pong);
        }
        Ok(InboundMessage::Listen { data }) => handle_listen(data, session, state).await,
        Ok(InboundMessage::Unlisten { data }) => handle_unlisten(data, session, state),
        Ok(InboundMessage::History { data }) => handle_history(data, session, state).await,
        Err(message) => session.send(OutboundMessage::error(message)),
    }
}

async fn handle_listen(data: Value, session: &Arc<Session>, state: &Arc<AppState>) {
    let tag = match tag::resolve_tag(&data) {
        Ok(tag) => tag,
        Err(e) => {
            session.send(OutboundMessage::error(e.to_string()));
            return;
        }
    };
    let requested = tag.to_string();
    if let Err(e) = state.registry.listen(session.clone(), tag).await {
        session.send(OutboundMessage::init_error(requested, e.to_string()));
    }
}

fn handle_unlisten(data: Value, session: &Arc<Session>, state: &Arc<AppState>) {
    let tag = match tag::resolve_tag(&data) {
        Ok(tag) => tag,
        Err(e) => {
            session.send(OutboundMessage::error(e.to_string()));
            return;
        }
    };
    let reply = state.registry.unlisten(session.id, &tag);
    session.send(reply);
}

async fn handle_history(data: Value, session: &Arc<Session>, state: &Arc<AppState>) {
    let tag = match tag::resolve_tag(&data) {
        Ok(tag) => tag,
        Err(e) => {
            session.send(OutboundMessage::error(e.to_string()));
            return;
        }
    };
    let start = data.get("start").and_then(Value::as_i64).unwrap_or(0);
    let limit = data.get("limit").and_then(Value::as_u64).map(|v| v as u32);
    if let Err(e) = state.registry.history(session, &tag, start, limit).await {
        session.send(OutboundMessage::error(e.to_string()));
    }
}
