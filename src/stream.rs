// =============================================================================
// Stream — per-tag subscriber fan-out
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Client;
use tracing::error;
use uuid::Uuid;

use crate::candle::Candle;
use crate::error::{LookupError, ValidationError};
use crate::factory::CandleFactory;
use crate::session::{OutboundMessage, Session};

/// Binds one factory instance to its set of subscribers. Lazily created on
/// the first successful subscribe for a tag; torn down by the registry when
/// its last listener leaves.
pub struct Stream {
    tag: String,
    factory: CandleFactory,
    client: Client,
    listeners: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl Stream {
    pub fn new(tag: String, factory: CandleFactory, client: Client) -> Self {
        Self {
            tag,
            factory,
            client,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn contains(&self, session_id: Uuid) -> bool {
        self.listeners.read().contains_key(&session_id)
    }

    /// Liveness probe. CEX is always `true` — construction already validated
    /// it. DEX actually probes the upstream with a single-candle fetch,
    /// independent of the (unbounded) initial snapshot fetch.
    pub async fn check(&self) -> bool {
        match &self.factory {
            CandleFactory::Cex(_) => true,
            CandleFactory::Dex(_) => self.factory.check(&self.client).await.is_ok(),
        }
    }

    /// Fetch a snapshot and, on success, insert the session and deliver the
    /// snapshot to it alone. A fetch failure propagates — the session is NOT
    /// added, and the caller is responsible for surfacing the error.
    pub async fn add_listener(&self, session: Arc<Session>) -> Result<(), LookupError> {
        let candles = self.factory.fetch_latest(&self.client).await?;
        session.send(OutboundMessage::init_success(self.tag.clone(), candles));
        self.listeners.write().insert(session.id, session);
        Ok(())
    }

    /// Returns `true` iff listeners remain after removal. Errors if the
    /// session was never a listener here.
    pub fn remove_listener(&self, session_id: Uuid) -> Result<bool, ValidationError> {
        let mut listeners = self.listeners.write();
        if listeners.remove(&session_id).is_none() {
            return Err(ValidationError::ListenerNotFound(self.tag.clone()));
        }
        Ok(!listeners.is_empty())
    }

    /// Remove a session if present, without error when absent. Used by
    /// disconnect, which does not know in advance which streams a session
    /// joined.
    pub fn remove_listener_if_present(&self, session_id: Uuid) -> bool {
        let mut listeners = self.listeners.write();
        listeners.remove(&session_id);
        !listeners.is_empty()
    }

    /// Insert a session directly, without fetching or sending a snapshot.
    /// Used by the registry to resolve a create-or-get race: the losing
    /// side's session already received an equivalent snapshot from its own
    /// (now-discarded) stream, so it only needs to join the winning stream's
    /// listener set for future broadcasts.
    pub fn adopt_listener(&self, session: Arc<Session>) {
        self.listeners.write().insert(session.id, session);
    }

    pub async fn pull_newest(&self) -> Result<Vec<Candle>, LookupError> {
        self.factory.fetch_newest(&self.client).await
    }

    /// Send an update to every listener independently. A per-listener send
    /// failure is already logged-and-swallowed inside [`Session::send`]; it
    /// never aborts delivery to the remaining listeners.
    pub fn broadcast(&self, candles: &[Candle]) {
        let listeners = self.listeners.read();
        for session in listeners.values() {
            session.send(OutboundMessage::Update {
                data: candles.to_vec(),
            });
        }
    }

    /// Fetch and deliver a history page to one session only. A fetch error
    /// becomes a per-request error message to that same session; the stream
    /// itself is unaffected.
    pub async fn pull_history(&self, session: &Arc<Session>, start: i64, limit: Option<u32>) {
        match self.factory.fetch_history(&self.client, start, limit).await {
            Ok(candles) => session.send(OutboundMessage::History { data: candles }),
            Err(e) => {
                error!(tag = %self.tag, error = %e, "history fetch failed");
                session.send(OutboundMessage::error(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::DexFactory;
    use crate::interval::Interval;
    use serde_json::json;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> (Arc<Session>, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(tx, "127.0.0.1".into(), 9000), rx)
    }

    async fn dex_stream_against(server: &MockServer, body: serde_json::Value) -> Stream {
        Mock::given(method("GET"))
            .and(path("/ohlcv/minute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
        let factory = DexFactory::test_with_url(
            "eth",
            "0xabc",
            Interval::M1,
            format!("{}/ohlcv/minute", server.uri()),
        );
        Stream::new(
            "dex:eth:0xabc:all:1m".to_string(),
            CandleFactory::Dex(factory),
            Client::new(),
        )
    }

    #[tokio::test]
    async fn add_listener_sends_snapshot_and_inserts() {
        let server = MockServer::start().await;
        let stream = dex_stream_against(
            &server,
            json!({"data": {"attributes": {"ohlcv_list": [[1700000000, 1.0, 2.0, 0.5, 1.5, 10.0]]}}}),
        )
        .await;

        let (session, mut rx) = session();
        let id = session.id;
        stream.add_listener(session).await.unwrap();

        assert_eq!(stream.listener_count(), 1);
        assert!(stream.contains(id));
        let msg = rx.recv().await.unwrap();
        match msg {
            OutboundMessage::Init { status, data, .. } => {
                assert_eq!(status, "success");
                assert_eq!(data.len(), 1);
            }
            _ => panic!("expected Init"),
        }
    }

    #[tokio::test]
    async fn add_listener_propagates_fetch_failure_without_inserting() {
        let server = MockServer::start().await;
        let stream = dex_stream_against(
            &server,
            json!({"data": {"attributes": {"ohlcv_list": []}}}),
        )
        .await;

        let (session, _rx) = session();
        let err = stream.add_listener(session).await;
        assert!(err.is_err());
        assert_eq!(stream.listener_count(), 0);
    }

    #[test]
    fn remove_listener_errors_when_absent() {
        let factory = CandleFactory::Dex(DexFactory::test_with_url(
            "eth",
            "0xabc",
            Interval::M1,
            "http://127.0.0.1:0/unused",
        ));
        let stream = Stream::new("dex:eth:0xabc:all:1m".to_string(), factory, Client::new());
        let err = stream.remove_listener(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ValidationError::ListenerNotFound(_)));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_listener() {
        let server = MockServer::start().await;
        let stream = dex_stream_against(
            &server,
            json!({"data": {"attributes": {"ohlcv_list": [[1700000000, 1.0, 2.0, 0.5, 1.5, 10.0]]}}}),
        )
        .await;

        let (session_a, mut rx_a) = session();
        let (session_b, mut rx_b) = session();
        stream.add_listener(session_a).await.unwrap();
        stream.add_listener(session_b).await.unwrap();
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        let candles = vec![Candle {
            timestamp: 1,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }];
        stream.broadcast(&candles);

        assert!(matches!(rx_a.recv().await.unwrap(), OutboundMessage::Update { .. }));
        assert!(matches!(rx_b.recv().await.unwrap(), OutboundMessage::Update { .. }));
    }

    #[tokio::test]
    async fn pull_history_delivers_page_to_requesting_session_only() {
        let server = MockServer::start().await;
        let stream = dex_stream_against(
            &server,
            json!({"data": {"attributes": {"ohlcv_list": [[1700000000, 1.0, 2.0, 0.5, 1.5, 10.0]]}}}),
        )
        .await;

        let (session_a, mut rx_a) = session();
        let (session_b, mut rx_b) = session();
        stream.add_listener(session_a.clone()).await.unwrap();
        stream.add_listener(session_b).await.unwrap();
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        stream.pull_history(&session_a, 1_700_000_000, Some(10)).await;
        assert!(matches!(rx_a.recv().await.unwrap(), OutboundMessage::History { .. }));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn pull_history_lookup_failure_is_an_error_message() {
        let server = MockServer::start().await;
        let stream = dex_stream_against(
            &server,
            json!({"data": {"attributes": {"ohlcv_list": []}}}),
        )
        .await;

        let (session, mut rx) = session();
        stream.pull_history(&session, 1_700_000_000, Some(10)).await;
        assert!(matches!(rx.recv().await.unwrap(), OutboundMessage::Error { .. }));
    }
}
