// =============================================================================
// CandleManager — the subscription registry
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Client;
use tracing::error;
use uuid::Uuid;

use crate::dex::NetworksCatalog;
use crate::error::{RequestError, ValidationError};
use crate::factory::{check_first_cex, CandleFactory, CexFactory, DexFactory};
use crate::session::{OutboundMessage, Session};
use crate::stream::Stream;
use crate::tag::Tag;

/// Process-wide `tag -> Stream` map, plus the shared HTTP client and DEX
/// network catalog every factory is built against.
pub struct CandleManager {
    streams: RwLock<HashMap<String, Arc<Stream>>>,
    client: Client,
    networks: Arc<NetworksCatalog>,
}

impl CandleManager {
    pub fn new(client: Client, networks: Arc<NetworksCatalog>) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            client,
            networks,
        }
    }

    pub fn tag_count(&self) -> usize {
        self.streams.read().len()
    }

    async fn build_factory(&self, tag: &Tag) -> Result<CandleFactory, ValidationError> {
        match tag {
            Tag::Cex {
                exchange,
                base,
                quote,
                interval,
            } => {
                let factory = CexFactory::resolve(&self.client, exchange, base, quote, *interval).await?;
                Ok(CandleFactory::Cex(factory))
            }
            Tag::Dex {
                chain, pool, interval, ..
            } => {
                CandleFactory::no_wildcard_on_dex(chain)?;
                let factory = DexFactory::new(&self.networks, chain, pool, *interval)?;
                Ok(CandleFactory::Dex(factory))
            }
        }
    }

    /// Parse/resolve `tag`, then join an existing stream or build one.
    /// Wildcard CEX tags are resolved against the live registry before any
    /// factory is built, so the registry key is always concrete.
    pub async fn listen(&self, session: Arc<Session>, tag: Tag) -> Result<(), RequestError> {
        let resolved_tag = if tag.is_cex_wildcard() {
            let (base, quote, interval) = match &tag {
                Tag::Cex { base, quote, interval, .. } => (base.clone(), quote.clone(), *interval),
                Tag::Dex { .. } => unreachable!("is_cex_wildcard is only true for Tag::Cex"),
            };
            let descriptor = check_first_cex(&self.client, &base, &quote, interval)
                .await
                .map_err(RequestError::Validation)?;
            tag.resolved(descriptor.id)
        } else {
            tag
        };
        let key = resolved_tag.to_string();

        if let Some(stream) = self.streams.read().get(&key).cloned() {
            stream.add_listener(session).await.map_err(RequestError::Lookup)?;
            return Ok(());
        }

        let factory = self
            .build_factory(&resolved_tag)
            .await
            .map_err(RequestError::Validation)?;
        let stream = Arc::new(Stream::new(key.clone(), factory, self.client.clone()));
        if !stream.check().await {
            return Err(RequestError::Validation(ValidationError::InvalidFactory(key)));
        }
        stream.add_listener(session.clone()).await.map_err(RequestError::Lookup)?;

        // Create-or-get: if a concurrent subscribe already won the race and
        // registered this tag, join the winner instead of publishing ours.
        let mut streams = self.streams.write();
        match streams.get(&key) {
            Some(existing) => existing.adopt_listener(session),
            None => {
                streams.insert(key, stream);
            }
        }
        Ok(())
    }

    /// Absent tag -> "no listener" notice (not an error). Present tag ->
    /// remove the session; reap the stream if it was the last listener.
    /// Always replies, never errors.
    pub fn unlisten(&self, session_id: Uuid, tag: &Tag) -> OutboundMessage {
        let key = tag.to_string();
        let mut streams = self.streams.write();
        match streams.get(&key) {
            None => OutboundMessage::no_listener_notice(key),
            Some(stream) => match stream.remove_listener(session_id) {
                Ok(has_remaining) => {
                    if !has_remaining {
                        streams.remove(&key);
                    }
                    OutboundMessage::unlisten_notice(key)
                }
                Err(_) => OutboundMessage::no_listener_notice(key),
            },
        }
    }

    /// Requires an existing subscription for the tag; callers check that
    /// before invoking.
    pub async fn history(
        &self,
        session: &Arc<Session>,
        tag: &Tag,
        start: i64,
        limit: Option<u32>,
    ) -> Result<(), ValidationError> {
        let key = tag.to_string();
        let stream = self
            .streams
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| ValidationError::ListenerNotFound(key))?;
        stream.pull_history(session, start, limit).await;
        Ok(())
    }

    /// Remove `session_id` from every stream it joined; reap any stream left
    /// empty.
    pub fn disconnect(&self, session_id: Uuid) {
        let mut streams = self.streams.write();
        let mut emptied = Vec::new();
        for (key, stream) in streams.iter() {
            if stream.contains(session_id) && !stream.remove_listener_if_present(session_id) {
                emptied.push(key.clone());
            }
        }
        for key in emptied {
            streams.remove(&key);
        }
    }

    /// One broadcast pass: snapshot keys first so concurrent insert/remove
    /// cannot trip iteration, and a stream disappearing mid-tick just skips
    /// that tag. A fetch failure on one tag is logged and never blocks the
    /// rest.
    pub async fn broadcast_tick(&self) {
        let keys: Vec<String> = self.streams.read().keys().cloned().collect();
        for key in keys {
            let stream = match self.streams.read().get(&key).cloned() {
                Some(s) => s,
                None => continue,
            };
            match stream.pull_newest().await {
                Ok(candles) => stream.broadcast(&candles),
                Err(e) => error!(tag = %key, error = %e, "broadcast tick fetch failed"),
            }
        }
    }
}

#[cfg(test)]
impl CandleManager {
    /// Publish a pre-built stream directly, bypassing factory construction.
    /// Lets tests exercise unlisten/disconnect/broadcast without a live
    /// upstream.
    pub(crate) fn insert_stream_for_test(&self, stream: Arc<Stream>) {
        self.streams.write().insert(stream.tag().to_string(), stream);
    }

    pub(crate) fn contains_tag(&self, tag: &str) -> bool {
        self.streams.read().contains_key(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::NetworksCatalog;
    use crate::factory::DexFactory;
    use crate::interval::Interval;
    use serde_json::json;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager() -> CandleManager {
        let catalog = Arc::new(NetworksCatalog::load_from_str("[]").unwrap());
        CandleManager::new(Client::new(), catalog)
    }

    fn session() -> (Arc<Session>, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(tx, "127.0.0.1".into(), 9000), rx)
    }

    async fn dex_stream_against(server: &MockServer, tag: &str) -> Arc<Stream> {
        Mock::given(method("GET"))
            .and(path("/ohlcv/minute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"attributes": {"ohlcv_list": [[1700000000, 1.0, 2.0, 0.5, 1.5, 10.0]]}}
            })))
            .mount(server)
            .await;
        let factory = DexFactory::test_with_url(
            "eth",
            "0xabc",
            Interval::M1,
            format!("{}/ohlcv/minute", server.uri()),
        );
        Arc::new(Stream::new(tag.to_string(), CandleFactory::Dex(factory), Client::new()))
    }

    #[test]
    fn unlisten_on_unknown_tag_is_a_no_listener_notice() {
        let mgr = manager();
        let (session, _rx) = session();
        let tag = Tag::parse("dex:eth:0xabc:all:1m").unwrap();
        let msg = mgr.unlisten(session.id, &tag);
        assert!(matches!(msg, OutboundMessage::Notice { status: Some("success"), .. }));
    }

    #[tokio::test]
    async fn disconnect_removes_session_from_every_joined_stream() {
        let mgr = manager();
        let server = MockServer::start().await;
        let tag = "dex:eth:0xabc:all:1m";
        let stream = dex_stream_against(&server, tag).await;

        let (session, mut rx) = session();
        stream.add_listener(session.clone()).await.unwrap();
        rx.recv().await.unwrap();
        mgr.insert_stream_for_test(stream);

        assert!(mgr.contains_tag(tag));
        mgr.disconnect(session.id);
        assert!(!mgr.contains_tag(tag), "stream should be reaped once its last listener disconnects");
    }

    #[tokio::test]
    async fn broadcast_tick_skips_a_failing_tag_without_blocking_others() {
        let mgr = manager();
        let good_server = MockServer::start().await;
        let bad_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ohlcv/minute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"attributes": {"ohlcv_list": [[1700000000, 1.0, 2.0, 0.5, 1.5, 10.0]]}}
            })))
            .mount(&good_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ohlcv/minute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"attributes": {"ohlcv_list": []}}
            })))
            .mount(&bad_server)
            .await;

        let good = Arc::new(Stream::new(
            "dex:eth:good:all:1m".to_string(),
            CandleFactory::Dex(DexFactory::test_with_url(
                "eth",
                "good",
                Interval::M1,
                format!("{}/ohlcv/minute", good_server.uri()),
            )),
            Client::new(),
        ));
        let bad = Arc::new(Stream::new(
            "dex:eth:bad:all:1m".to_string(),
            CandleFactory::Dex(DexFactory::test_with_url(
                "eth",
                "bad",
                Interval::M1,
                format!("{}/ohlcv/minute", bad_server.uri()),
            )),
            Client::new(),
        ));

        let (session, mut rx) = session();
        good.add_listener(session.clone()).await.unwrap();
        rx.recv().await.unwrap();

        mgr.insert_stream_for_test(good);
        mgr.insert_stream_for_test(bad);

        mgr.broadcast_tick().await;

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, OutboundMessage::Update { data } if data.len() == 1));
    }
}
