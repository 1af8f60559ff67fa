// =============================================================================
// Exchange Adapter — one generic `fetch` engine, six declarative descriptors
// =============================================================================
//
// Each centralized exchange is a `const` value of `ExchangeDescriptor`, not
// a trait impl: the variant set is closed and fully enumerable at startup
// (see DESIGN.md "Adapter polymorphism"). `fetch` is the single routine that
// every descriptor is run through.
// =============================================================================

pub mod binance;
pub mod bitget;
pub mod gateio;
pub mod kucoin;
pub mod mexc;
pub mod okx;

use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::candle::{Candle, KlineMapper};
use crate::error::LookupError;
use crate::interval::Interval;

/// Whether an exchange reports kline timestamps in seconds or milliseconds.
///
/// Informational only — `time_fix` is the sole authority on unit
/// normalization at the adapter boundary. The factory layer
/// consults this hint when rescaling a caller-supplied `start` (seconds) to
/// the exchange's native unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsUnit {
    Seconds,
    Millis,
}

/// A single `(canonical_interval -> exchange-native string)` table entry.
pub type IntervalEntry = (Interval, &'static str);

/// Declarative description of one centralized exchange's kline HTTP API.
pub struct ExchangeDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub order: i32,
    pub host: &'static str,
    pub prefix: &'static str,
    pub kline_uri: &'static str,
    /// `->`-separated path from the JSON response root to the candle array.
    /// Empty segments are ignored, so `""` and `"data->ohlcv_list"` both work.
    pub kline_path: &'static str,
    pub kline_query: &'static [(&'static str, &'static str)],
    pub symbol_param: &'static str,
    pub start_param: Option<&'static str>,
    pub limit_param: Option<&'static str>,
    pub interval_param: Option<&'static str>,
    pub interval_vocab: &'static [IntervalEntry],
    pub ts_unit: TsUnit,
    pub mapper: KlineMapper,
    pub format_symbol: fn(&str, &str) -> String,
    /// Symbol catalog endpoint. Not consulted by
    /// [`ExchangeDescriptor::fetch`] — kept on the descriptor for a future
    /// symbol-listing affordance to use.
    pub info_uri: &'static str,
    /// `->`-separated path to the symbol array in the info endpoint's body.
    pub info_path: &'static str,
    /// Eligibility predicate over one raw symbol-catalog record: whether
    /// this exchange currently trades it on spot (status/listing checks,
    /// leveraged-token exclusion, etc). Same caveat as `info_uri`: not
    /// consulted by the core data path.
    pub symbol_filter: fn(&serde_json::Value) -> bool,
}

impl ExchangeDescriptor {
    fn kline_url(&self) -> String {
        format!("https://{}{}{}", self.host, self.prefix, self.kline_uri)
    }

    /// URL for the symbol-catalog endpoint. Unused by the core fetch path;
    /// see `info_uri`.
    pub fn info_url(&self) -> String {
        format!("https://{}{}{}", self.host, self.prefix, self.info_uri)
    }

    fn interval_native(&self, interval: Interval) -> Option<&'static str> {
        self.interval_vocab
            .iter()
            .find(|(iv, _)| *iv == interval)
            .map(|(_, s)| *s)
    }

    /// Whether this descriptor's vocabulary supports `interval`.
    pub fn supports_interval(&self, interval: Interval) -> bool {
        self.interval_native(interval).is_some()
    }

    /// Walk `self.kline_path` into `body` to find the candle array.
    fn walk_path<'a>(&self, body: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        let mut cur = body;
        for segment in self.kline_path.split("->").filter(|s| !s.is_empty()) {
            cur = cur.get(segment)?;
        }
        Some(cur)
    }

    /// Issue one GET against the kline endpoint and map the response into
    /// canonical candles. `start` and `limit` are exchange-native units at
    /// this boundary; rescaling from the caller's seconds-denominated
    /// `start` happens one layer up, in the factory.
    #[instrument(skip(self, client), fields(exchange = self.id))]
    pub async fn fetch(
        &self,
        client: &Client,
        base: &str,
        quote: &str,
        start: Option<i64>,
        limit: Option<u32>,
        interval: Option<Interval>,
    ) -> Result<Vec<Candle>, LookupError> {
        let mut query: Vec<(String, String)> = self
            .kline_query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        query.push((
            self.symbol_param.to_string(),
            (self.format_symbol)(base, quote),
        ));

        if let (Some(limit), Some(param)) = (limit, self.limit_param) {
            query.push((param.to_string(), limit.to_string()));
        }
        if let (Some(start), Some(param)) = (start, self.start_param) {
            query.push((param.to_string(), start.to_string()));
        }
        if let Some(interval) = interval {
            if let (Some(param), Some(native)) = (self.interval_param, self.interval_native(interval)) {
                query.push((param.to_string(), native.to_string()));
            }
        }

        let url = self.kline_url();
        debug!(url = %url, ?query, "fetching kline data");

        let response = client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| LookupError::new(self.name, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(LookupError::new(self.name, format!("HTTP {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LookupError::new(self.name, format!("invalid JSON: {e}")))?;

        let records = self
            .walk_path(&body)
            .and_then(|v| v.as_array())
            .ok_or_else(|| LookupError::new(self.name, "kline path did not resolve to an array"))?;

        let candles: Vec<Candle> = records.iter().map(|r| self.mapper.map(r)).collect();
        if candles.is_empty() {
            warn!(exchange = self.id, "fetch returned zero candles");
        }
        Ok(candles)
    }
}

/// The closed, enumerable roster of supported exchanges, in wildcard
/// preference order.
pub const REGISTRY: &[&ExchangeDescriptor] = &[
    &binance::DESCRIPTOR,
    &okx::DESCRIPTOR,
    &kucoin::DESCRIPTOR,
    &bitget::DESCRIPTOR,
    &mexc::DESCRIPTOR,
    &gateio::DESCRIPTOR,
];

/// Look up a registered exchange by id.
pub fn by_id(id: &str) -> Option<&'static ExchangeDescriptor> {
    REGISTRY.iter().find(|d| d.id == id).copied()
}
