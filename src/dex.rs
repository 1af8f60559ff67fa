// =============================================================================
// DEX Viewer — pool-oriented OHLCV endpoint (GeckoTerminal)
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::candle::Candle;
use crate::error::LookupError;
use crate::interval::Interval;

/// One entry from the `gecko-networks.json` startup asset.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkInfo {
    pub id: String,
    pub attributes: NetworkAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkAttributes {
    pub name: String,
    pub coingecko_asset_platform_id: Option<String>,
}

/// The catalog of DEX networks loaded once at startup. Unknown network ids
/// are rejected at factory-construction time.
#[derive(Debug, Clone)]
pub struct NetworksCatalog {
    networks: HashMap<String, NetworkInfo>,
}

impl NetworksCatalog {
    /// Load the catalog from a `gecko-networks.json` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        Self::load_from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.networks.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&NetworkInfo> {
        self.networks.get(id)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Parse a catalog directly from a JSON string, bypassing the file
    /// system. Used by tests and by callers that embed the asset.
    pub fn load_from_str(content: &str) -> anyhow::Result<Self> {
        let entries: Vec<NetworkInfo> = serde_json::from_str(content)?;
        let networks = entries.into_iter().map(|n| (n.id.clone(), n)).collect();
        Ok(Self { networks })
    }
}

/// The `(aggregate, timeframe)` table keyed by canonical interval.
fn interval_table(interval: Interval) -> (u32, &'static str) {
    match interval {
        Interval::M1 => (1, "minute"),
        Interval::M5 => (5, "minute"),
        Interval::M15 => (15, "minute"),
        Interval::M30 => (1, "minute"), // 30m has no DEX equivalent; falls back like `smallest`.
        Interval::H1 => (1, "hour"),
        Interval::H4 => (4, "hour"),
        Interval::D1 => (1, "day"),
        Interval::Smallest => (1, "minute"),
    }
}

const START_PARAM: &str = "before_timestamp";
const LIMIT_PARAM: &str = "limit";
const MAX_ATTEMPTS: u32 = 3;

/// HTTP adapter against GeckoTerminal's pool-oriented OHLCV endpoint.
pub struct DexViewer {
    network: String,
    pool: String,
    timeframe: &'static str,
    aggregate: u32,
    url: String,
    /// Cached `meta.base`/`meta.quote` from the most recent successful
    /// fetch — informational only.
    meta: Mutex<(Option<String>, Option<String>)>,
}

impl DexViewer {
    pub fn new(network: impl Into<String>, pool: impl Into<String>, interval: Interval) -> Self {
        let network = network.into();
        let pool = pool.into();
        let (aggregate, timeframe) = interval_table(interval);
        let url = format!(
            "https://api.geckoterminal.com/api/v2/networks/{network}/pools/{pool}/ohlcv/{timeframe}"
        );
        Self {
            network,
            pool,
            timeframe,
            aggregate,
            url,
            meta: Mutex::new((None, None)),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn base(&self) -> Option<String> {
        self.meta.lock().0.clone()
    }

    pub fn quote(&self) -> Option<String> {
        self.meta.lock().1.clone()
    }

    /// Point this viewer at a different base URL. Test-only: lets
    /// integration tests in other modules back a [`DexFactory`] with a
    /// [`wiremock`] server instead of the real GeckoTerminal host.
    #[cfg(test)]
    pub(crate) fn with_url_override(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Fetch candles. Retries up to [`MAX_ATTEMPTS`] times, but only on
    /// connect-level transport errors — never on HTTP 4xx/5xx or JSON parse
    /// failures. An empty `ohlcv_list` is a [`LookupError`].
    pub async fn fetch(
        &self,
        client: &Client,
        start: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>, LookupError> {
        let mut query: Vec<(&str, String)> = vec![("aggregate", self.aggregate.to_string())];
        if let Some(start) = start {
            query.push((START_PARAM, start.to_string()));
        }
        if let Some(limit) = limit {
            query.push((LIMIT_PARAM, limit.to_string()));
        }

        let mut last_err: Option<reqwest::Error> = None;
        let response = 'attempts: loop {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match client.get(&self.url).query(&query).send().await {
                    Ok(resp) => break 'attempts resp,
                    Err(e) if e.is_connect() && attempt < MAX_ATTEMPTS => {
                        last_err = Some(e);
                        continue;
                    }
                    Err(e) => {
                        return Err(LookupError::new(
                            "geckoterminal",
                            last_err.map(|p| p.to_string()).unwrap_or_else(|| e.to_string()),
                        ));
                    }
                }
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            return Err(LookupError::new("geckoterminal", format!("HTTP {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LookupError::new("geckoterminal", format!("invalid JSON: {e}")))?;

        if let Some(err) = body.get("error") {
            return Err(LookupError::new("geckoterminal", err.to_string()));
        }

        if let Some(meta) = body.get("meta") {
            let base = meta
                .get("base")
                .and_then(|v| v.get("symbol"))
                .and_then(|v| v.as_str())
                .map(String::from);
            let quote = meta
                .get("quote")
                .and_then(|v| v.get("symbol"))
                .and_then(|v| v.as_str())
                .map(String::from);
            *self.meta.lock() = (base, quote);
        }

        let ohlcv_list = body
            .get("data")
            .and_then(|v| v.get("attributes"))
            .and_then(|v| v.get("ohlcv_list"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        if ohlcv_list.is_empty() {
            warn!(network = %self.network, pool = %self.pool, "no DEX data available");
            return Err(LookupError::new("geckoterminal", "no data available"));
        }

        let candles = ohlcv_list
            .iter()
            .filter_map(|row| {
                let row = row.as_array()?;
                Some(Candle {
                    timestamp: row.first()?.as_i64()?,
                    open: row.get(1)?.as_f64()?,
                    high: row.get(2)?.as_f64()?,
                    low: row.get(3)?.as_f64()?,
                    close: row.get(4)?.as_f64()?,
                    volume: row.get(5)?.as_f64()?,
                })
            })
            .collect();

        Ok(candles)
    }
}
