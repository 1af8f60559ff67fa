// =============================================================================
// Tag — stream identity and factory-construction recipe
// =============================================================================

use std::fmt;

use serde_json::Value;

use crate::error::ValidationError;
use crate::interval::Interval;

/// A parsed stream identifier. `Display` re-serializes to the canonical
/// `cex:…`/`dex:…` form, used both for registry keys and for rewriting a
/// wildcard tag to its resolved exchange id.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Cex {
        exchange: String,
        base: String,
        quote: String,
        interval: Interval,
    },
    Dex {
        chain: String,
        address: String,
        pool: String,
        interval: Interval,
    },
}

impl Tag {
    pub fn parse(s: &str) -> Result<Tag, ValidationError> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            ["cex", exchange, symbol, interval] => {
                let (base, quote) = split_symbol(symbol)?;
                let interval = interval
                    .parse::<Interval>()
                    .map_err(|_| ValidationError::InvalidTag(s.to_string()))?;
                Ok(Tag::Cex {
                    exchange: exchange.to_string(),
                    base,
                    quote,
                    interval,
                })
            }
            ["dex", chain, address, pool, interval] => {
                if chain.is_empty() || address.is_empty() || pool.is_empty() {
                    return Err(ValidationError::InvalidTag(s.to_string()));
                }
                let interval = interval
                    .parse::<Interval>()
                    .map_err(|_| ValidationError::InvalidTag(s.to_string()))?;
                Ok(Tag::Dex {
                    chain: chain.to_string(),
                    address: address.to_string(),
                    pool: pool.to_string(),
                    interval,
                })
            }
            _ => Err(ValidationError::InvalidTag(s.to_string())),
        }
    }

    pub fn interval(&self) -> Interval {
        match self {
            Tag::Cex { interval, .. } => *interval,
            Tag::Dex { interval, .. } => *interval,
        }
    }

    pub fn is_cex_wildcard(&self) -> bool {
        matches!(self, Tag::Cex { exchange, .. } if exchange == "*")
    }

    /// Rewrite a CEX tag's exchange slot to a resolved, concrete id. A no-op
    /// on DEX tags, since wildcard resolution is CEX-only.
    pub fn resolved(&self, exchange_id: &str) -> Tag {
        match self {
            Tag::Cex {
                base, quote, interval, ..
            } => Tag::Cex {
                exchange: exchange_id.to_string(),
                base: base.clone(),
                quote: quote.clone(),
                interval: *interval,
            },
            Tag::Dex { .. } => self.clone(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Cex {
                exchange,
                base,
                quote,
                interval,
            } => write!(f, "cex:{exchange}:{base}-{quote}:{interval}"),
            Tag::Dex {
                chain,
                address,
                pool,
                interval,
            } => write!(f, "dex:{chain}:{address}:{pool}:{interval}"),
        }
    }
}

fn split_symbol(symbol: &str) -> Result<(String, String), ValidationError> {
    let mut parts = symbol.splitn(2, '-');
    let base = parts.next().filter(|s| !s.is_empty());
    let quote = parts.next().filter(|s| !s.is_empty());
    match (base, quote) {
        (Some(b), Some(q)) => Ok((b.to_string(), q.to_string())),
        _ => Err(ValidationError::MalformedSymbol(symbol.to_string())),
    }
}

/// Resolve a `listen`/`unlisten`/`history` payload's `data` object into a
/// tag, either by reading an explicit `tag` field or by synthesizing one
/// from `symbol`/`chain`.
pub fn resolve_tag(data: &Value) -> Result<Tag, ValidationError> {
    if let Some(tag) = data.get("tag").and_then(|v| v.as_str()) {
        return Tag::parse(tag);
    }

    if let Some(symbol) = data.get("symbol").and_then(|v| v.as_str()) {
        let exchange = data.get("exchange").and_then(|v| v.as_str()).unwrap_or("*");
        let interval = data
            .get("interval")
            .and_then(|v| v.as_str())
            .unwrap_or("smallest");
        return Tag::parse(&format!("cex:{exchange}:{symbol}:{interval}"));
    }

    if let Some(chain) = data.get("chain").and_then(|v| v.as_str()) {
        let address = data
            .get("address")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ValidationError::InvalidTag("dex payload missing address".to_string()))?;
        let pool = data.get("pool").and_then(|v| v.as_str()).unwrap_or("all");
        let interval = data
            .get("interval")
            .and_then(|v| v.as_str())
            .unwrap_or("smallest");
        return Tag::parse(&format!("dex:{chain}:{address}:{pool}:{interval}"));
    }

    Err(ValidationError::InvalidTag(String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_cex_tag() {
        let tag = Tag::parse("cex:binance:BTC-USDT:1m").unwrap();
        assert_eq!(
            tag,
            Tag::Cex {
                exchange: "binance".into(),
                base: "BTC".into(),
                quote: "USDT".into(),
                interval: Interval::M1
            }
        );
        assert_eq!(tag.to_string(), "cex:binance:BTC-USDT:1m");
    }

    #[test]
    fn parses_dex_tag() {
        let tag = Tag::parse("dex:eth:0xabc:all:5m").unwrap();
        assert_eq!(
            tag,
            Tag::Dex {
                chain: "eth".into(),
                address: "0xabc".into(),
                pool: "all".into(),
                interval: Interval::M5
            }
        );
        assert_eq!(tag.to_string(), "dex:eth:0xabc:all:5m");
    }

    #[test]
    fn rejects_malformed_symbol() {
        let err = Tag::parse("cex:binance:BTCUSDT:1m").unwrap_err();
        assert!(matches!(err, ValidationError::MalformedSymbol(_)));
    }

    #[test]
    fn rejects_unknown_shape() {
        assert!(Tag::parse("cex:binance:BTC-USDT").is_err());
        assert!(Tag::parse("unknown:foo:bar").is_err());
    }

    #[test]
    fn wildcard_detection_and_resolution() {
        let tag = Tag::parse("cex:*:BTC-USDT:1m").unwrap();
        assert!(tag.is_cex_wildcard());
        let resolved = tag.resolved("binance");
        assert_eq!(resolved.to_string(), "cex:binance:BTC-USDT:1m");
        assert!(!resolved.is_cex_wildcard());
    }

    #[test]
    fn synthesizes_cex_tag_from_symbol() {
        let data = json!({"exchange": "binance", "symbol": "BTC-USDT", "interval": "5m"});
        let tag = resolve_tag(&data).unwrap();
        assert_eq!(tag.to_string(), "cex:binance:BTC-USDT:5m");
    }

    #[test]
    fn synthesizes_cex_tag_defaults_wildcard_and_smallest() {
        let data = json!({"symbol": "ETH-USDT"});
        let tag = resolve_tag(&data).unwrap();
        assert_eq!(tag.to_string(), "cex:*:ETH-USDT:smallest");
    }

    #[test]
    fn synthesizes_dex_tag_from_chain() {
        let data = json!({"chain": "eth", "address": "0xabc"});
        let tag = resolve_tag(&data).unwrap();
        assert_eq!(tag.to_string(), "dex:eth:0xabc:all:smallest");
    }

    #[test]
    fn rejects_payload_with_neither_symbol_nor_chain() {
        let data = json!({"foo": "bar"});
        assert!(resolve_tag(&data).is_err());
    }

    #[test]
    fn prefers_explicit_tag_over_synthesis() {
        let data = json!({"tag": "cex:okx:BTC-USDT:1h", "symbol": "ETH-USDT"});
        let tag = resolve_tag(&data).unwrap();
        assert_eq!(tag.to_string(), "cex:okx:BTC-USDT:1h");
    }
}
