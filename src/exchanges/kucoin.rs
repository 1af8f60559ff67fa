use crate::candle::{FieldPath, KlineMapper};
use crate::interval::Interval;

use super::{ExchangeDescriptor, TsUnit};

fn format_symbol(base: &str, quote: &str) -> String {
    format!("{base}-{quote}")
}

pub const DESCRIPTOR: ExchangeDescriptor = ExchangeDescriptor {
    id: "kucoin",
    name: "KuCoin",
    order: 2,
    host: "api.kucoin.com",
    prefix: "",
    kline_uri: "/api/v1/market/candles",
    kline_path: "data",
    kline_query: &[("type", "1min")],
    symbol_param: "symbol",
    start_param: Some("startAt"),
    limit_param: None,
    interval_param: Some("type"),
    interval_vocab: &[
        (Interval::M1, "1min"),
        (Interval::M5, "5min"),
        (Interval::M15, "15min"),
        (Interval::M30, "30min"),
        (Interval::H1, "1hour"),
        (Interval::H4, "4hour"),
        (Interval::D1, "1day"),
        (Interval::Smallest, "1min"),
    ],
    ts_unit: TsUnit::Seconds,
    mapper: KlineMapper {
        ts: FieldPath::Index(0),
        open: FieldPath::Index(1),
        high: FieldPath::Index(2),
        low: FieldPath::Index(3),
        close: FieldPath::Index(4),
        volume: FieldPath::Index(5),
    },
    format_symbol,
    info_uri: "/api/v2/symbols",
    info_path: "data",
    symbol_filter,
};

/// Excludes leveraged `UP`/`DOWN` tokens; requires trading to be enabled.
fn symbol_filter(symbol: &serde_json::Value) -> bool {
    let base = symbol.get("baseCurrency").and_then(|v| v.as_str()).unwrap_or("");
    if base.ends_with("UP") || base.ends_with("DOWN") {
        return false;
    }
    symbol.get("enableTrading").and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symbol_format_hyphenates() {
        assert_eq!(format_symbol("ETH", "USDT"), "ETH-USDT");
    }

    #[test]
    fn uses_seconds_unit() {
        assert_eq!(DESCRIPTOR.ts_unit, TsUnit::Seconds);
    }

    #[test]
    fn symbol_filter_requires_trading_enabled() {
        let symbol = json!({"baseCurrency": "ETH", "enableTrading": true});
        assert!(symbol_filter(&symbol));
        let symbol = json!({"baseCurrency": "ETH", "enableTrading": false});
        assert!(!symbol_filter(&symbol));
    }
}
