use crate::candle::{FieldPath, KlineMapper};
use crate::interval::Interval;

use super::{ExchangeDescriptor, TsUnit};

fn format_symbol(base: &str, quote: &str) -> String {
    format!("{base}{quote}")
}

pub const DESCRIPTOR: ExchangeDescriptor = ExchangeDescriptor {
    id: "mexc",
    name: "MEXC",
    order: 4,
    host: "api.mexc.com",
    prefix: "/api/v3",
    kline_uri: "/klines",
    kline_path: "",
    kline_query: &[("interval", "1m")],
    symbol_param: "symbol",
    start_param: None,
    limit_param: Some("limit"),
    interval_param: Some("interval"),
    interval_vocab: &[
        (Interval::M1, "1m"),
        (Interval::M5, "5m"),
        (Interval::M15, "15m"),
        (Interval::M30, "30m"),
        (Interval::H1, "1h"),
        (Interval::H4, "4h"),
        (Interval::D1, "1d"),
        (Interval::Smallest, "1m"),
    ],
    ts_unit: TsUnit::Millis,
    mapper: KlineMapper {
        ts: FieldPath::Index(0),
        open: FieldPath::Index(1),
        high: FieldPath::Index(2),
        low: FieldPath::Index(3),
        close: FieldPath::Index(4),
        volume: FieldPath::Index(5),
    },
    format_symbol,
    info_uri: "/exchangeInfo",
    info_path: "symbols",
    symbol_filter,
};

fn symbol_filter(symbol: &serde_json::Value) -> bool {
    symbol.get("isSpotTradingAllowed").and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symbol_format_concatenates() {
        assert_eq!(format_symbol("SOL", "USDT"), "SOLUSDT");
    }

    #[test]
    fn symbol_filter_requires_spot_trading_allowed() {
        assert!(symbol_filter(&json!({"isSpotTradingAllowed": true})));
        assert!(!symbol_filter(&json!({"isSpotTradingAllowed": false})));
    }
}
