use crate::candle::{FieldPath, KlineMapper};
use crate::interval::Interval;

use super::{ExchangeDescriptor, TsUnit};

fn format_symbol(base: &str, quote: &str) -> String {
    format!("{base}{quote}")
}

pub const DESCRIPTOR: ExchangeDescriptor = ExchangeDescriptor {
    id: "binance",
    name: "Binance",
    order: 0,
    host: "api.binance.com",
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

/// Excludes leveraged `UP`/`DOWN` tokens; requires spot trading to be live.
fn symbol_filter(symbol: &serde_json::Value) -> bool {
    let base = symbol.get("baseAsset").and_then(|v| v.as_str()).unwrap_or("");
    if base.ends_with("UP") || base.ends_with("DOWN") {
        return false;
    }
    let status = symbol.get("status").and_then(|v| v.as_str()).unwrap_or("");
    let spot_allowed = symbol
        .get("isSpotTradingAllowed")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    status == "TRADING" && spot_allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symbol_format_concatenates() {
        assert_eq!(format_symbol("BTC", "USDT"), "BTCUSDT");
    }

    #[test]
    fn supports_all_intervals() {
        for iv in Interval::ALL {
            assert!(DESCRIPTOR.supports_interval(iv));
        }
    }

    #[test]
    fn symbol_filter_excludes_leveraged_tokens() {
        let symbol = json!({"baseAsset": "BTCUP", "status": "TRADING", "isSpotTradingAllowed": true});
        assert!(!symbol_filter(&symbol));
    }

    #[test]
    fn symbol_filter_excludes_non_trading_status() {
        let symbol = json!({"baseAsset": "BTC", "status": "BREAK", "isSpotTradingAllowed": true});
        assert!(!symbol_filter(&symbol));
    }

    #[test]
    fn symbol_filter_accepts_live_spot_symbol() {
        let symbol = json!({"baseAsset": "BTC", "status": "TRADING", "isSpotTradingAllowed": true});
        assert!(symbol_filter(&symbol));
    }
}
