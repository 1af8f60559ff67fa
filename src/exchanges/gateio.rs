use crate::candle::{FieldPath, KlineMapper};
use crate::interval::Interval;

use super::{ExchangeDescriptor, TsUnit};

fn format_symbol(base: &str, quote: &str) -> String {
    format!("{base}_{quote}")
}

pub const DESCRIPTOR: ExchangeDescriptor = ExchangeDescriptor {
    id: "gate.io",
    name: "Gate.io",
    order: 5,
    host: "api.gateio.ws",
    prefix: "/api/v4",
    kline_uri: "/spot/candlesticks",
    kline_path: "",
    kline_query: &[("interval", "1m")],
    symbol_param: "currency_pair",
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
    ts_unit: TsUnit::Seconds,
    // Gate.io reports [ts, volume, close, high, low, open, turnover] -- note
    // the non-standard ordering, ported verbatim from the original
    // KLINE_MAPPER.
    mapper: KlineMapper {
        ts: FieldPath::Index(0),
        volume: FieldPath::Index(1),
        close: FieldPath::Index(2),
        high: FieldPath::Index(3),
        low: FieldPath::Index(4),
        open: FieldPath::Index(5),
    },
    format_symbol,
    info_uri: "/spot/currency_pairs",
    info_path: "",
    symbol_filter,
};

fn symbol_filter(symbol: &serde_json::Value) -> bool {
    symbol
        .get("trade_status")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s.starts_with("tra"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_format_underscores() {
        assert_eq!(format_symbol("BTC", "USDT"), "BTC_USDT");
    }

    #[test]
    fn mapper_matches_non_standard_field_order() {
        let record = serde_json::json!(["1700000000", "12.5", "101.0", "110.0", "90.0", "100.0", "9999"]);
        let candle = DESCRIPTOR.mapper.map(&record);
        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.close, 101.0);
        assert_eq!(candle.volume, 12.5);
    }

    #[test]
    fn symbol_filter_matches_tradable_prefix() {
        assert!(symbol_filter(&serde_json::json!({"trade_status": "tradable"})));
        assert!(!symbol_filter(&serde_json::json!({"trade_status": "untradable"})));
    }
}
