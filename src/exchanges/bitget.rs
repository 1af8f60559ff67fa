use crate::candle::{FieldPath, KlineMapper};
use crate::interval::Interval;

use super::{ExchangeDescriptor, TsUnit};

fn format_symbol(base: &str, quote: &str) -> String {
    format!("{base}{quote}")
}

pub const DESCRIPTOR: ExchangeDescriptor = ExchangeDescriptor {
    id: "bitget",
    name: "Bitget",
    order: 3,
    host: "api.bitget.com",
    prefix: "/api/v2",
    kline_uri: "/spot/market/candles",
    kline_path: "data",
    kline_query: &[("granularity", "1min")],
    symbol_param: "symbol",
    start_param: None,
    limit_param: Some("limit"),
    interval_param: Some("granularity"),
    interval_vocab: &[
        (Interval::M1, "1min"),
        (Interval::M5, "5min"),
        (Interval::M15, "15min"),
        (Interval::M30, "30min"),
        (Interval::H1, "1h"),
        (Interval::H4, "4h"),
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
    info_uri: "/spot/public/symbols",
    info_path: "data",
    symbol_filter,
};

fn symbol_filter(symbol: &serde_json::Value) -> bool {
    symbol.get("status").and_then(|v| v.as_str()) == Some("online")
}
