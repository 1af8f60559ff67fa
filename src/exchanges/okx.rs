use crate::candle::{FieldPath, KlineMapper};
use crate::interval::Interval;

use super::{ExchangeDescriptor, TsUnit};

fn format_symbol(base: &str, quote: &str) -> String {
    format!("{base}-{quote}")
}

pub const DESCRIPTOR: ExchangeDescriptor = ExchangeDescriptor {
    id: "okx",
    name: "Okx",
    order: 1,
    host: "www.okx.com",
    prefix: "/api/v5",
    kline_uri: "/market/index-candles",
    kline_path: "data",
    kline_query: &[],
    symbol_param: "instId",
    start_param: None,
    limit_param: Some("limit"),
    interval_param: Some("bar"),
    interval_vocab: &[
        (Interval::M1, "1m"),
        (Interval::M5, "5m"),
        (Interval::M15, "15m"),
        (Interval::M30, "30m"),
        (Interval::H1, "1H"),
        (Interval::H4, "4H"),
        (Interval::D1, "1D"),
        (Interval::Smallest, "1m"),
    ],
    ts_unit: TsUnit::Millis,
    mapper: KlineMapper {
        ts: FieldPath::Index(0),
        open: FieldPath::Index(1),
        high: FieldPath::Index(2),
        low: FieldPath::Index(3),
        close: FieldPath::Index(4),
        volume: FieldPath::None,
    },
    format_symbol,
    info_uri: "/public/instruments",
    info_path: "data",
    symbol_filter,
};

fn symbol_filter(symbol: &serde_json::Value) -> bool {
    symbol.get("state").and_then(|v| v.as_str()) == Some("live")
}
