// =============================================================================
// Candle — the canonical OHLCV record and the raw-record mapping machinery
// =============================================================================
//
// Six fields only: timestamp, open, high, low, close, volume. Upstream
// exchanges also report a `turnover` figure but it is dropped post-mapping —
// it never reaches the wire format.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable OHLCV candle.
///
/// `timestamp` is always normalized to epoch milliseconds UTC by
/// [`time_fix`]. The system transports whatever the upstream returns, even
/// if `low <= open, close, high <= high` does not hold — it does not police
/// upstream data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Where a single canonical field lives inside a raw kline record.
///
/// A record is either a positional array (`Index`) or a keyed object
/// (`Key`); `None` means the exchange does not report this field, and it
/// maps to `0.0`.
#[derive(Debug, Clone, Copy)]
pub enum FieldPath {
    Index(usize),
    Key(&'static str),
    None,
}

impl FieldPath {
    fn get<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        match self {
            FieldPath::Index(i) => record.get(i),
            FieldPath::Key(k) => record.get(k),
            FieldPath::None => None,
        }
    }
}

/// Normalize an upstream timestamp to epoch milliseconds.
///
/// If the raw value fits in 32 bits (`<= 0xFFFFFFFF`) it is treated as
/// seconds and scaled by 1000; otherwise it is passed through unchanged as
/// already being in milliseconds. This is the sole authority on timestamp
/// units — a descriptor's `ts_unit` hint is informational only and is not
/// consulted here. Idempotent: `time_fix(time_fix(x))` is only a no-op when
/// `x` already exceeds `0xFFFFFFFF`, which holds for any realistic
/// millisecond timestamp.
pub fn time_fix(ts: i64) -> i64 {
    if ts >= 0 && ts <= 0xFFFF_FFFF {
        ts * 1000
    } else {
        ts
    }
}

/// Extract a field as `f64`, mapping a missing path to `0.0`.
fn field_f64(record: &Value, path: FieldPath) -> f64 {
    match path.get(record) {
        None => 0.0,
        Some(v) => match v {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        },
    }
}

/// Extract the timestamp field as `i64` and normalize via [`time_fix`]. A
/// missing path yields `time_fix(0)`, i.e. `0`.
fn field_ts(record: &Value, path: FieldPath) -> i64 {
    let raw = match path.get(record) {
        None => 0,
        Some(v) => match v {
            Value::Number(n) => n.as_i64().unwrap_or(0),
            Value::String(s) => s.parse::<i64>().unwrap_or(0),
            _ => 0,
        },
    };
    time_fix(raw)
}

/// The field-path table that maps a raw kline record to a [`Candle`].
#[derive(Debug, Clone, Copy)]
pub struct KlineMapper {
    pub ts: FieldPath,
    pub open: FieldPath,
    pub high: FieldPath,
    pub low: FieldPath,
    pub close: FieldPath,
    pub volume: FieldPath,
}

impl KlineMapper {
    /// Map one raw kline record (array or object) into a [`Candle`].
    pub fn map(&self, record: &Value) -> Candle {
        Candle {
            timestamp: field_ts(record, self.ts),
            open: field_f64(record, self.open),
            high: field_f64(record, self.high),
            low: field_f64(record, self.low),
            close: field_f64(record, self.close),
            volume: field_f64(record, self.volume),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn time_fix_seconds_scales_to_millis() {
        assert_eq!(time_fix(1_700_000_000), 1_700_000_000_000);
    }

    #[test]
    fn time_fix_boundary_exact_u32_max() {
        assert_eq!(time_fix(0xFFFF_FFFF), 0xFFFF_FFFFu64 as i64 * 1000);
    }

    #[test]
    fn time_fix_millis_pass_through() {
        assert_eq!(time_fix(0x1_0000_0000), 0x1_0000_0000);
    }

    #[test]
    fn time_fix_is_idempotent_on_millis_output() {
        let once = time_fix(1_700_000_000);
        assert_eq!(time_fix(once), once);
    }

    #[test]
    fn kline_map_positional_with_missing_volume() {
        let mapper = KlineMapper {
            ts: FieldPath::Index(0),
            open: FieldPath::Index(1),
            high: FieldPath::Index(2),
            low: FieldPath::Index(3),
            close: FieldPath::Index(4),
            volume: FieldPath::None,
        };
        let record = json!([1700000000, "100.0", "110.0", "90.0", "105.0"]);
        let candle = mapper.map(&record);
        assert_eq!(candle.timestamp, 1_700_000_000_000);
        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.volume, 0.0);
    }

    #[test]
    fn kline_map_keyed_record() {
        let mapper = KlineMapper {
            ts: FieldPath::Key("t"),
            open: FieldPath::Key("o"),
            high: FieldPath::Key("h"),
            low: FieldPath::Key("l"),
            close: FieldPath::Key("c"),
            volume: FieldPath::Key("v"),
        };
        let record = json!({"t": 1700000000000i64, "o": 1.0, "h": 2.0, "l": 0.5, "c": 1.5, "v": 99.0});
        let candle = mapper.map(&record);
        assert_eq!(candle.timestamp, 1_700_000_000_000);
        assert_eq!(candle.close, 1.5);
        assert_eq!(candle.volume, 99.0);
    }
}
