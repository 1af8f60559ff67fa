// =============================================================================
// Interval — the canonical candle-interval vocabulary
// =============================================================================

use std::fmt;
use std::str::FromStr;

/// The canonical interval set every exchange descriptor maps into its own
/// vocabulary. `Smallest` means "the finest granularity this venue offers",
/// resolved per-venue (most map it to `1m`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    Smallest,
}

impl Interval {
    pub const ALL: [Interval; 8] = [
        Interval::M1,
        Interval::M5,
        Interval::M15,
        Interval::M30,
        Interval::H1,
        Interval::H4,
        Interval::D1,
        Interval::Smallest,
    ];
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
            Interval::Smallest => "smallest",
        };
        f.write_str(s)
    }
}

/// Error returned when a tag or payload names an interval outside the
/// canonical vocabulary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid interval '{0}'")]
pub struct InvalidInterval(pub String);

impl FromStr for Interval {
    type Err = InvalidInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "30m" => Ok(Interval::M30),
            "1h" => Ok(Interval::H1),
            "4h" => Ok(Interval::H4),
            "1d" => Ok(Interval::D1),
            "smallest" => Ok(Interval::Smallest),
            other => Err(InvalidInterval(other.to_string())),
        }
    }
}


impl PartialEq for InvalidInterval {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
