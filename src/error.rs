// =============================================================================
// Domain errors — ValidationError / LookupError
// =============================================================================
//
// These two kinds are the only errors that cross a session-facing boundary:
// a bad tag, unknown exchange/interval/network, malformed symbol
// (ValidationError), or an upstream HTTP/JSON failure / empty-result-where-
// required (LookupError). Everything else (transport errors, background-loop
// panics) is caught and logged at the call site with `anyhow`/`tracing`
// rather than modeled here.
// =============================================================================

use thiserror::Error;

/// A request was structurally or semantically invalid — never fatal, always
/// surfaced to the originating session.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("invalid tag '{0}'")]
    InvalidTag(String),
    #[error("unknown exchange '{0}'")]
    UnknownExchange(String),
    #[error("invalid interval for exchange '{exchange}': '{interval}'")]
    UnsupportedInterval { exchange: String, interval: String },
    #[error("unknown network '{0}'")]
    UnknownNetwork(String),
    #[error("malformed symbol '{0}'")]
    MalformedSymbol(String),
    #[error("invalid factory for tag '{0}'")]
    InvalidFactory(String),
    #[error("no exchange can fetch the data")]
    NoExchangeAvailable,
    #[error("CEX candle factory does not support wildcard resolution")]
    WildcardUnsupported,
    #[error("listener not found in '{0}'")]
    ListenerNotFound(String),
}

/// An upstream HTTP/JSON fetch failed, or returned an empty result where one
/// was required. Carries the venue name for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("failed to fetch data from {venue}: {reason}")]
pub struct LookupError {
    pub venue: String,
    pub reason: String,
}

impl LookupError {
    pub fn new(venue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            reason: reason.into(),
        }
    }
}

/// The union of errors a subscribe/unsubscribe/history request can surface
/// to the originating session.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}
