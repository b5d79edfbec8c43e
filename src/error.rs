//! Reason taxonomy and error types
//!
//! Every terminal failure is reported as a reason string whose leading token
//! (before the first `:`) is one of the codes in [`ReasonCode`]. Inside the
//! crate the same information travels as a [`Failure`] value so expected
//! outcomes never share a path with real faults.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Leading code of a classified reason string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    /// Required input field absent (DOI, VIP, identifier)
    Missing,
    /// Access refused by the publisher (401/403, non-PDF content, embargo)
    Denied,
    /// Known or detected access wall
    Paywall,
    /// Remote resource confirmed absent
    NotFound,
    /// Transport failure or unexpected fault
    TxError,
    /// No strategy or profile for the journal
    NoFormat,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Missing => "MISSING",
            ReasonCode::Denied => "DENIED",
            ReasonCode::Paywall => "PAYWALL",
            ReasonCode::NotFound => "NOTFOUND",
            ReasonCode::TxError => "TXERROR",
            ReasonCode::NoFormat => "NOFORMAT",
        }
    }

    /// Classify a reason string by its leading token.
    ///
    /// `"MISSING: DOI"` and bare `"PAYWALL"` both classify; free text does not.
    pub fn parse(reason: &str) -> Option<Self> {
        let token = match reason.find(':') {
            Some(idx) => &reason[..idx],
            None => reason,
        };
        token.trim().parse().ok()
    }
}

impl FromStr for ReasonCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MISSING" => Ok(ReasonCode::Missing),
            "DENIED" => Ok(ReasonCode::Denied),
            "PAYWALL" => Ok(ReasonCode::Paywall),
            "NOTFOUND" => Ok(ReasonCode::NotFound),
            "TXERROR" => Ok(ReasonCode::TxError),
            "NOFORMAT" => Ok(ReasonCode::NoFormat),
            other => Err(format!("unknown reason code '{}'", other)),
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, expected failure: a code plus free-form diagnostic text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: ReasonCode,
    pub detail: String,
}

impl Failure {
    pub fn new(code: ReasonCode, detail: impl Into<String>) -> Self {
        Self { code, detail: detail.into() }
    }

    pub fn missing(detail: impl Into<String>) -> Self {
        Self::new(ReasonCode::Missing, detail)
    }

    pub fn denied(detail: impl Into<String>) -> Self {
        Self::new(ReasonCode::Denied, detail)
    }

    pub fn paywall() -> Self {
        Self::new(ReasonCode::Paywall, "")
    }

    pub fn tx_error(detail: impl Into<String>) -> Self {
        Self::new(ReasonCode::TxError, detail)
    }

    pub fn no_format(detail: impl Into<String>) -> Self {
        Self::new(ReasonCode::NoFormat, detail)
    }

    /// Rebuild a failure from a persisted reason string.
    /// Unclassified text is treated as a transport error so it stays retryable.
    pub fn from_reason(reason: &str) -> Self {
        match ReasonCode::parse(reason) {
            Some(code) => {
                let detail = reason
                    .find(':')
                    .map(|idx| reason[idx + 1..].trim().to_string())
                    .unwrap_or_default();
                Self { code, detail }
            }
            None => Self::tx_error(reason.trim()),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.detail)
        }
    }
}

impl std::error::Error for Failure {}

/// Registry store errors. Opening a corrupt store is fatal; everything else
/// is reported to the caller.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to read registry config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid registry config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid structured config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("registry validation failed: {message}")]
    Validation { message: String },
}

/// Anything a strategy can return besides a URL
#[derive(Error, Debug)]
pub enum StrategyError {
    /// Expected outcome with a reason code; passed through verbatim
    #[error("{0}")]
    Classified(Failure),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry lookup failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("template error: {0}")]
    Template(String),

    #[error("{0}")]
    Unexpected(String),
}

impl From<Failure> for StrategyError {
    fn from(failure: Failure) -> Self {
        StrategyError::Classified(failure)
    }
}

/// Cache store errors; logged by the cache layer, never surfaced to callers
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cache directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while assembling an [`crate::engine::Engine`]
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("cannot build link hint client: {0}")]
    Hints(#[from] StrategyError),
}
