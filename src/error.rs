use crate::retry::RateLimitStatus;
use thiserror::Error;

/// A non-throttling failure reported by the transport for one attempt.
///
/// `code` is a stable machine-readable tag (`not_found`, `unauthorized`,
/// `transport`, ...) and `message` carries whatever the remote side said.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct CallError {
    pub code: String,
    pub message: String,
}

impl CallError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The attempt failed for a reason other than throttling; never retried.
    #[error("error {description}: {source}")]
    Fatal {
        description: String,
        #[source]
        source: CallError,
    },

    /// Every attempt was throttled. `attempts` counts the initial try too.
    #[error("error {description}: retries exhausted after {attempts} attempts, last failure: {last}")]
    RetriesExhausted {
        description: String,
        attempts: u32,
        last: RateLimitStatus,
    },

    /// A page could not be fetched; the aggregate built so far is discarded.
    #[error("error while depaginating page {page}/{last_page}: {source}")]
    DepaginationFailed {
        page: u32,
        last_page: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("{description}: cancelled")]
    Cancelled { description: String },
}

impl Error {
    /// True when the failure, or the page failure it wraps, came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } => true,
            Error::DepaginationFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The transport error behind a fatal failure, looking through page failures.
    pub fn call_error(&self) -> Option<&CallError> {
        match self {
            Error::Fatal { source, .. } => Some(source),
            Error::DepaginationFailed { source, .. } => source.call_error(),
            _ => None,
        }
    }
}

/// Outcome of an opt-in partial depagination: the error plus every item
/// aggregated before the failing page.
#[derive(Debug)]
pub struct PartialFailure<T> {
    pub items: Vec<T>,
    pub error: Error,
}

impl<T> PartialFailure<T> {
    pub fn into_error(self) -> Error {
        self.error
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing GITHUB_TOKEN, GH_TOKEN or GITHUB_TOKEN_FILE")]
    MissingToken,

    #[error("reading token file {path}: {source}")]
    TokenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
