//! Error taxonomy for TokenWatch

use thiserror::Error;

/// Every failure the engine can surface to a caller.
///
/// Quote failures (`Timeout`, `UpstreamApi`, `NotFound`, `BadData`) travel as
/// values and never panic across component boundaries; the monitor converts
/// them into subscriber notifications. Store failures return to the immediate
/// caller. `Storage` means a mutation did not commit and must not be reported
/// as successful.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("timeout")]
    Timeout,

    #[error("api-error:{0}")]
    UpstreamApi(u16),

    #[error("not-found")]
    NotFound,

    #[error("bad-data")]
    BadData,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("limit exceeded: at most {0} tracked tokens per subscriber")]
    LimitExceeded(usize),

    #[error("invalid baseline: last alerted price must be positive")]
    InvalidBaseline,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}
