//! Error taxonomy for one OI cycle.
//!
//! Every stage fails with its own type; [`PipelineError`] wraps them so the
//! driver can decide between retrying later, skipping the cycle or surfacing
//! the failure:
//! - [`FetchError`]: transport, handshake or status failure talking to NSE
//! - [`EmptyDataError`]: the chain parsed but has no strikes (market closed)
//! - [`MalformedPayloadError`]: the chain violates the expected schema
//! - [`InvalidMetricsError`]: non-numeric metrics reached the classifier
//! - [`ValidationError`]: a snapshot could not be assembled
//! - [`StoreError`]: the storage collaborator failed

/// Failure to obtain a response from the provider.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// The cookie handshake against the NSE home page failed.
    #[error("Session handshake failed: {0}")]
    Handshake(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// NSE answers blocked clients with an HTML page instead of JSON.
    #[error("Non-JSON response: {0}")]
    NonJson(String),
}

impl FetchError {
    /// Throttling and server errors are worth another attempt within the same call
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Status { status, .. } if *status == 429 || *status >= 500)
    }

    /// The session cookies were rejected
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Status { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("No option chain data for {symbol}")]
pub struct EmptyDataError {
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Malformed payload for {symbol}: {reason}")]
pub struct MalformedPayloadError {
    pub symbol: String,
    pub reason: String,
}

impl MalformedPayloadError {
    pub fn new(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid metrics for {symbol}: {reason}")]
pub struct InvalidMetricsError {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid snapshot field '{field}': {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

/// Errors raised by a [`SnapshotStore`](crate::store::SnapshotStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Symbol already exists: {0}")]
    DuplicateSymbol(String),

    /// Snapshots of one symbol must be appended in increasing capture time.
    #[error("Out-of-order snapshot for {symbol}: {captured_at} is not after {latest}")]
    OutOfOrder {
        symbol: String,
        captured_at: chrono::NaiveDateTime,
        latest: chrono::NaiveDateTime,
    },

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Everything the source client can fail with.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    EmptyData(#[from] EmptyDataError),

    #[error(transparent)]
    MalformedPayload(#[from] MalformedPayloadError),
}

/// Outcome of a failed `run_cycle`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    EmptyData(#[from] EmptyDataError),

    #[error(transparent)]
    MalformedPayload(#[from] MalformedPayloadError),

    #[error(transparent)]
    InvalidMetrics(#[from] InvalidMetricsError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// The task running the cycle panicked or was cancelled.
    #[error("Cycle task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Worth running again on the next tick (provider unreachable or no chain yet)
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Fetch(_) | PipelineError::EmptyData(_))
    }

    /// Short machine-readable kind, used in logs and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch",
            PipelineError::EmptyData(_) => "empty_data",
            PipelineError::MalformedPayload(_) => "malformed_payload",
            PipelineError::InvalidMetrics(_) => "invalid_metrics",
            PipelineError::Validation(_) => "validation",
            PipelineError::Storage(_) => "storage",
            PipelineError::Aborted(_) => "aborted",
        }
    }
}

impl From<SourceError> for PipelineError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Fetch(e) => PipelineError::Fetch(e),
            SourceError::EmptyData(e) => PipelineError::EmptyData(e),
            SourceError::MalformedPayload(e) => PipelineError::MalformedPayload(e),
        }
    }
}
