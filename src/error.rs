//! Error taxonomy for the counter synchronization core
//!
//! Request/response failures are split into transport failures
//! ([`SyncError::Network`]) and failure statuses ([`SyncError::Server`]).
//! A failed re-read after a successful mutation becomes
//! [`SyncError::LocalSync`], which is only ever logged.

use reqwest::StatusCode;

/// Result alias used across the library.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No response was received (connect refused, timeout, reset, ...).
    #[error("network error during {operation}: {source}")]
    Network {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A response arrived with a non-2xx status.
    #[error("server returned {status} for {operation}")]
    Server {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    /// The re-read that follows a successful mutation failed.
    #[error("local re-sync after {operation} failed: {source}")]
    LocalSync {
        operation: &'static str,
        #[source]
        source: Box<SyncError>,
    },

    #[error("invalid counter name: {0:?}")]
    InvalidName(String),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),

    /// WebSocket failure inside the push channel.
    #[error("push transport error: {0}")]
    Push(#[from] tokio_tungstenite::tungstenite::Error),
}

impl SyncError {
    pub(crate) fn network(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Network { operation, source }
    }

    pub(crate) fn local_sync(operation: &'static str, source: SyncError) -> Self {
        Self::LocalSync {
            operation,
            source: Box::new(source),
        }
    }

    /// HTTP status of a [`SyncError::Server`] failure.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network { .. } | Self::Push(_) => ErrorCategory::Network,
            Self::Server { .. } => ErrorCategory::Server,
            Self::LocalSync { source, .. } => source.category(),
            Self::InvalidName(_) => ErrorCategory::Validation,
            Self::Decode(_) => ErrorCategory::Decode,
            Self::InvalidUrl(_) | Self::Config(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether a caller may reasonably try the same call again.
    ///
    /// The core never retries on its own; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Server { status, .. } => status.is_server_error(),
            other => other.category().is_retryable(),
        }
    }
}

/// Coarse classification of a [`SyncError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport-level failures (retryable)
    Network,

    /// The service answered with a failure status
    Server,

    /// Rejected input (not retryable)
    Validation,

    /// Payload did not match the counter map shape
    Decode,

    /// Bad base URL or setting (not retryable)
    Configuration,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Server)
    }

    /// Short hint shown by the CLI next to an error.
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "check that the counter service is reachable",
            ErrorCategory::Server => "the counter service rejected the request",
            ErrorCategory::Validation => "counter names must not be empty",
            ErrorCategory::Decode => "the counter service sent an unexpected payload",
            ErrorCategory::Configuration => "check --api / TALLY_API_BASE and related settings",
        }
    }
}
