//! Error hierarchy for the watch-and-publish client
//!
//! Errors are grouped by the component that raises them. Only
//! [`ConnectionError`] (and invalid configuration) is allowed to stop the
//! process; everything raised after startup is contained and logged.

use std::fmt;

use tokio::task::JoinError;
use tokio::time::error::Elapsed;
use tonic::Code;
use tonic::Status;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Startup failure, no connection to the store could be established
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Watch stream failures reported by the Change Watcher
    #[error(transparent)]
    Watch(#[from] WatchStreamError),

    /// Write failures reported by the Periodic Publisher
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Failure raised while handling a delivered batch
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Failed to send shutdown signal: {0}")]
    SignalSenderClosed(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why a connection attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailureReason {
    /// Certificate material was rejected locally or by the peer
    TlsHandshakeFailed,
    /// No endpoint accepted the connection
    EndpointUnreachable,
    /// The retry budget elapsed before any endpoint answered
    Timeout,
}

impl fmt::Display for ConnectionFailureReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            ConnectionFailureReason::TlsHandshakeFailed => "TLS handshake failed",
            ConnectionFailureReason::EndpointUnreachable => "endpoint unreachable",
            ConnectionFailureReason::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Connection failed ({reason}): {detail}")]
pub struct ConnectionError {
    pub reason: ConnectionFailureReason,
    pub detail: String,
}

impl ConnectionError {
    pub fn tls(detail: impl Into<String>) -> Self {
        Self {
            reason: ConnectionFailureReason::TlsHandshakeFailed,
            detail: detail.into(),
        }
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            reason: ConnectionFailureReason::EndpointUnreachable,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self {
            reason: ConnectionFailureReason::Timeout,
            detail: detail.into(),
        }
    }

    /// TLS failures will not heal by retrying with the same material
    pub fn is_retryable(&self) -> bool {
        self.reason != ConnectionFailureReason::TlsHandshakeFailed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchStreamError {
    /// Transport level failure while opening or reading the stream
    #[error("Watch stream disconnected: {0}")]
    Disconnected(String),

    /// The store ended the stream without an error
    #[error("Watch stream closed by the store")]
    StreamClosed,

    /// The store cancelled the watch
    #[error("Watch canceled by the store: {reason}")]
    Canceled { reason: String },

    /// The requested start revision has been compacted away
    #[error("Watch revision compacted, resuming from {compact_revision}")]
    Compacted { compact_revision: i64 },

    /// The connection has been closed locally
    #[error("Connection closed")]
    ConnectionClosed,

    /// The store sent something this client cannot interpret
    #[error("Malformed watch payload: {0}")]
    MalformedPayload(String),
}

impl WatchStreamError {
    /// Malformed payloads mean an incompatible store protocol
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchStreamError::MalformedPayload(_))
    }
}

impl From<Status> for WatchStreamError {
    fn from(status: Status) -> Self {
        WatchStreamError::Disconnected(format!("{:?}: {}", status.code(), status.message()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// Store unreachable or temporarily refusing requests
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A single attempt exceeded its deadline
    #[error("Write timed out")]
    Timeout,

    /// The store answered with a non-retryable status
    #[error("Write rejected ({code:?}): {message}")]
    Rejected { code: Code, message: String },

    /// The connection has been closed locally
    #[error("Connection closed")]
    ConnectionClosed,
}

impl From<Status> for WriteError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::Unavailable | Code::Unknown | Code::Aborted | Code::ResourceExhausted => {
                WriteError::Unavailable(status.message().to_string())
            }
            Code::DeadlineExceeded | Code::Cancelled => WriteError::Timeout,
            code => WriteError::Rejected {
                code,
                message: status.message().to_string(),
            },
        }
    }
}

impl From<Elapsed> for WriteError {
    fn from(_: Elapsed) -> Self {
        WriteError::Timeout
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Handler failed: {0}")]
pub struct HandlerError(pub String);
