//! Error types and transport failure stages

use std::fmt;
use thiserror::Error;

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// The transport step a task was performing when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStage {
    /// Acquiring the session-wide transport capability
    Session,
    /// Connecting to the remote host
    Connect,
    /// Opening the request against the connection
    OpenRequest,
    /// Sending the header block and payload
    Send,
    /// Waiting for the response headers
    Receive,
    /// Querying the response status code
    QueryHeaders,
    /// Asking the transport how many body bytes are available
    QueryAvailable,
    /// Reading body bytes
    Read,
}

impl fmt::Display for TransportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportStage::Session => "session open",
            TransportStage::Connect => "connect",
            TransportStage::OpenRequest => "open request",
            TransportStage::Send => "send request",
            TransportStage::Receive => "receive response",
            TransportStage::QueryHeaders => "query headers",
            TransportStage::QueryAvailable => "query data available",
            TransportStage::Read => "read data",
        };
        f.write_str(name)
    }
}

/// Error types for session and task operations
#[derive(Debug, Error)]
pub enum Error {
    /// The session was never initialized or has been de-initialized
    #[error("Session is not initialized")]
    NotInitialized,

    /// The session already holds the maximum number of pending tasks
    #[error("Request queue is full ({0} tasks pending)")]
    QueueFull(usize),

    /// A transport step failed
    #[error("{stage} failed: {message} (code: {code})")]
    Transport {
        /// Step that failed
        stage: TransportStage,
        /// Platform diagnostic code, -1 when the transport has none
        code: i64,
        /// Error message
        message: String,
    },

    /// Filesystem error (temporary file, move, mkdir)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn transport(stage: TransportStage, code: i64, message: impl Into<String>) -> Self {
        Error::Transport {
            stage,
            code,
            message: message.into(),
        }
    }

    /// The transport stage this error originated from, if any
    pub fn stage(&self) -> Option<TransportStage> {
        match self {
            Error::Transport { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Diagnostic code for logging: the platform code for transport and I/O
    /// errors, -1 otherwise
    pub fn code(&self) -> i64 {
        match self {
            Error::Transport { code, .. } => *code,
            Error::Io(e) => e.raw_os_error().map(i64::from).unwrap_or(-1),
            _ => -1,
        }
    }
}
