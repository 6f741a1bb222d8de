//! Shared types between backend implementations

use crate::codec::NativeString;
use bytes::Bytes;
use http::{Method, StatusCode};
use tokio::sync::mpsc;

/// Number of body chunks a backend may buffer ahead of the executor
pub(crate) const BODY_CHANNEL_DEPTH: usize = 32;

/// Platform-agnostic HTTP request, addressed by its decomposed URI
pub struct BackendRequest {
    /// HTTP method for the request
    pub method: Method,
    /// Whether to use the TLS transport variant
    pub secure: bool,
    /// Host to connect to
    pub host: NativeString,
    /// Port to connect to
    pub port: u16,
    /// Path including query
    pub path: NativeString,
    /// Serialized header block
    pub header: NativeString,
    /// Request payload; sent with a matching content length
    pub payload: Option<Bytes>,
}

/// Platform-agnostic HTTP response
pub struct BackendResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Stream of response body chunks. Each received chunk is data that
    /// was available; the channel closing means no more data.
    pub body_receiver: mpsc::Receiver<crate::Result<Bytes>>,
}
