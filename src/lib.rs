//! Network I/O for a content-distribution client
//!
//! A [`Session`] owns the HTTP transport and the callbacks results are
//! delivered through. Each `get`, `post` or `download` call becomes an
//! independent task on the tokio runtime; the call returns as soon as the
//! task is accepted, and exactly one callback fires when it finishes.
//!
//! Transports:
//! - `backend-reqwest` (default): reqwest with rustls on every platform
//! - `backend-winhttp`: the native WinHTTP API on Windows
//!
//! The [`fs`] module provides the file operations needed to put downloads in
//! place.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

#[cfg(not(any(feature = "backend-reqwest", all(windows, feature = "backend-winhttp"))))]
compile_error!("netw needs a transport: enable `backend-reqwest`, or `backend-winhttp` on Windows");

pub use callback::Callbacks;
pub use codec::NativeString;
pub use error::{Error, Result, TransportStage};
pub use request::{HeaderBlock, UriParts, combine_headers, parse_uri};
pub use session::{MAX_TASK_LIMIT, Session, SessionConfig, SessionConfigBuilder, TlsPolicy};

mod backend;
mod callback;
pub mod codec;
mod error;
mod executor;
pub mod fs;
mod request;
mod session;
mod task;
