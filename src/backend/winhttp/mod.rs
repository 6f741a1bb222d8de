//! WinHTTP backend
//!
//! Drives the synchronous WinHTTP API from the blocking thread pool:
//! connect, open request, send, receive, query status, then a
//! query-available/read loop feeding the body channel. Every handle is owned
//! by an [`InternetHandle`] and closed when it goes out of scope, on success
//! and on every error path.

pub mod error;

use crate::backend::types::{BODY_CHANNEL_DEPTH, BackendRequest, BackendResponse};
use crate::error::TransportStage;
use crate::session::SessionConfig;
use crate::{Error, Result};
use bytes::Bytes;
use error::{last_error, map_winhttp_error};
use std::ffi::c_void;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use windows::Win32::Networking::WinHttp::{
    WINHTTP_ACCESS_TYPE_DEFAULT_PROXY, WINHTTP_ACCESS_TYPE_NO_PROXY, WINHTTP_FLAG_SECURE,
    WINHTTP_OPEN_REQUEST_FLAGS, WINHTTP_QUERY_FLAG_NUMBER, WINHTTP_QUERY_STATUS_CODE,
    WinHttpCloseHandle, WinHttpConnect, WinHttpOpen, WinHttpOpenRequest,
    WinHttpQueryDataAvailable, WinHttpQueryHeaders, WinHttpReadData, WinHttpReceiveResponse,
    WinHttpSendRequest, WinHttpSetTimeouts,
};
use windows::core::{HSTRING, PCWSTR};

/// An open WinHTTP handle, closed on drop
struct InternetHandle(*mut c_void);

// WinHTTP handles may be used and closed from any thread.
unsafe impl Send for InternetHandle {}
unsafe impl Sync for InternetHandle {}

impl InternetHandle {
    fn new(raw: *mut c_void, stage: TransportStage) -> Result<Self> {
        if raw.is_null() {
            Err(last_error(stage))
        } else {
            Ok(Self(raw))
        }
    }

    fn raw(&self) -> *mut c_void {
        self.0
    }
}

impl Drop for InternetHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = WinHttpCloseHandle(self.0);
        }
    }
}

/// Windows backend using a WinHTTP session opened once per [`crate::Session`]
#[derive(Clone)]
pub struct WinHttpBackend {
    session: Arc<InternetHandle>,
}

impl WinHttpBackend {
    /// Open the WinHTTP session with configuration
    pub fn with_config(config: &SessionConfig) -> Result<Self> {
        let access = if config.use_default_proxy {
            WINHTTP_ACCESS_TYPE_DEFAULT_PROXY
        } else {
            WINHTTP_ACCESS_TYPE_NO_PROXY
        };

        let session = unsafe {
            InternetHandle::new(
                WinHttpOpen(
                    &HSTRING::from(config.user_agent.as_str()),
                    access,
                    PCWSTR::null(),
                    PCWSTR::null(),
                    0,
                ),
                TransportStage::Session,
            )?
        };

        if let Some(timeout) = config.timeout() {
            let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
            unsafe {
                WinHttpSetTimeouts(session.raw(), timeout_ms, timeout_ms, timeout_ms, timeout_ms)
                    .map_err(|e| map_winhttp_error(TransportStage::Session, e))?;
            }
        }

        Ok(Self {
            session: Arc::new(session),
        })
    }

    /// Execute an HTTP request on the blocking pool
    pub async fn execute(&self, request: BackendRequest) -> Result<BackendResponse> {
        let session = self.session.clone();
        let (status_tx, status_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_DEPTH);

        tokio::task::spawn_blocking(move || {
            run_request(&session, request, status_tx, body_tx);
        });

        let status = status_rx
            .await
            .map_err(|_| Error::Internal("WinHTTP worker exited before the response".to_string()))??;

        Ok(BackendResponse {
            status,
            body_receiver: body_rx,
        })
    }
}

/// Connect, send and receive; report the status, then stream the body
fn run_request(
    session: &InternetHandle,
    request: BackendRequest,
    status_tx: oneshot::Sender<Result<http::StatusCode>>,
    body_tx: mpsc::Sender<Result<Bytes>>,
) {
    let opened = open_request(session, &request);
    let (_connection, handle, status) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            let _ = status_tx.send(Err(e));
            return;
        }
    };

    if status_tx.send(Ok(status)).is_err() {
        return;
    }

    loop {
        let mut available: u32 = 0;
        if let Err(e) = unsafe { WinHttpQueryDataAvailable(handle.raw(), &mut available) } {
            let _ = body_tx.blocking_send(Err(map_winhttp_error(TransportStage::QueryAvailable, e)));
            return;
        }
        if available == 0 {
            return;
        }

        let mut buffer = vec![0u8; available as usize];
        let mut read: u32 = 0;
        let result = unsafe {
            WinHttpReadData(
                handle.raw(),
                buffer.as_mut_ptr() as *mut c_void,
                available,
                &mut read,
            )
        };
        if let Err(e) = result {
            let _ = body_tx.blocking_send(Err(map_winhttp_error(TransportStage::Read, e)));
            return;
        }
        buffer.truncate(read as usize);
        tracing::trace!(read, available, "read data");

        if body_tx.blocking_send(Ok(Bytes::from(buffer))).is_err() {
            return;
        }
    }
}

/// Convert the numeric status reported by WinHTTP
fn status_from_raw(status_code: u32) -> Result<http::StatusCode> {
    u16::try_from(status_code)
        .ok()
        .and_then(|code| http::StatusCode::from_u16(code).ok())
        .ok_or_else(|| {
            Error::transport(
                TransportStage::QueryHeaders,
                i64::from(status_code),
                "Status code out of range",
            )
        })
}

fn open_request(
    session: &InternetHandle,
    request: &BackendRequest,
) -> Result<(InternetHandle, InternetHandle, http::StatusCode)> {
    unsafe {
        let connection = InternetHandle::new(
            WinHttpConnect(session.raw(), PCWSTR(request.host.as_ptr()), request.port, 0),
            TransportStage::Connect,
        )?;

        let flags = if request.secure {
            WINHTTP_FLAG_SECURE
        } else {
            WINHTTP_OPEN_REQUEST_FLAGS(0)
        };
        let handle = InternetHandle::new(
            WinHttpOpenRequest(
                connection.raw(),
                &HSTRING::from(request.method.as_str()),
                PCWSTR(request.path.as_ptr()),
                PCWSTR::null(),
                PCWSTR::null(),
                std::ptr::null(),
                flags,
            ),
            TransportStage::OpenRequest,
        )?;

        let headers = (!request.header.is_empty()).then(|| request.header.as_units());
        let (body_ptr, body_len) = match &request.payload {
            Some(payload) => (Some(payload.as_ptr() as *const c_void), payload.len() as u32),
            None => (None, 0),
        };
        WinHttpSendRequest(handle.raw(), headers, body_ptr, body_len, body_len, 0)
            .map_err(|e| map_winhttp_error(TransportStage::Send, e))?;

        WinHttpReceiveResponse(handle.raw(), std::ptr::null_mut())
            .map_err(|e| map_winhttp_error(TransportStage::Receive, e))?;

        let mut status_code: u32 = 0;
        let mut status_code_size = std::mem::size_of::<u32>() as u32;
        WinHttpQueryHeaders(
            handle.raw(),
            WINHTTP_QUERY_STATUS_CODE | WINHTTP_QUERY_FLAG_NUMBER,
            PCWSTR::null(),
            Some(&mut status_code as *mut _ as *mut _),
            &mut status_code_size,
            std::ptr::null_mut(),
        )
        .map_err(|e| map_winhttp_error(TransportStage::QueryHeaders, e))?;

        let status = status_from_raw(status_code)?;
        tracing::debug!(status = status_code, "response received");

        Ok((connection, handle, status))
    }
}
