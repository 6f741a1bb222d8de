//! Per-request task description and lifecycle states

use crate::backend::types::BackendRequest;
use crate::codec::NativeString;
use crate::error::TransportStage;
use crate::request::{HeaderBlock, parse_uri};
use bytes::Bytes;
use std::fmt;

/// What a task does with the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    /// GET, body collected in memory
    Get,
    /// POST, body collected in memory
    Post,
    /// POST, body streamed into a temporary file
    Download,
}

impl TaskKind {
    pub(crate) fn method(self) -> http::Method {
        match self {
            TaskKind::Get => http::Method::GET,
            TaskKind::Post | TaskKind::Download => http::Method::POST,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Get => "get",
            TaskKind::Post => "post",
            TaskKind::Download => "download",
        })
    }
}

/// A single-use request, owned by exactly one execution unit
pub(crate) struct Task<U> {
    pub(crate) id: u64,
    pub(crate) kind: TaskKind,
    pub(crate) secure: bool,
    pub(crate) host: NativeString,
    pub(crate) port: u16,
    pub(crate) path: NativeString,
    pub(crate) header: NativeString,
    pub(crate) payload: Option<Bytes>,
    pub(crate) udata: U,
}

impl<U> Task<U> {
    /// Build a task: parse the URI, convert the header block and copy the
    /// payload. `force_tls` overrides the scheme's security flag.
    pub(crate) fn new(
        id: u64,
        kind: TaskKind,
        uri: &str,
        header: &HeaderBlock,
        payload: Option<&[u8]>,
        force_tls: bool,
        udata: U,
    ) -> Self {
        let parts = parse_uri(uri);
        let task = Self {
            id,
            kind,
            secure: force_tls || parts.secure,
            host: NativeString::from_utf8(&parts.host),
            port: parts.port,
            path: NativeString::from_utf8(&parts.path),
            header: header.to_native(),
            payload: payload.map(Bytes::copy_from_slice),
            udata,
        };

        tracing::debug!(
            task = id,
            %kind,
            uri,
            host = %task.host,
            port = task.port,
            path = %task.path,
            payload_bytes = task.payload_bytes(),
            "task built"
        );
        tracing::trace!(task = id, headers = header.as_str(), "header block");

        task
    }

    pub(crate) fn payload_bytes(&self) -> usize {
        self.payload.as_ref().map_or(0, Bytes::len)
    }

    /// Split into the transport request and the caller's token
    pub(crate) fn into_request(self) -> (BackendRequest, U) {
        let request = BackendRequest {
            method: self.kind.method(),
            secure: self.secure,
            host: self.host,
            port: self.port,
            path: self.path,
            header: self.header,
            payload: self.payload,
        };
        (request, self.udata)
    }
}

/// Lifecycle of a task inside its execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    Built,
    Connecting,
    HeadersSent,
    ResponseReceived,
    StatusQueried,
    Draining,
    Delivered,
    Released,
}

impl TaskState {
    /// The state a task was in when a transport stage failed
    pub(crate) fn at_failure(stage: TransportStage) -> Self {
        match stage {
            TransportStage::Session
            | TransportStage::Connect
            | TransportStage::OpenRequest
            | TransportStage::Send => TaskState::Connecting,
            TransportStage::Receive => TaskState::HeadersSent,
            TransportStage::QueryHeaders => TaskState::ResponseReceived,
            TransportStage::QueryAvailable | TransportStage::Read => TaskState::Draining,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks and logs the state transitions of one task
pub(crate) struct StateTracker {
    task: u64,
    state: TaskState,
    history: Vec<TaskState>,
}

impl StateTracker {
    pub(crate) fn new(task: u64) -> Self {
        Self {
            task,
            state: TaskState::Built,
            history: vec![TaskState::Built],
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state
    }

    /// Every state the task has been in, oldest first
    pub(crate) fn history(&self) -> &[TaskState] {
        &self.history
    }

    pub(crate) fn advance(&mut self, next: TaskState) {
        tracing::trace!(task = self.task, from = %self.state, to = %next, "task state");
        self.state = next;
        self.history.push(next);
    }

    /// Record where the task was when `stage` failed
    pub(crate) fn fail_at(&mut self, stage: TransportStage) {
        self.state = TaskState::at_failure(stage);
        self.history.push(self.state);
    }
}
