//! Per-task execution: drive the transport, drain the body, deliver

use crate::Error;
use crate::backend::Backend;
use crate::backend::types::BackendResponse;
use crate::session::{SessionConfig, SessionInner};
use crate::task::{StateTracker, Task, TaskKind, TaskState};
use std::io;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Run one task to completion.
///
/// Exactly one callback fires: `completion` or `downloaded` on success,
/// `failed` when any step aborts the task.
pub(crate) async fn execute<U>(inner: &SessionInner<U>, backend: &Backend, task: Task<U>) {
    let id = task.id;
    let kind = task.kind;
    let mut tracker = StateTracker::new(id);
    let (request, udata) = task.into_request();

    tracker.advance(TaskState::Connecting);
    let response = match backend.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            if let Some(stage) = e.stage() {
                tracker.fail_at(stage);
            }
            abort(inner, &mut tracker, udata, e);
            return;
        }
    };
    let status = response.status.as_u16();
    record_response(&mut tracker, status);
    tracker.advance(TaskState::Draining);

    match kind {
        TaskKind::Get | TaskKind::Post => match collect_body(response).await {
            Ok(body) => {
                tracing::debug!(task = id, status, bytes = body.len(), "response collected");
                tracker.advance(TaskState::Delivered);
                inner.callbacks.complete(udata, &body, status);
            }
            Err(e) => {
                abort(inner, &mut tracker, udata, e);
                return;
            }
        },
        TaskKind::Download => match download_body(&inner.config, response).await {
            Ok((path, bytes)) => {
                tracing::debug!(task = id, status, bytes, path = %path.display(), "download complete");
                tracker.advance(TaskState::Delivered);
                inner.callbacks.downloaded(udata, &path, status);
                remove_temp(path);
            }
            Err(e) => {
                abort(inner, &mut tracker, udata, e);
                return;
            }
        },
    }

    tracker.advance(TaskState::Released);
}

/// The backend reports send, receive and status query as one step
fn record_response(tracker: &mut StateTracker, status: u16) {
    tracing::trace!(status, "status queried");
    tracker.advance(TaskState::StatusQueried);
}

fn abort<U>(inner: &SessionInner<U>, tracker: &mut StateTracker, udata: U, error: Error) {
    tracing::error!(
        code = error.code(),
        state = %tracker.state(),
        history = ?tracker.history(),
        "task failed: {}",
        error
    );
    inner.callbacks.fail(udata, &error);
    tracker.advance(TaskState::Released);
}

/// Accumulate the whole body in memory
async fn collect_body(mut response: BackendResponse) -> crate::Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = response.body_receiver.recv().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}

/// Stream the body into a fresh temporary file, returning its path and size.
///
/// The file is removed again on every error path.
async fn download_body(
    config: &SessionConfig,
    mut response: BackendResponse,
) -> crate::Result<(TempPath, u64)> {
    let temp = tempfile::Builder::new()
        .prefix(&config.temp_prefix)
        .tempfile_in(std::env::temp_dir())?;
    let (file, path) = temp.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut written: u64 = 0;
    while let Some(chunk) = response.body_receiver.recv().await {
        let chunk = chunk?;
        for piece in chunk.chunks(config.chunk_size) {
            file.write_all(piece).await?;
            written += piece.len() as u64;
        }
        tracing::trace!(written, "download progress");
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    Ok((path, written))
}

/// Delete a delivered download unless the callback already moved it away
fn remove_temp(path: TempPath) {
    let location = path.to_path_buf();
    match path.close() {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::trace!(path = %location.display(), "temporary file already moved");
        }
        Err(e) => {
            tracing::warn!(path = %location.display(), "failed to remove temporary file: {}", e);
        }
    }
}
