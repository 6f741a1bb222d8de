//! Caller-supplied completion callbacks

use crate::Error;
use std::path::Path;

type CompletionFn<U> = dyn Fn(U, &[u8], u16) + Send + Sync + 'static;
type DownloadedFn<U> = dyn Fn(U, &Path, u16) + Send + Sync + 'static;
type FailedFn<U> = dyn Fn(U, &Error) + Send + Sync + 'static;

/// Callbacks registered with a [`crate::Session`].
///
/// Every task invokes exactly one of them, exactly once, from the task's own
/// execution unit. The `udata` token handed to `get`/`post`/`download` is
/// moved into that call unchanged.
///
/// # Examples
///
/// ```
/// use netw::Callbacks;
///
/// let callbacks = Callbacks::new(
///     |id: u32, body: &[u8], status: u16| println!("#{id}: {status}, {} bytes", body.len()),
///     |id: u32, path: &std::path::Path, status: u16| println!("#{id}: {status} at {path:?}"),
/// )
/// .on_failure(|id: u32, error: &netw::Error| eprintln!("#{id} failed: {error}"));
/// # let _ = callbacks;
/// ```
pub struct Callbacks<U> {
    completion: Box<CompletionFn<U>>,
    downloaded: Box<DownloadedFn<U>>,
    failed: Option<Box<FailedFn<U>>>,
}

impl<U> Callbacks<U> {
    /// Register the completion and downloaded callbacks.
    ///
    /// `completion` receives the full response body and status of a GET or
    /// POST. `downloaded` receives the path of the temporary file holding a
    /// download; the file is deleted as soon as the callback returns, so it
    /// must be consumed or moved before then.
    pub fn new<C, D>(completion: C, downloaded: D) -> Self
    where
        C: Fn(U, &[u8], u16) + Send + Sync + 'static,
        D: Fn(U, &Path, u16) + Send + Sync + 'static,
    {
        Self {
            completion: Box::new(completion),
            downloaded: Box::new(downloaded),
            failed: None,
        }
    }

    /// Register a callback for tasks that abort before delivering a result.
    ///
    /// Without one, failed tasks are only logged and their `udata` dropped.
    pub fn on_failure<F>(mut self, failed: F) -> Self
    where
        F: Fn(U, &Error) + Send + Sync + 'static,
    {
        self.failed = Some(Box::new(failed));
        self
    }

    pub(crate) fn complete(&self, udata: U, body: &[u8], status: u16) {
        (self.completion)(udata, body, status);
    }

    pub(crate) fn downloaded(&self, udata: U, path: &Path, status: u16) {
        (self.downloaded)(udata, path, status);
    }

    pub(crate) fn fail(&self, udata: U, error: &Error) {
        if let Some(failed) = &self.failed {
            failed(udata, error);
        }
    }
}
