//! Session configuration and management

use crate::backend::Backend;
use crate::callback::Callbacks;
use crate::executor;
use crate::request::{HeaderBlock, combine_headers};
use crate::task::{Task, TaskKind};
use crate::{Error, Result};
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::Instrument;

/// Client identity announced to the server
pub const DEFAULT_USER_AGENT: &str = "minimod-client";

/// Largest `max_concurrent` / `max_pending` a session accepts
pub const MAX_TASK_LIMIT: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS
} else {
    u32::MAX as usize
};

/// Whether tasks use TLS regardless of the URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Always request the secure transport variant
    Always,
    /// Use TLS only for `https` URIs (plain-HTTP test servers)
    FromScheme,
}

/// Session configuration
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// let config = netw::SessionConfig::from_json(r#"{ "max_concurrent": 2 }"#).unwrap();
/// assert_eq!(config.max_concurrent, 2);
/// assert_eq!(config.user_agent, "minimod-client");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// User agent sent with every request
    pub user_agent: String,
    /// Resolve proxies from the system configuration
    pub use_default_proxy: bool,
    /// Per-request timeout in milliseconds; the transport default when unset
    pub timeout_ms: Option<u64>,
    /// Maximum number of tasks transferring at the same time
    pub max_concurrent: usize,
    /// Maximum number of accepted tasks not yet finished (queue depth)
    pub max_pending: usize,
    /// Size of the pieces a download is written to disk in
    pub chunk_size: usize,
    /// Prefix of temporary download files
    pub temp_prefix: String,
    /// TLS policy
    pub tls: TlsPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            use_default_proxy: true,
            timeout_ms: None,
            max_concurrent: 8,
            max_pending: 64,
            chunk_size: 4096,
            temp_prefix: "mmi".to_string(),
            tls: TlsPolicy::Always,
        }
    }
}

impl SessionConfig {
    /// Create a configuration builder
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Per-request timeout, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Clamp limits into ranges the session can honor
    fn normalized(mut self) -> Self {
        self.max_concurrent = self.max_concurrent.clamp(1, MAX_TASK_LIMIT);
        self.max_pending = self.max_pending.clamp(1, MAX_TASK_LIMIT);
        self.chunk_size = self.chunk_size.max(1);
        self
    }
}

/// Session configuration builder
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable default proxy settings
    pub fn use_default_proxy(mut self, use_proxy: bool) -> Self {
        self.config.use_default_proxy = use_proxy;
        self
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the maximum number of simultaneous transfers
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.config.max_concurrent = max_concurrent;
        self
    }

    /// Set the maximum number of accepted but unfinished tasks
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.config.max_pending = max_pending;
        self
    }

    /// Set the download write chunk size
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    /// Set the temporary file prefix
    pub fn temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.temp_prefix = prefix.into();
        self
    }

    /// Set the TLS policy
    pub fn tls(mut self, tls: TlsPolicy) -> Self {
        self.config.tls = tls;
        self
    }

    /// Build the configuration
    pub fn build(self) -> SessionConfig {
        self.config.normalized()
    }
}

pub(crate) struct SessionInner<U> {
    pub(crate) config: SessionConfig,
    pub(crate) callbacks: Callbacks<U>,
    backend: ArcSwapOption<Backend>,
    pending: Arc<Semaphore>,
    running: Semaphore,
    closed: AtomicBool,
    next_id: AtomicU64,
    runtime: Handle,
}

/// Handle to the transport and the registered callbacks.
///
/// Requests are fire-and-forget: `get`, `post` and `download` build the task
/// on the calling thread, hand it to the runtime and return. Results arrive
/// only through the [`Callbacks`]. Cloning is cheap and every clone shares
/// the same transport.
///
/// # Examples
///
/// ```no_run
/// use netw::{Callbacks, Session, SessionConfig};
///
/// # async fn example() -> netw::Result<()> {
/// let callbacks = Callbacks::new(
///     |_: (), body: &[u8], status: u16| println!("{status}: {}", String::from_utf8_lossy(body)),
///     |_: (), path: &std::path::Path, status: u16| println!("{status}: {path:?}"),
/// );
/// let session = Session::init(callbacks, SessionConfig::default())?;
/// session.get("https://example.com/catalog", &[("Accept", "application/json")], ())?;
/// session.deinit().await;
/// # Ok(())
/// # }
/// ```
pub struct Session<U> {
    inner: Arc<SessionInner<U>>,
}

impl<U> Clone for Session<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U: Send + 'static> Session<U> {
    /// Acquire the transport and register the callbacks.
    ///
    /// Tasks run on the tokio runtime this is called from.
    pub fn init(callbacks: Callbacks<U>, config: SessionConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            Error::Internal("Session::init must be called within a tokio runtime".to_string())
        })?;
        Self::init_with_runtime(callbacks, config, runtime)
    }

    /// Acquire the transport, running tasks on `runtime`
    pub fn init_with_runtime(
        callbacks: Callbacks<U>,
        config: SessionConfig,
        runtime: Handle,
    ) -> Result<Self> {
        let config = config.normalized();
        let backend = Backend::default_for_platform(&config).inspect_err(|e| {
            tracing::error!(code = e.code(), "Transport open failed: {}", e);
        })?;
        tracing::debug!(
            backend = backend.name(),
            user_agent = %config.user_agent,
            max_concurrent = config.max_concurrent,
            max_pending = config.max_pending,
            "session initialized"
        );

        let inner = SessionInner {
            backend: ArcSwapOption::from_pointee(backend),
            pending: Arc::new(Semaphore::new(config.max_pending)),
            running: Semaphore::new(config.max_concurrent),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            runtime,
            callbacks,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Issue a GET request.
    ///
    /// `Ok` means the task was accepted, not that it completed.
    pub fn get(&self, uri: &str, headers: &[(&str, &str)], udata: U) -> Result<()> {
        tracing::debug!(uri, "get_request");
        let header = combine_headers(headers.iter().copied());
        self.submit(TaskKind::Get, uri, &header, None, udata)
    }

    /// Issue a POST request with a copy of `body` as payload
    pub fn post(&self, uri: &str, headers: &[(&str, &str)], body: &[u8], udata: U) -> Result<()> {
        tracing::debug!(uri, payload_bytes = body.len(), "post_request");
        let header = combine_headers(headers.iter().copied());
        self.submit(TaskKind::Post, uri, &header, Some(body), udata)
    }

    /// Download the response of an empty POST into a temporary file
    pub fn download(&self, uri: &str, udata: U) -> Result<()> {
        tracing::debug!(uri, "download_request");
        self.submit(TaskKind::Download, uri, &HeaderBlock::default(), Some(&[]), udata)
    }

    /// Stop accepting tasks, wait for the accepted ones to finish, then
    /// release the transport.
    ///
    /// Requests issued afterwards fail with [`Error::NotInitialized`].
    pub async fn deinit(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let capacity = self.inner.config.max_pending as u32;
        if let Ok(drained) = self.inner.pending.acquire_many(capacity).await {
            drained.forget();
        }
        self.inner.pending.close();
        self.inner.backend.store(None);
        tracing::debug!("session released");
    }

    /// Whether the session still accepts tasks
    pub fn is_initialized(&self) -> bool {
        !self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of accepted tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        if self.inner.pending.is_closed() {
            return 0;
        }
        self.inner.config.max_pending - self.inner.pending.available_permits()
    }

    /// The configuration in effect
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    fn submit(
        &self,
        kind: TaskKind,
        uri: &str,
        header: &HeaderBlock,
        payload: Option<&[u8]>,
        udata: U,
    ) -> Result<()> {
        if !self.is_initialized() {
            tracing::warn!(uri, "request issued without an initialized session");
            return Err(Error::NotInitialized);
        }
        let backend = self.inner.backend.load_full().ok_or(Error::NotInitialized)?;

        let admission = Arc::clone(&self.inner.pending)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::Closed => Error::NotInitialized,
                // deinit holds every permit while it drains
                TryAcquireError::NoPermits if !self.is_initialized() => Error::NotInitialized,
                TryAcquireError::NoPermits => {
                    tracing::warn!(uri, max_pending = self.inner.config.max_pending, "request queue full");
                    Error::QueueFull(self.inner.config.max_pending)
                }
            })?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let force_tls = self.inner.config.tls == TlsPolicy::Always;
        let task = Task::new(id, kind, uri, header, payload, force_tls, udata);

        let inner = Arc::clone(&self.inner);
        let span = tracing::debug_span!("task", id, %kind);
        self.inner.runtime.spawn(
            async move {
                let _admission = admission;
                let _running = inner.running.acquire().await.ok();
                executor::execute(&inner, &backend, task).await;
            }
            .instrument(span),
        );

        Ok(())
    }
}
