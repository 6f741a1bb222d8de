//! Backend abstraction for HTTP transport implementations

pub mod types;

#[cfg(all(windows, feature = "backend-winhttp"))]
pub mod winhttp;

#[cfg(feature = "backend-reqwest")]
pub mod reqwest;

use crate::Result;
use crate::session::SessionConfig;
use types::{BackendRequest, BackendResponse};

/// HTTP transport implementations
#[derive(Clone)]
pub enum Backend {
    /// Native Windows implementation using WinHTTP
    #[cfg(all(windows, feature = "backend-winhttp"))]
    WinHttp(winhttp::WinHttpBackend),

    /// Cross-platform implementation using reqwest
    #[cfg(feature = "backend-reqwest")]
    Reqwest(reqwest::ReqwestBackend),
}

impl Backend {
    /// Auto-select best backend for platform
    pub fn default_for_platform(config: &SessionConfig) -> Result<Self> {
        #[cfg(all(windows, feature = "backend-winhttp"))]
        {
            Ok(Backend::WinHttp(winhttp::WinHttpBackend::with_config(config)?))
        }

        #[cfg(all(
            feature = "backend-reqwest",
            not(all(windows, feature = "backend-winhttp"))
        ))]
        {
            Ok(Backend::Reqwest(reqwest::ReqwestBackend::with_config(config)?))
        }
    }

    /// Execute an HTTP request, returning once the status code is known
    pub async fn execute(&self, request: BackendRequest) -> Result<BackendResponse> {
        match self {
            #[cfg(all(windows, feature = "backend-winhttp"))]
            Backend::WinHttp(w) => w.execute(request).await,

            #[cfg(feature = "backend-reqwest")]
            Backend::Reqwest(r) => r.execute(request).await,
        }
    }

    /// Short backend name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(all(windows, feature = "backend-winhttp"))]
            Backend::WinHttp(_) => "winhttp",

            #[cfg(feature = "backend-reqwest")]
            Backend::Reqwest(_) => "reqwest",
        }
    }
}
