//! Reqwest backend for cross-platform HTTP support

use crate::backend::types::{BODY_CHANNEL_DEPTH, BackendRequest, BackendResponse};
use crate::error::TransportStage;
use crate::request::split_header_block;
use crate::session::SessionConfig;
use crate::{Error, Result};
use futures_util::StreamExt;
use tokio::sync::mpsc;

/// Reqwest backend for cross-platform HTTP
#[derive(Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Create a new Reqwest backend with configuration
    pub fn with_config(config: &SessionConfig) -> Result<Self> {
        // hyper lowercases header names on the wire unless asked otherwise
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .http1_title_case_headers();

        if !config.use_default_proxy {
            builder = builder.no_proxy();
        }

        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| {
            Error::transport(
                TransportStage::Session,
                -1,
                format!("Failed to create reqwest client: {}", e),
            )
        })?;

        Ok(Self { client })
    }

    /// Execute an HTTP request using reqwest
    pub async fn execute(&self, request: BackendRequest) -> Result<BackendResponse> {
        let scheme = if request.secure { "https" } else { "http" };
        let target = format!(
            "{}://{}:{}{}",
            scheme,
            request.host.to_utf8(),
            request.port,
            request.path.to_utf8()
        );
        let url = url::Url::parse(&target).map_err(|e| {
            Error::transport(
                TransportStage::Connect,
                -1,
                format!("Invalid target {}: {}", target, e),
            )
        })?;

        // Open request
        let mut req_builder = self.client.request(request.method, url);

        // Entries keep their order, except that a repeated name is sent
        // together with its first occurrence.
        let header = request.header.to_utf8();
        for (name, value) in split_header_block(&header) {
            req_builder = req_builder.header(name, value);
        }

        if let Some(payload) = request.payload {
            req_builder = req_builder
                .header(http::header::CONTENT_LENGTH, payload.len())
                .body(payload);
        }

        // Send request and wait for the response headers
        let response = req_builder.send().await.map_err(|e| {
            let stage = if e.is_connect() {
                TransportStage::Connect
            } else if e.is_builder() {
                TransportStage::OpenRequest
            } else if e.is_request() || e.is_body() {
                TransportStage::Send
            } else {
                TransportStage::Receive
            };
            Error::transport(stage, -1, format!("Request failed: {}", e))
        })?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "response received");

        // Create channel for streaming body
        let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);

        // Stream response body
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        if tx.send(Ok(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(Error::transport(
                                TransportStage::Read,
                                -1,
                                format!("Stream error: {}", e),
                            )))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(BackendResponse {
            status,
            body_receiver: rx,
        })
    }
}
