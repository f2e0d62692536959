// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of a batch to the collection endpoint.
//!
//! The pipeline only depends on the [`Transport`] trait. [`HttpTransport`] is
//! the default implementation and speaks the Atom bulk API:
//!
//! - `POST {endpoint}bulk` with a JSON body
//!   `{"table": stream, "data": "<JSON array>", "bulk": true, "auth": hmac}`
//! - SDK identification headers on every request
//! - a per-request timeout and an optional HTTPS proxy

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::error;

use crate::auth;
use crate::config::TrackerConfig;
use crate::constants::{SDK_TYPE, SDK_VERSION};

const SDK_TYPE_HEADER: &str = "x-ironsource-atom-sdk-type";
const SDK_VERSION_HEADER: &str = "x-ironsource-atom-sdk-version";

/// One delivery attempt for a batch.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub endpoint: String,
    pub credential: String,
    pub stream: String,
    pub batch: Arc<[String]>,
}

/// Any HTTP response, whatever its status.
///
/// For statuses in `[200, 400)` the response text is in `body`, otherwise it
/// is in `error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<String>,
    pub error: Option<String>,
}

impl TransportResponse {
    pub fn from_status(status: u16, text: String) -> Self {
        if (200..400).contains(&status) {
            Self {
                status,
                body: Some(text),
                error: None,
            }
        } else {
            Self {
                status,
                body: None,
                error: Some(text),
            }
        }
    }
}

/// Failure before any HTTP status was received.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`, giving up after `timeout`.
    async fn deliver(
        &self,
        request: &TransportRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Serialize)]
struct BulkBody<'a> {
    table: &'a str,
    data: String,
    bulk: bool,
    auth: String,
}

/// `{endpoint}bulk`, tolerating an endpoint without a trailing slash.
pub fn bulk_url(endpoint: &str) -> String {
    if endpoint.ends_with('/') {
        format!("{endpoint}bulk")
    } else {
        format!("{endpoint}/bulk")
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TrackerConfig) -> Self {
        Self::with_client(get_client(config))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(
        &self,
        request: &TransportRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let data = serde_json::to_string(&*request.batch)?;
        let body = BulkBody {
            table: &request.stream,
            auth: auth::sign(&request.credential, &data),
            data,
            bulk: true,
        };

        let map_error = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout(timeout)
            } else {
                TransportError::Connection(e.to_string())
            }
        };

        let response = self
            .client
            .post(bulk_url(&request.endpoint))
            .header(SDK_TYPE_HEADER, SDK_TYPE)
            .header(SDK_VERSION_HEADER, SDK_VERSION)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_error)?;
        Ok(TransportResponse::from_status(status, text))
    }
}

/// Builds the reqwest client, falling back to a direct connection when the
/// proxy configuration is unusable.
#[must_use]
pub fn get_client(config: &TrackerConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &TrackerConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(proxy) = &config.https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(proxy)?);
        }
    }

    Ok(builder.build()?)
}
