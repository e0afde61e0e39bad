//! Pooled JSON-over-HTTP client for one dependency.

use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;

use super::config::HttpClientConfig;
use super::request::CallRequest;
use crate::{HeimdallError, Result};

/// HTTP collaborator for one downstream dependency.
///
/// At most `max_connections` requests are on the wire at once; further
/// calls queue for a slot in arrival order. Response bodies are decoded on
/// blocking workers, at most `thread_pool_size` at a time.
#[derive(Clone)]
pub struct WebClient {
    http: Client,
    base_url: String,
    pool_name: String,
    connections: Arc<Semaphore>,
    decoders: Arc<Semaphore>,
}

impl std::fmt::Debug for WebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebClient")
            .field("base_url", &self.base_url)
            .field("pool_name", &self.pool_name)
            .finish_non_exhaustive()
    }
}

impl WebClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .connect_timeout(config.connection_timeout())
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_connections)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                HeimdallError::Configuration(format!(
                    "failed to build HTTP client '{}': {e}",
                    config.pool_name
                ))
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            pool_name: config.pool_name.clone(),
            connections: Arc::new(Semaphore::new(config.max_connections)),
            decoders: Arc::new(Semaphore::new(config.thread_pool_size)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    /// GET `base_url + path` and decode the JSON body into `T`.
    ///
    /// An empty body decodes as JSON `null`, so `Option<T>` yields `None`.
    pub async fn get_json<T>(&self, request: &CallRequest) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let connection = self.connections.acquire().await.map_err(|_| {
            HeimdallError::Http(format!("connection pool '{}' closed", self.pool_name))
        })?;

        let url = format!("{}{}", self.base_url, request.path());
        let mut builder = self.http.get(&url);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.request_body() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let response = handle_response_errors(response).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        drop(connection);

        let _decoder = self.decoders.acquire().await.map_err(|_| {
            HeimdallError::Http(format!("decoder pool '{}' closed", self.pool_name))
        })?;
        tokio::task::spawn_blocking(move || decode(&bytes))
            .await
            .map_err(|e| HeimdallError::Http(format!("decoder task failed: {e}")))?
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        bytes
    };
    Ok(serde_json::from_slice(body)?)
}

fn transport_error(err: reqwest::Error) -> HeimdallError {
    if err.is_timeout() {
        HeimdallError::TransportTimeout(err.to_string())
    } else {
        HeimdallError::Http(err.to_string())
    }
}

/// Check response status and map to the matching error.
async fn handle_response_errors(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = if text.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        text
    };

    if status.is_client_error() {
        Err(HeimdallError::ClientRequest {
            status: code,
            message,
        })
    } else {
        Err(HeimdallError::ServerFault {
            status: code,
            message,
        })
    }
}
