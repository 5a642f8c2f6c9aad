//! HTTP backend client
//!
//! JSON-over-HTTP implementation of the [`RemoteClient`] port. Endpoints are
//! appended to a base URL and mapped onto verbs:
//!
//! | operation | request |
//! |-----------|---------|
//! | create    | `POST {base}{endpoint}` with the payload as JSON body |
//! | read      | `GET {base}{endpoint}` |
//! | update    | `PUT {base}{endpoint}` with the payload as JSON body |
//! | delete    | `DELETE {base}{endpoint}` |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use offsync_core::ports::RemoteClient;
//! use offsync_remote::HttpRemoteClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = HttpRemoteClient::new("https://api.example.com", Duration::from_secs(30))?
//!     .with_bearer_token("token");
//! let record = client.read("/goals/1/steps").await?;
//! println!("{}", record.data);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, trace};

use offsync_core::ports::{RemoteClient, RemoteError, RemoteRecord};

/// Longest error body excerpt kept in [`RemoteError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for the backend
pub struct HttpRemoteClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL every endpoint is appended to
    base_url: String,
    /// Optional bearer token sent with every request
    bearer_token: Option<String>,
}

impl HttpRemoteClient {
    /// Creates a client for `base_url` whose requests time out after `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            bearer_token: None,
        })
    }

    /// Sends `Authorization: Bearer {token}` with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a request builder for the given method and endpoint
    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        let builder = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, endpoint: &str) -> Result<Response, RemoteError> {
        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        trace!(endpoint, status = status.as_u16(), "Received response");

        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(endpoint.to_string())),
            StatusCode::CONFLICT => {
                let body = response.text().await.unwrap_or_default();
                let current = serde_json::from_str::<Value>(&body)
                    .ok()
                    .map(RemoteRecord::from_json);
                Err(RemoteError::Conflict { current })
            }
            _ => {
                let mut message = response.text().await.unwrap_or_default();
                if message.len() > MAX_ERROR_BODY {
                    let cut = (0..=MAX_ERROR_BODY)
                        .rev()
                        .find(|i| message.is_char_boundary(*i))
                        .unwrap_or(0);
                    message.truncate(cut);
                }
                Err(RemoteError::Status {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Sends a write and decodes the server's representation
    ///
    /// An empty success body (e.g. `204 No Content`) echoes the sent payload.
    async fn write(
        &self,
        method: Method,
        endpoint: &str,
        data: &Value,
    ) -> Result<RemoteRecord, RemoteError> {
        debug!(%method, endpoint, "Sending write");
        let response = self
            .send(self.request(method, endpoint).json(data), endpoint)
            .await?;
        let body = response.text().await.map_err(map_transport_error)?;

        if body.trim().is_empty() {
            return Ok(RemoteRecord::new(data.clone()));
        }
        decode(&body)
    }
}

fn decode(body: &str) -> Result<RemoteRecord, RemoteError> {
    serde_json::from_str::<Value>(body)
        .map(RemoteRecord::from_json)
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

fn map_transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::Network(e.to_string())
    }
}

#[async_trait::async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn create(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError> {
        self.write(Method::POST, endpoint, data).await
    }

    async fn read(&self, endpoint: &str) -> Result<RemoteRecord, RemoteError> {
        debug!(endpoint, "Reading resource");
        let response = self
            .send(self.request(Method::GET, endpoint), endpoint)
            .await?;
        let body = response.text().await.map_err(map_transport_error)?;
        decode(&body)
    }

    async fn update(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError> {
        self.write(Method::PUT, endpoint, data).await
    }

    async fn delete(&self, endpoint: &str) -> Result<(), RemoteError> {
        debug!(endpoint, "Deleting resource");
        self.send(self.request(Method::DELETE, endpoint), endpoint)
            .await?;
        Ok(())
    }
}
