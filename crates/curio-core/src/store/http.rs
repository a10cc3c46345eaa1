//! HTTP implementation of the remote document store contract.
//!
//! Talks JSON to the Curio API (`/v1/items/{id}`, `/v1/collections/{id}`).
//! All failures are classified into [`RemoteError`] here so the queue
//! processor can decide retry behavior without inspecting HTTP details.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, RemoteError, Result};
use crate::models::EntityKind;
use crate::store::traits::RemoteStore;
use crate::util::{compact_text, is_http_url};

/// Default per-request timeout; a timed-out call classifies as transient
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the HTTP remote store
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// API base URL (e.g. `https://api.curio.app`)
    pub base_url: String,
    /// Bearer token for authenticated requests
    pub auth_token: Option<String>,
    /// Explicit per-request timeout
    pub request_timeout: Duration,
}

impl RemoteConfig {
    /// Create a configuration with the default request timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            auth_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Attach a bearer token
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Override the per-request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Remote document store backed by the Curio HTTP API
pub struct HttpRemoteStore {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    /// Build a store from the given configuration
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| Error::InvalidInput(format!("HTTP client build failed: {error}")))?;
        Ok(Self { config, client })
    }

    fn entity_url(&self, kind: EntityKind, id: &str) -> String {
        format!("{}/v1/{kind}s/{id}", self.config.base_url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, RemoteError> {
        request.send().await.map_err(classify_request_error)
    }

    /// Map a non-success response to a classified error
    async fn reject(response: Response) -> RemoteError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_status(status, parse_api_error(status, &body))
    }

    async fn expect_success(response: Response) -> std::result::Result<(), RemoteError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::reject(response).await)
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn create(
        &self,
        kind: EntityKind,
        id: &str,
        data: &Value,
    ) -> std::result::Result<(), RemoteError> {
        let url = self.entity_url(kind, id);
        let response = self.send(self.request(Method::POST, &url).json(data)).await?;
        Self::expect_success(response).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        data: &Value,
    ) -> std::result::Result<(), RemoteError> {
        let url = self.entity_url(kind, id);
        let response = self.send(self.request(Method::PUT, &url).json(data)).await?;
        Self::expect_success(response).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> std::result::Result<(), RemoteError> {
        let url = self.entity_url(kind, id);
        let response = self.send(self.request(Method::DELETE, &url)).await?;
        Self::expect_success(response).await
    }

    async fn get(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> std::result::Result<Option<Value>, RemoteError> {
        let url = self.entity_url(kind, id);
        let response = self.send(self.request(Method::GET, &url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|error| RemoteError::Permanent(format!("invalid JSON body: {error}")))?;
        Ok(Some(value))
    }

    async fn count_children(
        &self,
        parent_kind: EntityKind,
        parent_id: &str,
    ) -> std::result::Result<i64, RemoteError> {
        #[derive(Deserialize)]
        struct CountBody {
            count: i64,
        }

        let url = format!(
            "{}/v1/{parent_kind}s/{parent_id}/children/count",
            self.config.base_url
        );
        let response = self.send(self.request(Method::GET, &url)).await?;
        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }

        let body = response
            .json::<CountBody>()
            .await
            .map_err(|error| RemoteError::Permanent(format!("invalid count body: {error}")))?;
        Ok(body.count)
    }

    async fn list_children(
        &self,
        parent_kind: EntityKind,
        parent_id: &str,
    ) -> std::result::Result<Vec<Value>, RemoteError> {
        let url = format!(
            "{}/v1/{parent_kind}s/{parent_id}/children",
            self.config.base_url
        );
        let response = self.send(self.request(Method::GET, &url)).await?;
        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|error| RemoteError::Permanent(format!("invalid list body: {error}")))
    }

    async fn list_owned(
        &self,
        kind: EntityKind,
        owner_id: &str,
    ) -> std::result::Result<Vec<Value>, RemoteError> {
        let url = format!("{}/v1/{kind}s", self.config.base_url);
        let response = self
            .send(self.request(Method::GET, &url).query(&[("owner_id", owner_id)]))
            .await?;
        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|error| RemoteError::Permanent(format!("invalid list body: {error}")))
    }
}

/// Classify an HTTP status into an error.
///
/// 409 means another writer got there first; the next drain re-reads the
/// entity and routes it through conflict detection, so it is retryable.
fn classify_status(status: StatusCode, message: String) -> RemoteError {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::CONFLICT
    {
        RemoteError::Transient(message)
    } else if status == StatusCode::NOT_FOUND {
        RemoteError::NotFound(message)
    } else {
        RemoteError::Permanent(message)
    }
}

/// Classify a reqwest transport error (no response received)
fn classify_request_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() || error.is_connect() {
        RemoteError::Transient(error.to_string())
    } else {
        RemoteError::Permanent(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(
            "base URL must not be empty".to_string(),
        ));
    }
    if is_http_url(trimmed) {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}
