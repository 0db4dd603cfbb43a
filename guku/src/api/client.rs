use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::error::ApiError;
use super::{
    Cluster, ClusterUpdate, GukuApi, NewCluster, NewPlatformBinding, Platform, PlatformBinding,
    PlatformBindingUpdate,
};

/// Guku GraphQL API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    endpoint: url::Url,
    username: String,
    password: String,
    retry_config: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
}

impl RetryConfig {
    /// Exponential backoff before retry `attempt` (1-based), capped at
    /// `max_backoff_ms`
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 2_u64
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        self.initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            timeout_seconds: 30,
        }
    }
}

/// Everything needed to build a [`Client`]
#[derive(Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub retry: RetryConfig,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    #[serde(rename = "operationName")]
    operation_name: &'a str,
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

impl Client {
    /// Create a new API client with default retry configuration
    pub fn new(endpoint: &str, username: &str, password: &str) -> Result<Self, ApiError> {
        Self::from_config(ClientConfig {
            endpoint: endpoint.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        let endpoint = url::Url::parse(&config.endpoint)
            .map_err(|e| ApiError::InvalidEndpoint(format!("{}: {}", config.endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ApiError::InvalidEndpoint(format!(
                "{}: unsupported scheme {}",
                config.endpoint,
                endpoint.scheme()
            )));
        }

        if config.username.is_empty() {
            return Err(ApiError::InvalidCredentials(
                "username cannot be empty".to_string(),
            ));
        }
        if config.password.is_empty() {
            return Err(ApiError::InvalidCredentials(
                "password cannot be empty".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.retry.timeout_seconds))
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                endpoint,
                username: config.username,
                password: config.password,
                retry_config: config.retry,
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.inner.endpoint.as_str()
    }

    /// Execute a GraphQL operation with retry logic and unwrap its `data`
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        operation_name: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ApiError> {
        let body = GraphQlRequest {
            operation_name,
            query,
            variables,
        };

        let mut last_error = None;

        for attempt in 0..=self.inner.retry_config.max_retries {
            if attempt > 0 {
                let backoff = self.inner.retry_config.backoff_ms(attempt);
                tracing::debug!(
                    operation = operation_name,
                    backoff_ms = backoff,
                    attempt,
                    "retrying GraphQL request"
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            tracing::debug!(operation = operation_name, endpoint = %self.inner.endpoint, "POST");

            let sent = self
                .inner
                .http_client
                .post(self.inner.endpoint.clone())
                .basic_auth(&self.inner.username, Some(&self.inner.password))
                .json(&body)
                .send()
                .await;

            match sent {
                Ok(response) => {
                    let status = response.status();
                    tracing::debug!(operation = operation_name, %status, "GraphQL response");

                    if status.is_success() {
                        return self.parse_success_response(operation_name, response).await;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(ApiError::AuthError);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(ApiError::RateLimited);
                    } else if status.is_server_error() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return self.handle_error_response(response).await;
                    }
                }
                Err(e) => {
                    if e.is_timeout() || e.is_connect() {
                        tracing::warn!(operation = operation_name, error = %e, "transient request failure");
                        last_error = Some(ApiError::Request(e));
                    } else {
                        return Err(ApiError::Request(e));
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ApiError::ServiceUnavailable))
    }

    async fn parse_success_response<T: DeserializeOwned>(
        &self,
        operation_name: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        tracing::trace!(operation = operation_name, body = %text, "GraphQL response body");

        let envelope: GraphQlResponse<T> = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(operation = operation_name, error = %e, "failed to deserialize response");
            ApiError::Parse(format!("{}: {}", operation_name, e))
        })?;

        if !envelope.errors.is_empty() {
            return Err(ApiError::GraphQl(
                envelope.errors.into_iter().map(|e| e.message).collect(),
            ));
        }

        envelope
            .data
            .ok_or_else(|| ApiError::Parse(format!("{}: response has no data", operation_name)))
    }

    async fn handle_error_response<T>(&self, response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(ApiError::Api { status, message })
    }
}

#[async_trait]
impl GukuApi for Client {
    async fn create_cluster(&self, cluster: &NewCluster) -> Result<Cluster, ApiError> {
        Client::create_cluster(self, cluster).await
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<Cluster, ApiError> {
        Client::get_cluster(self, cluster_id).await
    }

    async fn update_cluster(
        &self,
        cluster_id: &str,
        update: &ClusterUpdate,
    ) -> Result<(), ApiError> {
        Client::update_cluster(self, cluster_id, update).await
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ApiError> {
        Client::delete_cluster(self, cluster_id).await
    }

    async fn create_platform_binding(
        &self,
        binding: &NewPlatformBinding,
    ) -> Result<PlatformBinding, ApiError> {
        Client::create_platform_binding(self, binding).await
    }

    async fn get_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
    ) -> Result<PlatformBinding, ApiError> {
        Client::get_platform_binding(self, cluster_id, binding_id).await
    }

    async fn update_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
        update: &PlatformBindingUpdate,
    ) -> Result<PlatformBinding, ApiError> {
        Client::update_platform_binding(self, cluster_id, binding_id, update).await
    }

    async fn delete_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
    ) -> Result<(), ApiError> {
        Client::delete_platform_binding(self, cluster_id, binding_id).await
    }

    async fn get_platform(
        &self,
        platform_id: &str,
        platform_version: &str,
    ) -> Result<Option<Platform>, ApiError> {
        Client::get_platform(self, platform_id, platform_version).await
    }
}
