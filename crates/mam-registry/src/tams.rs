//! HTTP client for a TAMS-style registry API.

use anyhow::Context;
use async_trait::async_trait;
use mam_core::{RegistryConfig, RetryPolicy, TimeRange};
use mam_storage::Destination;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::client::Registry;
use crate::error::RegistryError;
use crate::types::{
    CreatedSource, FlowBody, FlowRequest, SegmentBody, SourceRequest, StorageAllocation,
    StorageBody, StorageResponse,
};

#[derive(Clone, Debug)]
pub struct TamsClient {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    retry: RetryPolicy,
}

impl TamsClient {
    pub fn new(config: &RegistryConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            retry: config.retry,
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send and map non-success statuses to typed errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response, RegistryError> {
        let response = self.apply_auth(request).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if is_unavailable_status(status) {
            Err(RegistryError::Unavailable(format!(
                "registry returned {}: {}",
                status, body
            )))
        } else {
            Err(RegistryError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RegistryError> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| RegistryError::Rejected {
            status,
            body: format!("invalid response body ({}): {}", e, text),
        })
    }
}

fn is_unavailable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
    )
}

#[async_trait]
impl Registry for TamsClient {
    #[tracing::instrument(skip(self, request), fields(label = %request.label))]
    async fn create_source(&self, request: &SourceRequest) -> Result<String, RegistryError> {
        let url = self.build_url("/sources");
        let created: CreatedSource = self
            .retry
            .retry("registry.create_source", RegistryError::is_retryable, || {
                self.send_json(self.client.post(&url).json(request))
            })
            .await?;

        tracing::info!(source.id = %created.id, "Registry source created");
        Ok(created.id)
    }

    #[tracing::instrument(skip(self, request), fields(source.id = %request.source_id))]
    async fn create_flow(&self, request: &FlowRequest) -> Result<String, RegistryError> {
        // Flows are created with a client-chosen id, so retrying the PUT is idempotent.
        let flow_id = Uuid::new_v4().to_string();
        let url = self.build_url(&format!("/flows/{}", flow_id));
        let body = FlowBody {
            id: &flow_id,
            source_id: &request.source_id,
            format: &request.format,
            label: &request.label,
            description: &request.description,
        };

        self.retry
            .retry("registry.create_flow", RegistryError::is_retryable, || {
                self.send(self.client.put(&url).json(&body))
            })
            .await?;

        tracing::info!(flow.id = %flow_id, "Registry flow created");
        Ok(flow_id)
    }

    #[tracing::instrument(skip(self))]
    async fn allocate_storage(&self, flow_id: &str) -> Result<StorageAllocation, RegistryError> {
        let url = self.build_url(&format!("/flows/{}/storage", flow_id));
        let response: StorageResponse = self
            .retry
            .retry("registry.allocate_storage", RegistryError::is_retryable, || {
                self.send_json(self.client.post(&url).json(&StorageBody { limit: 1 }))
            })
            .await?;

        let object = response
            .media_objects
            .into_iter()
            .next()
            .ok_or_else(|| RegistryError::Rejected {
                status: 200,
                body: "registry returned no media objects".to_string(),
            })?;

        let mut destination = Destination::new(object.put_url.url);
        destination.content_type = object.put_url.content_type;

        Ok(StorageAllocation {
            object_id: object.object_id,
            destination,
        })
    }

    #[tracing::instrument(skip(self), fields(timerange = %range))]
    async fn register_segment(
        &self,
        flow_id: &str,
        object_id: &str,
        range: TimeRange,
    ) -> Result<(), RegistryError> {
        let url = self.build_url(&format!("/flows/{}/segments", flow_id));
        let body = SegmentBody {
            object_id,
            timerange: range.to_string(),
        };

        self.retry
            .retry("registry.register_segment", RegistryError::is_retryable, || {
                self.send(self.client.post(&url).json(&body))
            })
            .await?;

        tracing::debug!("Segment registered");
        Ok(())
    }
}
