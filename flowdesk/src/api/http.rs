//! reqwest client for the workflow backend
//!
//! Request/response calls carry a per-request timeout. The streaming run only
//! bounds the connect phase, since its body stays open for the whole run.

use super::{
    ApiError, CreateWorkflow, CreatedWorkflow, HealthReport, KeyVerdict, RunSummary, WorkflowApi,
    WorkflowId,
};
use crate::gate::SessionKey;
use crate::stream::ChunkSource;
use crate::template::TemplateSet;
use crate::ClientConfig;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// HTTP backend
pub struct HttpWorkflowApi {
    client: Client,
    base_url: String,
    api_key_header: String,
    request_timeout: Duration,
}

impl HttpWorkflowApi {
    /// Create a client from configuration
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key_header: config.api_key_header.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Serialize)]
struct ValidateKeyRequest<'a> {
    api_key: &'a str,
}

#[derive(Serialize)]
struct RunStreamRequest<'a> {
    input_text: &'a str,
}

/// Turn a non-2xx response into [`ApiError::Status`]
async fn ensure_success(endpoint: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(endpoint, status = status.as_u16(), body = %body, "Backend returned error status");
    Err(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
        body,
    })
}

/// Body of a streaming run, pulled one network chunk at a time
struct ResponseChunks {
    response: Response,
}

#[async_trait]
impl ChunkSource for ResponseChunks {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        Ok(self.response.chunk().await?.map(|bytes| bytes.to_vec()))
    }
}

#[async_trait]
impl WorkflowApi for HttpWorkflowApi {
    async fn templates(&self) -> Result<TemplateSet, ApiError> {
        let response = self
            .client
            .get(self.url("/templates"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = ensure_success("/templates", response).await?;
        let templates: TemplateSet = response.json().await?;
        debug!(count = templates.len(), "Loaded templates");
        Ok(templates)
    }

    async fn validate_key(&self, api_key: &str) -> Result<KeyVerdict, ApiError> {
        let response = self
            .client
            .post(self.url("/validate-key"))
            .timeout(self.request_timeout)
            .json(&ValidateKeyRequest { api_key })
            .send()
            .await?;

        // Rejections arrive as 401 with a JSON body explaining why
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<KeyVerdict>(&body) {
            Ok(verdict) if status.is_success() => Ok(verdict),
            Ok(verdict) => Ok(KeyVerdict {
                valid: false,
                error: verdict.error,
            }),
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => Err(ApiError::Status {
                endpoint: "/validate-key".to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
                body,
            }),
        }
    }

    async fn create_workflow(&self, request: &CreateWorkflow) -> Result<WorkflowId, ApiError> {
        let response = self
            .client
            .post(self.url("/workflows"))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;
        let response = ensure_success("/workflows", response).await?;
        let created: CreatedWorkflow = response.json().await?;
        info!(workflow_id = %created.id, "Workflow created");
        Ok(created.id)
    }

    async fn run_stream(
        &self,
        id: &WorkflowId,
        key: &SessionKey,
        input_text: &str,
    ) -> Result<Box<dyn ChunkSource>, ApiError> {
        let path = format!("/workflows/{}/run_stream", id);
        let response = self
            .client
            .post(self.url(&path))
            .header(self.api_key_header.as_str(), key.as_str())
            .json(&RunStreamRequest { input_text })
            .send()
            .await?;
        let response = ensure_success(&path, response).await?;
        info!(workflow_id = %id, "Streaming run started");
        Ok(Box::new(ResponseChunks { response }))
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = ensure_success("/health", response).await?;
        Ok(response.json().await?)
    }

    async fn recent_runs(&self, skip: u32, limit: u32) -> Result<Vec<RunSummary>, ApiError> {
        let response = self
            .client
            .get(self.url("/runs"))
            .query(&[("skip", skip), ("limit", limit)])
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = ensure_success("/runs", response).await?;
        Ok(response.json().await?)
    }
}
