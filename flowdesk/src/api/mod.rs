//! Workflow backend client abstraction and implementations

mod http;

pub use http::HttpWorkflowApi;

use crate::gate::SessionKey;
use crate::stream::ChunkSource;
use crate::template::TemplateSet;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when talking to the workflow backend
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{endpoint} returned HTTP {status} {reason}")]
    Status {
        endpoint: String,
        status: u16,
        reason: String,
        body: String,
    },
}

/// Result of `POST /validate-key`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KeyVerdict {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl KeyVerdict {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// One step of a workflow definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSpec {
    pub action: String,
}

/// Body of `POST /workflows`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateWorkflow {
    pub name: String,
    pub steps: Vec<StepSpec>,
}

impl CreateWorkflow {
    pub fn new<S: AsRef<str>>(name: impl Into<String>, actions: &[S]) -> Self {
        Self {
            name: name.into(),
            steps: actions
                .iter()
                .map(|a| StepSpec {
                    action: a.as_ref().to_string(),
                })
                .collect(),
        }
    }
}

/// Opaque identifier of a created workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowId(pub String);

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WorkflowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // UUID strings in practice, but numeric ids are accepted as well
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(WorkflowId(s)),
            serde_json::Value::Number(n) => Ok(WorkflowId(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "unexpected workflow id: {}",
                other
            ))),
        }
    }
}

/// Response of `POST /workflows`; only the id is used
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedWorkflow {
    pub id: WorkflowId,
}

/// Response of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
}

/// A step output recorded for a past run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepRunSummary {
    pub step_order: u32,
    pub step_type: String,
    #[serde(default)]
    pub output_text: String,
}

/// A past run as listed by `GET /runs`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub workflow_id: String,
    #[serde(default)]
    pub input_text: String,
    pub status: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub step_runs: Vec<StepRunSummary>,
}

/// Trait for workflow backends
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    /// `GET /templates`
    async fn templates(&self) -> Result<TemplateSet, ApiError>;

    /// `POST /validate-key`. A rejection is `Ok` with `valid == false`.
    async fn validate_key(&self, api_key: &str) -> Result<KeyVerdict, ApiError>;

    /// `POST /workflows`
    async fn create_workflow(&self, request: &CreateWorkflow) -> Result<WorkflowId, ApiError>;

    /// `POST /workflows/{id}/run_stream`; the body is returned unread
    async fn run_stream(
        &self,
        id: &WorkflowId,
        key: &SessionKey,
        input_text: &str,
    ) -> Result<Box<dyn ChunkSource>, ApiError>;

    /// `GET /health`
    async fn health(&self) -> Result<HealthReport, ApiError>;

    /// `GET /runs`, most recent first
    async fn recent_runs(&self, skip: u32, limit: u32) -> Result<Vec<RunSummary>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_workflow_body() {
        let body = CreateWorkflow::new("Frontend Workflow", &["clean", "summarize", "tone"]);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Frontend Workflow",
                "steps": [{"action": "clean"}, {"action": "summarize"}, {"action": "tone"}]
            })
        );
    }

    #[test]
    fn test_workflow_id_forms() {
        let created: CreatedWorkflow =
            serde_json::from_str(r#"{"id": "6f1c2a9e-0000-4000-8000-000000000001", "name": "x"}"#)
                .unwrap();
        assert_eq!(created.id.to_string(), "6f1c2a9e-0000-4000-8000-000000000001");

        let numeric: CreatedWorkflow = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(numeric.id, WorkflowId("42".to_string()));

        assert!(serde_json::from_str::<CreatedWorkflow>(r#"{"id": null}"#).is_err());
    }

    #[test]
    fn test_key_verdict_parsing() {
        let body = r#"{"valid": false, "error": "Invalid API Key or connection failed"}"#;
        let verdict: KeyVerdict = serde_json::from_str(body).unwrap();
        assert!(!verdict.valid);
        assert_eq!(
            verdict.error.as_deref(),
            Some("Invalid API Key or connection failed")
        );

        let bare: KeyVerdict = serde_json::from_str("{}").unwrap();
        assert!(!bare.valid);
    }

    #[test]
    fn test_run_summary_parsing() {
        let runs: Vec<RunSummary> = serde_json::from_str(
            r#"[{
                "id": "r1", "workflow_id": "w1", "input_text": "hi",
                "status": "completed", "created_at": "2025-01-01T00:00:00",
                "step_runs": [{"id": "s1", "workflow_run_id": "r1", "step_order": 1,
                               "step_type": "clean", "output_text": "Hi."}]
            }]"#,
        )
        .unwrap();
        assert_eq!(runs[0].step_runs[0].step_type, "clean");
        assert_eq!(runs[0].status, "completed");
    }
}
