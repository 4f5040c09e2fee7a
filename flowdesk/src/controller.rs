//! Workflow builder controller
//!
//! Ties the selection coordinator, credential gate and stream interpreter to
//! a [`WorkflowApi`]. A run goes through three phases: local validation, a
//! synchronous reset of the result panels, then workflow creation and the
//! streaming read.

use crate::api::{ApiError, CreateWorkflow, WorkflowApi, WorkflowId};
use crate::board::{MessageArea, RunBoard, SubmitControl};
use crate::gate::{CredentialGate, SessionStore};
use crate::selection::{SelectionError, Selections, Step};
use crate::stream::{RunObserver, StreamInterpreter, StreamOutcome};
use crate::template::TemplateSet;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RUN_LABEL: &str = "Run";
const RUNNING_LABEL: &str = "Running...";

/// Why a run did not complete. `Display` is the text shown to the user.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("API Key missing. Please refresh and log in again.")]
    MissingKey,

    #[error("Please enter some input text.")]
    EmptyInput,

    #[error("Please select actions for all 3 steps.")]
    IncompleteSelection,

    #[error("Failed to create workflow definition.")]
    CreateFailed,

    #[error("Streaming failed: {0}")]
    StreamRejected(String),

    #[error("{0}")]
    Transport(#[from] ApiError),

    /// Error message delivered inside the stream
    #[error("{0}")]
    Stream(String),
}

impl RunError {
    /// True for problems caught before any network call
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            RunError::MissingKey | RunError::EmptyInput | RunError::IncompleteSelection
        )
    }
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        workflow_id: WorkflowId,
        run_id: Option<String>,
    },
    /// `workflow_id` is unset when cancelled before creation finished
    Cancelled {
        workflow_id: Option<WorkflowId>,
    },
}

/// State and behavior of the workflow builder
pub struct Controller {
    api: Arc<dyn WorkflowApi>,
    workflow_name: String,
    gate: CredentialGate,
    selections: Selections,
    templates: TemplateSet,
    board: RunBoard,
    message: MessageArea,
    submit: SubmitControl,
}

impl Controller {
    /// Create a controller
    pub fn new(
        api: Arc<dyn WorkflowApi>,
        store: Box<dyn SessionStore>,
        workflow_name: impl Into<String>,
    ) -> Self {
        Self {
            api,
            workflow_name: workflow_name.into(),
            gate: CredentialGate::new(store),
            selections: Selections::new(),
            templates: TemplateSet::default(),
            board: RunBoard::new(),
            message: MessageArea::default(),
            submit: SubmitControl::idle(RUN_LABEL),
        }
    }

    pub fn gate(&self) -> &CredentialGate {
        &self.gate
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn board(&self) -> &RunBoard {
        &self.board
    }

    pub fn message(&self) -> &MessageArea {
        &self.message
    }

    pub fn submit_control(&self) -> SubmitControl {
        self.submit
    }

    /// Load templates, then silently restore a remembered key
    pub async fn startup(&mut self) -> bool {
        self.load_templates().await;
        self.gate.restore(self.api.as_ref()).await
    }

    /// Fetch templates; failures are logged and leave the list empty
    pub async fn load_templates(&mut self) -> usize {
        match self.api.templates().await {
            Ok(templates) => {
                debug!(count = templates.len(), "Templates loaded");
                self.templates = templates;
            }
            Err(e) => {
                warn!(error = %e, "Error loading templates");
                self.templates = TemplateSet::default();
            }
        }
        self.templates.len()
    }

    /// Explicit key submission from the gate
    pub async fn submit_key(&mut self, raw_key: &str) -> bool {
        self.gate.submit(self.api.as_ref(), raw_key).await
    }

    /// Silent re-validation of a remembered key
    pub async fn restore_session(&mut self) -> bool {
        self.gate.restore(self.api.as_ref()).await
    }

    pub fn select(&mut self, step: Step, value: &str) -> Result<(), SelectionError> {
        self.selections.select(step, value)
    }

    pub fn clear_step(&mut self, step: Step) {
        self.selections.clear(step);
    }

    /// Apply the template stored under `key`; unknown keys change nothing
    pub fn apply_template(&mut self, key: &str) -> bool {
        match self.templates.get(key) {
            Some(template) => self.selections.apply_template(&template.steps),
            None => {
                debug!(key, "Unknown template");
                false
            }
        }
    }

    /// Run the selected workflow over `input_text`.
    ///
    /// Any error is also shown in the message area; the submit control is
    /// idle again when this returns.
    pub async fn run<O: RunObserver + ?Sized>(
        &mut self,
        input_text: &str,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        self.message.clear();
        let result = self.execute(input_text, observer, cancel).await;
        if let Err(e) = &result {
            self.message.show(e.to_string());
        }
        self.submit = SubmitControl::idle(RUN_LABEL);
        result
    }

    async fn execute<O: RunObserver + ?Sized>(
        &mut self,
        input_text: &str,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let key = self.gate.key().cloned().ok_or(RunError::MissingKey)?;
        if input_text.is_empty() {
            return Err(RunError::EmptyInput);
        }
        let actions = self
            .selections
            .complete()
            .ok_or(RunError::IncompleteSelection)?;

        self.submit = SubmitControl::busy(RUNNING_LABEL);
        self.board
            .reset_for_run([actions[0].label, actions[1].label, actions[2].label]);

        let values = actions.map(|a| a.value);
        let request = CreateWorkflow::new(self.workflow_name.clone(), &values);
        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Run cancelled while creating the workflow");
                return Ok(RunOutcome::Cancelled { workflow_id: None });
            }
            created = self.api.create_workflow(&request) => created,
        };
        let workflow_id = created.map_err(|e| match e {
            ApiError::Status { .. } => RunError::CreateFailed,
            other => RunError::Transport(other),
        })?;

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(workflow_id = %workflow_id, "Run cancelled before the stream opened");
                return Ok(RunOutcome::Cancelled {
                    workflow_id: Some(workflow_id.clone()),
                });
            }
            opened = self.api.run_stream(&workflow_id, &key, input_text) => opened,
        };
        let mut source = opened.map_err(|e| match e {
            ApiError::Status { reason, .. } => RunError::StreamRejected(reason),
            other => RunError::Transport(other),
        })?;

        let mut interpreter = StreamInterpreter::new();
        let outcome = interpreter
            .interpret(source.as_mut(), &mut self.board, observer, cancel)
            .await?;
        info!(
            workflow_id = %workflow_id,
            stats = ?interpreter.stats(),
            outcome = ?outcome,
            "Run stream ended"
        );

        match outcome {
            StreamOutcome::Finished => Ok(RunOutcome::Completed {
                run_id: self.board.run_id().map(str::to_string),
                workflow_id,
            }),
            StreamOutcome::Cancelled => Ok(RunOutcome::Cancelled {
                workflow_id: Some(workflow_id),
            }),
            StreamOutcome::Failed(message) => Err(RunError::Stream(message)),
        }
    }
}
