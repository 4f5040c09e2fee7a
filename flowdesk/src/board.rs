//! Per-step result panels and the shared message area

use crate::selection::Step;

/// Display state of one step's result panel
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepStatus {
    #[default]
    Waiting,
    Running,
    /// Backend is re-running the step after an empty result
    Retrying { reason: Option<String> },
    Completed,
    /// The run failed while this step was in flight
    Failed,
}

impl StepStatus {
    /// Indicator text
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Waiting => "Waiting...",
            StepStatus::Running => "Processing...",
            StepStatus::Retrying { .. } => "Retrying...",
            StepStatus::Completed => "Completed",
            StepStatus::Failed => "Failed",
        }
    }

    /// Short style name for renderers
    pub fn class(&self) -> &'static str {
        match self {
            StepStatus::Waiting => "waiting",
            StepStatus::Running | StepStatus::Retrying { .. } => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, StepStatus::Running | StepStatus::Retrying { .. })
    }
}

/// A change applied to the board by one stream message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardUpdate {
    StepStarted(Step),
    Chunk { step: Step, text: String },
    StepRetrying { step: Step, reason: Option<String> },
    StepCompleted(Step),
    WorkflowCompleted { run_id: Option<String> },
    /// In-band error; the run is over
    Failed { message: String },
}

/// Result panel for a single step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepPanel {
    pub visible: bool,
    pub action_label: String,
    pub output: String,
    pub status: StepStatus,
}

/// The three result panels of the current run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunBoard {
    panels: [StepPanel; 3],
    visible: bool,
    run_id: Option<String>,
}

impl RunBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn panel(&self, step: Step) -> &StepPanel {
        &self.panels[step.index()]
    }

    pub fn panels(&self) -> &[StepPanel; 3] {
        &self.panels
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Run id reported by the backend when the workflow completed
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Show all panels, empty and waiting, named after the chosen actions
    pub fn reset_for_run(&mut self, labels: [&str; 3]) {
        self.visible = true;
        self.run_id = None;
        for (panel, label) in self.panels.iter_mut().zip(labels) {
            *panel = StepPanel {
                visible: true,
                action_label: label.to_string(),
                output: String::new(),
                status: StepStatus::Waiting,
            };
        }
    }

    pub fn apply(&mut self, update: &BoardUpdate) {
        match update {
            BoardUpdate::StepStarted(step) => {
                self.panels[step.index()].status = StepStatus::Running;
            }
            BoardUpdate::Chunk { step, text } => {
                self.panels[step.index()].output.push_str(text);
            }
            BoardUpdate::StepRetrying { step, reason } => {
                self.panels[step.index()].status = StepStatus::Retrying {
                    reason: reason.clone(),
                };
            }
            BoardUpdate::StepCompleted(step) => {
                self.panels[step.index()].status = StepStatus::Completed;
            }
            BoardUpdate::WorkflowCompleted { run_id } => {
                self.run_id = run_id.clone();
            }
            BoardUpdate::Failed { .. } => {
                for panel in self.panels.iter_mut().filter(|p| p.status.is_active()) {
                    panel.status = StepStatus::Failed;
                }
            }
        }
    }
}

/// The single area where user-visible errors are shown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageArea {
    text: Option<String>,
}

impl MessageArea {
    pub fn show(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn clear(&mut self) {
        self.text = None;
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.text.is_some()
    }
}

/// A submit button: enabled flag plus its current caption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitControl {
    pub enabled: bool,
    pub label: &'static str,
}

impl SubmitControl {
    pub fn idle(label: &'static str) -> Self {
        Self {
            enabled: true,
            label,
        }
    }

    pub fn busy(label: &'static str) -> Self {
        Self {
            enabled: false,
            label,
        }
    }
}
