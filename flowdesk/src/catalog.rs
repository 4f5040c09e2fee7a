//! Fixed catalog of text-processing actions

use serde::Serialize;

/// A single action a workflow step can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Action {
    /// Stable identifier sent to the backend
    pub value: &'static str,
    /// Human-readable label
    pub label: &'static str,
}

/// Every action the backend accepts, in display order
pub static ACTIONS: [Action; 7] = [
    Action { value: "clean", label: "Clean" },
    Action { value: "summarize", label: "Summarize" },
    Action { value: "keypoints", label: "Keypoints" },
    Action { value: "simplify", label: "Simplify" },
    Action { value: "analogy", label: "Analogy" },
    Action { value: "classify", label: "Classify" },
    Action { value: "tone", label: "Tone Analysis" },
];

/// Look up a catalog entry by its identifier
pub fn find(value: &str) -> Option<&'static Action> {
    ACTIONS.iter().find(|a| a.value == value)
}

/// Display label for an identifier, falling back to the identifier itself
pub fn label_for(value: &str) -> &str {
    find(value).map(|a| a.label).unwrap_or(value)
}
