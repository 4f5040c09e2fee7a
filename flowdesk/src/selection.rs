//! Step selection coordinator
//!
//! Keeps the three step choices mutually exclusive: step 2 never offers the
//! action chosen for step 1, and step 3 never offers either of the first two.
//! Option lists are recomputed by [`rebuild_options`], which takes the value
//! to preserve as an argument so a rebuild never has to read back a selection
//! it just cleared.

use crate::catalog::{self, Action, ACTIONS};
use thiserror::Error;
use tracing::debug;

/// Label of the disabled entry shown when nothing is selected
pub const PLACEHOLDER_LABEL: &str = "Select Action";

/// Errors from user selection
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Action '{value}' is not available for step {step}")]
    NotOffered { step: u8, value: String },
}

/// One of the three ordered workflow slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    One,
    Two,
    Three,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::One, Step::Two, Step::Three];

    /// 1-based step number as used on the wire
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn index(self) -> usize {
        match self {
            Step::One => 0,
            Step::Two => 1,
            Step::Three => 2,
        }
    }

    pub fn from_number(n: i64) -> Option<Step> {
        match n {
            1 => Some(Step::One),
            2 => Some(Step::Two),
            3 => Some(Step::Three),
            _ => None,
        }
    }
}

/// A single entry in a step's option list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionEntry {
    /// Disabled "no selection" entry, never submittable
    Placeholder,
    Action(&'static Action),
}

impl OptionEntry {
    pub fn value(&self) -> Option<&'static str> {
        match self {
            OptionEntry::Placeholder => None,
            OptionEntry::Action(a) => Some(a.value),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OptionEntry::Placeholder => PLACEHOLDER_LABEL,
            OptionEntry::Action(a) => a.label,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, OptionEntry::Placeholder)
    }
}

/// Options offered for one step plus the resolved selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionList {
    entries: Vec<OptionEntry>,
    selected: Option<&'static str>,
}

impl OptionList {
    pub fn entries(&self) -> &[OptionEntry] {
        &self.entries
    }

    /// Selected action identifier, `None` when the placeholder is showing
    pub fn selected(&self) -> Option<&'static str> {
        self.selected
    }

    pub fn selected_action(&self) -> Option<&'static Action> {
        self.selected.and_then(catalog::find)
    }

    /// Identifiers of every selectable entry, in order
    pub fn values(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().filter_map(|e| e.value())
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values().any(|v| v == value)
    }

    fn resolve(&self, value: &str) -> Option<&'static str> {
        self.values().find(|v| *v == value)
    }
}

/// Build a step's option list from `candidates`, leaving out `excluded`.
///
/// `desired` stays selected when it survives the exclusion; otherwise the
/// list falls back to the placeholder.
pub fn rebuild_options(
    candidates: &'static [Action],
    excluded: &[&str],
    desired: Option<&str>,
) -> OptionList {
    let mut entries = Vec::with_capacity(candidates.len() + 1);
    entries.push(OptionEntry::Placeholder);
    entries.extend(
        candidates
            .iter()
            .filter(|a| !excluded.contains(&a.value))
            .map(OptionEntry::Action),
    );

    let mut list = OptionList {
        entries,
        selected: None,
    };
    list.selected = desired.and_then(|d| list.resolve(d));
    list
}

/// The three dependent step controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selections {
    slots: [OptionList; 3],
}

impl Default for Selections {
    fn default() -> Self {
        Self::new()
    }
}

impl Selections {
    /// All three steps unselected, step 1 offering the full catalog
    pub fn new() -> Self {
        let empty = rebuild_options(&ACTIONS, &[], None);
        let mut selections = Self {
            slots: [empty.clone(), empty.clone(), empty],
        };
        selections.refresh_dependent_options();
        selections
    }

    pub fn slot(&self, step: Step) -> &OptionList {
        &self.slots[step.index()]
    }

    pub fn value(&self, step: Step) -> Option<&'static str> {
        self.slots[step.index()].selected
    }

    pub fn values(&self) -> [Option<&'static str>; 3] {
        [
            self.value(Step::One),
            self.value(Step::Two),
            self.value(Step::Three),
        ]
    }

    /// All three chosen actions, or `None` if any step is unselected
    pub fn complete(&self) -> Option<[&'static Action; 3]> {
        Some([
            self.slot(Step::One).selected_action()?,
            self.slot(Step::Two).selected_action()?,
            self.slot(Step::Three).selected_action()?,
        ])
    }

    /// User picks `value` for `step`; later steps are rebuilt accordingly
    pub fn select(&mut self, step: Step, value: &str) -> Result<(), SelectionError> {
        let slot = &mut self.slots[step.index()];
        let resolved = slot.resolve(value).ok_or_else(|| SelectionError::NotOffered {
            step: step.number(),
            value: value.to_string(),
        })?;
        slot.selected = Some(resolved);
        self.cascade_from(step);
        Ok(())
    }

    /// Return `step` to the placeholder
    pub fn clear(&mut self, step: Step) {
        self.slots[step.index()].selected = None;
        self.cascade_from(step);
    }

    fn cascade_from(&mut self, step: Step) {
        match step {
            Step::One => self.refresh_dependent_options(),
            Step::Two => self.refresh_step_three(),
            Step::Three => {}
        }
    }

    /// Rebuild steps 2 and 3 from the current values
    pub fn refresh_dependent_options(&mut self) {
        let [v1, v2, v3] = self.values();
        let excluded: Vec<&str> = v1.into_iter().collect();
        self.slots[1] = rebuild_options(&ACTIONS, &excluded, v2);

        let v2 = self.value(Step::Two);
        let excluded: Vec<&str> = v1.into_iter().chain(v2).collect();
        self.slots[2] = rebuild_options(&ACTIONS, &excluded, v3);
    }

    /// Rebuild step 3 only; step 1 is unchanged
    pub fn refresh_step_three(&mut self) {
        let [v1, v2, v3] = self.values();
        let excluded: Vec<&str> = v1.into_iter().chain(v2).collect();
        self.slots[2] = rebuild_options(&ACTIONS, &excluded, v3);
    }

    /// Fill all three steps from a template's action triple.
    ///
    /// Returns `false` and changes nothing when fewer than three entries are
    /// given. A step whose template action is excluded by an earlier step is
    /// left unselected.
    pub fn apply_template<S: AsRef<str>>(&mut self, steps: &[S]) -> bool {
        let [s1, s2, s3] = match steps {
            [a, b, c, ..] => [a.as_ref(), b.as_ref(), c.as_ref()],
            _ => {
                debug!(len = steps.len(), "Template has fewer than 3 steps, ignoring");
                return false;
            }
        };

        self.slots[0].selected = self.slots[0].resolve(s1);
        self.slots[1] = rebuild_options(&ACTIONS, &[s1], Some(s2));
        self.slots[2] = rebuild_options(&ACTIONS, &[s1, s2], Some(s3));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exclusive(sel: &Selections) {
        let chosen: Vec<&str> = sel.values().into_iter().flatten().collect();
        for (i, v) in chosen.iter().enumerate() {
            assert!(
                !chosen[i + 1..].contains(v),
                "action '{}' selected twice: {:?}",
                v,
                sel.values()
            );
        }
    }

    #[test]
    fn test_rebuild_excludes_and_keeps_placeholder_first() {
        let list = rebuild_options(&ACTIONS, &["clean", "tone"], None);
        assert_eq!(list.entries()[0], OptionEntry::Placeholder);
        assert!(list.entries()[0].is_disabled());
        assert_eq!(list.entries().len(), ACTIONS.len() - 1);
        assert!(!list.contains("clean"));
        assert!(!list.contains("tone"));
        assert_eq!(list.selected(), None);
    }

    #[test]
    fn test_rebuild_preserves_eligible_value() {
        let list = rebuild_options(&ACTIONS, &["clean"], Some("summarize"));
        assert_eq!(list.selected(), Some("summarize"));
    }

    #[test]
    fn test_rebuild_resets_ineligible_value() {
        let list = rebuild_options(&ACTIONS, &["summarize"], Some("summarize"));
        assert_eq!(list.selected(), None);

        let unknown = rebuild_options(&ACTIONS, &[], Some("translate"));
        assert_eq!(unknown.selected(), None);
    }

    #[test]
    fn test_new_is_unselected() {
        let sel = Selections::new();
        assert_eq!(sel.values(), [None, None, None]);
        assert!(sel.complete().is_none());
        assert_eq!(sel.slot(Step::Three).values().count(), ACTIONS.len());
    }

    #[test]
    fn test_step_one_change_cascades() {
        let mut sel = Selections::new();
        sel.select(Step::Two, "summarize").unwrap();
        sel.select(Step::Three, "keypoints").unwrap();

        sel.select(Step::One, "summarize").unwrap();
        assert_eq!(sel.value(Step::Two), None);
        assert_eq!(sel.value(Step::Three), Some("keypoints"));
        assert!(!sel.slot(Step::Two).contains("summarize"));
        assert!(!sel.slot(Step::Three).contains("summarize"));
        assert_exclusive(&sel);
    }

    #[test]
    fn test_step_two_change_only_touches_step_three() {
        let mut sel = Selections::new();
        sel.select(Step::One, "clean").unwrap();
        sel.select(Step::Three, "tone").unwrap();
        sel.select(Step::Two, "tone").unwrap();

        assert_eq!(sel.value(Step::One), Some("clean"));
        assert_eq!(sel.value(Step::Three), None);
        assert!(sel.slot(Step::Two).contains("summarize"));
        assert_exclusive(&sel);
    }

    #[test]
    fn test_select_rejects_excluded_value() {
        let mut sel = Selections::new();
        sel.select(Step::One, "clean").unwrap();
        let err = sel.select(Step::Two, "clean").unwrap_err();
        assert_eq!(
            err,
            SelectionError::NotOffered {
                step: 2,
                value: "clean".to_string()
            }
        );
        assert_eq!(sel.value(Step::Two), None);
    }

    #[test]
    fn test_clear_step_one_frees_option() {
        let mut sel = Selections::new();
        sel.select(Step::One, "clean").unwrap();
        sel.select(Step::Two, "summarize").unwrap();
        sel.clear(Step::One);

        assert!(sel.slot(Step::Two).contains("clean"));
        assert_eq!(sel.value(Step::Two), Some("summarize"));
        assert!(!sel.slot(Step::Three).contains("summarize"));
    }

    #[test]
    fn test_apply_template_sets_all_three() {
        let mut sel = Selections::new();
        assert!(sel.apply_template(&["clean", "summarize", "keypoints"]));
        assert_eq!(
            sel.values(),
            [Some("clean"), Some("summarize"), Some("keypoints")]
        );
        let labels: Vec<&str> = sel.complete().unwrap().iter().map(|a| a.label).collect();
        assert_eq!(labels, ["Clean", "Summarize", "Keypoints"]);
    }

    #[test]
    fn test_apply_template_over_previous_selection() {
        let mut sel = Selections::new();
        sel.apply_template(&["clean", "summarize", "keypoints"]);
        sel.apply_template(&["simplify", "clean", "summarize"]);
        assert_eq!(
            sel.values(),
            [Some("simplify"), Some("clean"), Some("summarize")]
        );
        assert_exclusive(&sel);
    }

    #[test]
    fn test_apply_short_template_is_noop() {
        let mut sel = Selections::new();
        sel.select(Step::One, "tone").unwrap();
        let before = sel.clone();

        assert!(!sel.apply_template(&["clean", "summarize"]));
        assert!(!sel.apply_template::<&str>(&[]));
        assert_eq!(sel, before);
    }

    #[test]
    fn test_apply_template_with_repeated_action_leaves_later_step_unset() {
        let mut sel = Selections::new();
        sel.apply_template(&["clean", "clean", "tone"]);
        assert_eq!(sel.values(), [Some("clean"), None, Some("tone")]);
        assert_exclusive(&sel);
    }

    #[test]
    fn test_exclusive_after_mixed_sequence() {
        let mut sel = Selections::new();
        let script: &[(Step, &str)] = &[
            (Step::One, "clean"),
            (Step::Two, "summarize"),
            (Step::Three, "tone"),
            (Step::One, "tone"),
            (Step::Three, "clean"),
            (Step::Two, "clean"),
            (Step::One, "summarize"),
        ];

        for (step, value) in script {
            let _ = sel.select(*step, value);
            assert_exclusive(&sel);
        }
        sel.apply_template(&["tone", "classify", "analogy"]);
        assert_exclusive(&sel);
        let _ = sel.select(Step::One, "classify");
        assert_exclusive(&sel);
    }

    #[test]
    fn test_step_numbers() {
        assert_eq!(Step::from_number(2), Some(Step::Two));
        assert_eq!(Step::from_number(0), None);
        assert_eq!(Step::from_number(4), None);
        assert_eq!(Step::Three.number(), 3);
    }
}
