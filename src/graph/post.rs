//! Post-run hook sets
//!
//! Hooks execute after the stage tree reaches a terminal state: `always`
//! runs unconditionally and first, then exactly one of `on_success` or
//! `on_failure` depending on the final run status.

#![allow(clippy::must_use_candidate)]

use super::node::StepSpec;
use super::types::RunStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal hook sets keyed by overall run status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PostActions {
    /// Hooks that run regardless of the outcome, before the keyed set
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub always: Vec<StepSpec>,

    /// Hooks that run only when the run succeeded
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub on_success: Vec<StepSpec>,

    /// Hooks that run when the run failed or was aborted
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub on_failure: Vec<StepSpec>,
}

impl PostActions {
    /// Creates an empty hook configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an always hook
    #[must_use]
    pub fn always(mut self, step: StepSpec) -> Self {
        self.always.push(step);
        self
    }

    /// Adds a success hook
    #[must_use]
    pub fn on_success(mut self, step: StepSpec) -> Self {
        self.on_success.push(step);
        self
    }

    /// Adds a failure hook
    #[must_use]
    pub fn on_failure(mut self, step: StepSpec) -> Self {
        self.on_failure.push(step);
        self
    }

    /// Returns true if no hooks are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.always.is_empty() && self.on_success.is_empty() && self.on_failure.is_empty()
    }

    /// Hook sets to execute for `status`, in dispatch order.
    ///
    /// `always` first, then exactly one of the keyed sets: `on_success`
    /// for a succeeded run, `on_failure` for failed and aborted runs.
    #[must_use]
    pub fn selected(&self, status: RunStatus) -> Vec<(&'static str, &[StepSpec])> {
        let keyed: (&'static str, &[StepSpec]) = match status {
            RunStatus::Succeeded => ("on_success", &self.on_success),
            RunStatus::Failed | RunStatus::Aborted => ("on_failure", &self.on_failure),
        };
        vec![("always", self.always.as_slice()), keyed]
    }
}

impl fmt::Display for PostActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "post(always: {}, on_success: {}, on_failure: {})",
            self.always.len(),
            self.on_success.len(),
            self.on_failure.len()
        )
    }
}
