//! Core status types for the stage graph
//!
//! This module contains the fundamental types that represent
//! the outcome of nodes and whole runs.

#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a single stage node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Node has not started yet
    Pending,
    /// Node is currently executing
    Running,
    /// Node completed successfully
    Succeeded,
    /// Node completed with a failure
    Failed,
    /// Node was aborted while running
    Aborted,
    /// Node never started because an ancestor failed or the run was aborted
    Skipped,
}

impl NodeStatus {
    /// Returns true if the node reached a terminal state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true if the node succeeded
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the node failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns true if the node was aborted
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns true if the node was skipped
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Combines two terminal statuses, keeping the worse one.
    ///
    /// Severity order: failed > aborted > succeeded. Skipped children do
    /// not influence a group's status.
    #[must_use]
    pub fn worse(self, other: Self) -> Self {
        use NodeStatus::{Aborted, Failed, Skipped};
        match (self, other) {
            (Failed, _) | (_, Failed) => Failed,
            (Aborted, _) | (_, Aborted) => Aborted,
            (Skipped, status) | (status, Skipped) => status,
            (status, _) => status,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Aborted => write!(f, "ABORTED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Terminal status of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every executed node succeeded
    Succeeded,
    /// At least one node along the executed path failed
    Failed,
    /// The run was aborted (quality gate escalation or external cancel)
    Aborted,
}

impl RunStatus {
    /// Returns true if the run succeeded
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Derives the run status from the root node's terminal status
    #[must_use]
    pub fn from_node(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Failed => Self::Failed,
            NodeStatus::Aborted | NodeStatus::Skipped => Self::Aborted,
            _ => Self::Succeeded,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}
