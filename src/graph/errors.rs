//! Error types for the orchestration engine

use thiserror::Error;

/// Errors raised while executing a run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Graph definition failed validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A collaborator process could not be started at all.
    ///
    /// Always fatal to the enclosing leaf, unlike an ordinary nonzero exit.
    #[error("Could not launch '{command}': {reason}")]
    Launch {
        /// The command that failed to spawn.
        command: String,
        /// Underlying OS error.
        reason: String,
    },

    /// Lookup of an absent environment context key without a default
    #[error("Missing environment key '{key}'")]
    MissingKey {
        /// The absent key.
        key: String,
    },

    /// Write to an immutable, already populated environment key
    #[error("Environment key '{key}' is read-only")]
    ReadOnlyKey {
        /// The key that was written twice.
        key: String,
    },

    /// Source checkout failed
    #[error("Checkout failed: {0}")]
    Checkout(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Validation errors for graph definitions.
///
/// These are configuration errors in the stage-graph definition and are
/// fatal at graph-validation time, before any step runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name cannot be empty
    #[error("Node name cannot be empty")]
    EmptyName,

    /// Node names form dotted report paths, so dots are reserved
    #[error("Node name '{name}' contains invalid characters")]
    InvalidNameChars {
        /// The invalid name.
        name: String,
    },

    /// Two siblings share a name, making their report paths ambiguous
    #[error("Duplicate sibling name '{name}' under '{parent}'")]
    DuplicateName {
        /// The duplicated name.
        name: String,
        /// Path of the parent node.
        parent: String,
    },

    /// A leaf must have at least one step
    #[error("Leaf '{node}' must have at least one step")]
    EmptyLeaf {
        /// Name of the empty leaf.
        node: String,
    },

    /// A group must have at least one child
    #[error("Group '{node}' must have at least one child")]
    EmptyGroup {
        /// Name of the empty group.
        node: String,
    },

    /// Steps on a group node, or children on a leaf
    #[error("Node '{node}' mixes steps and children")]
    MixedNode {
        /// Name of the malformed node.
        node: String,
    },

    /// A step command failed shell tokenization
    #[error("Unparseable command in '{node}': {command}")]
    BadCommand {
        /// Node holding the step.
        node: String,
        /// The offending command string.
        command: String,
    },

    /// Invalid timeout or gate deadline
    #[error("Invalid duration in '{node}': must be positive")]
    InvalidDuration {
        /// Node with the zero duration.
        node: String,
    },

    /// A checkout step targets a slot the context has not declared writable
    #[error("Checkout in '{node}' targets undeclared slot '{slot}'")]
    UndeclaredSlot {
        /// Node holding the checkout step.
        node: String,
        /// The undeclared slot name.
        slot: String,
    },
}
