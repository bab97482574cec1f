//! Stage-graph definition and builder
//!
//! A definition is pure configuration: the declarative node topology,
//! static environment, declared write-once slots, and post-run hooks.
//! The engine interprets it; nothing here executes anything.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::context::EnvContext;
use super::errors::ValidationError;
use super::node::{StageNode, StepKind};
use super::post::PostActions;
use super::types::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A complete, declarative description of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Definition name, used for logging only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Root of the stage node tree
    pub root: StageNode,

    /// Static environment entries, immutable once the run starts
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub environment: Vec<(String, String)>,

    /// Context keys a designated step may populate exactly once
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub slots: Vec<String>,

    /// Terminal hook sets keyed by run status
    #[serde(default, skip_serializing_if = "PostActions::is_empty")]
    pub post: PostActions,
}

impl GraphDefinition {
    /// Creates a definition builder
    pub fn builder(root: StageNode) -> GraphDefinitionBuilder {
        GraphDefinitionBuilder::new(root)
    }

    /// Parses a definition from YAML
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error for malformed input.
    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }

    /// Parses a definition from JSON
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error for malformed input.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Loads a definition from a file, format chosen by extension.
    ///
    /// `.json` parses as JSON; everything else parses as YAML.
    ///
    /// # Errors
    ///
    /// Returns an IO or parse error message.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&raw).map_err(|e| e.to_string()),
            _ => Self::from_yaml(&raw).map_err(|e| e.to_string()),
        }
    }

    /// Builds the run's environment context from the static configuration
    #[must_use]
    pub fn context(&self) -> EnvContext {
        EnvContext::new(self.environment.iter().cloned(), self.slots.iter().cloned())
    }

    /// Largest declared parallel fan-out, the default worker-pool size
    #[must_use]
    pub fn max_fan_out(&self) -> usize {
        self.root.max_fan_out().max(1)
    }

    /// Display name for logging
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

impl Validate for GraphDefinition {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        self.root.validate()?;

        // Checkout steps must target declared slots; catching this before
        // the run starts turns a mid-run ReadOnlyKey surprise into a
        // definition error.
        let mut result = Ok(());
        self.root.walk("", &mut |node, _path| {
            for step in &node.steps {
                if let StepKind::Checkout { slot } = &step.kind {
                    if result.is_ok() && !self.slots.contains(slot) {
                        result = Err(ValidationError::UndeclaredSlot {
                            node: node.name.clone(),
                            slot: slot.clone(),
                        });
                    }
                }
            }
        });
        result
    }
}

impl fmt::Display for GraphDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphDefinition({})", self.display_name())
    }
}

/// Builder for graph definitions
#[derive(Debug, Clone)]
pub struct GraphDefinitionBuilder {
    definition: GraphDefinition,
}

impl GraphDefinitionBuilder {
    /// Creates a builder around a root node
    pub fn new(root: StageNode) -> Self {
        Self {
            definition: GraphDefinition {
                name: None,
                root,
                environment: Vec::new(),
                slots: Vec::new(),
                post: PostActions::default(),
            },
        }
    }

    /// Sets the definition name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = Some(name.into());
        self
    }

    /// Adds a static environment entry
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.definition.environment.push((key.into(), value.into()));
        self
    }

    /// Declares a write-once context slot
    pub fn slot(mut self, key: impl Into<String>) -> Self {
        self.definition.slots.push(key.into());
        self
    }

    /// Sets the post-run hooks
    pub fn post(mut self, post: PostActions) -> Self {
        self.definition.post = post;
        self
    }

    /// Builds the definition, validating it
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<GraphDefinition, ValidationError> {
        self.definition.validate()?;
        Ok(self.definition)
    }

    /// Builds the definition without validation (for internal use)
    #[must_use]
    pub fn build_unchecked(self) -> GraphDefinition {
        self.definition
    }
}
