//! Stage node and step types for graph definitions
//!
//! A stage node is the unit of orchestration: a leaf wrapping ordered
//! steps, a sequential or parallel group of children, or a quality gate.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::errors::ValidationError;
use super::types::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of a stage node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// One or more steps run strictly in sequence
    Leaf,
    /// Ordered children, each terminal before the next starts
    SequentialGroup,
    /// Children started concurrently, node completes when all are terminal
    ParallelGroup,
    /// Special leaf that suspends the run awaiting an external verdict
    Gate,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf => write!(f, "leaf"),
            Self::SequentialGroup => write!(f, "sequential-group"),
            Self::ParallelGroup => write!(f, "parallel-group"),
            Self::Gate => write!(f, "gate"),
        }
    }
}

/// What a single step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepKind {
    /// Opaque external command run through the shell
    Command {
        /// Command line, `${VAR}` references expanded against the context
        command: String,
    },

    /// Source checkout; writes the resolved revision id into a context slot
    Checkout {
        /// Write-once context slot receiving the revision id
        #[serde(default = "default_revision_slot")]
        slot: String,
    },
}

fn default_revision_slot() -> String {
    "GIT_COMMIT".to_string()
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { command } => write!(f, "sh({command})"),
            Self::Checkout { slot } => write!(f, "checkout({slot})"),
        }
    }
}

/// The atomic unit of work bound to one leaf node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// What the step does
    #[serde(flatten)]
    pub kind: StepKind,

    /// Optional name; defaults to the step's position within the leaf
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Scoped overlay injected for the duration of this step only,
    /// e.g. credential material
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<(String, String)>,

    /// Nonzero exit codes additionally treated as success.
    ///
    /// Used for collaborators with severity-threshold exit policies,
    /// such as vulnerability scanners.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ok_exit_codes: Vec<i32>,

    /// Artifact path recorded into the run report regardless of outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl StepSpec {
    /// Creates a command step
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Command {
                command: command.into(),
            },
            name: None,
            env: Vec::new(),
            ok_exit_codes: Vec::new(),
            artifact: None,
        }
    }

    /// Creates a checkout step targeting the default revision slot
    pub fn checkout() -> Self {
        Self::checkout_into(default_revision_slot())
    }

    /// Creates a checkout step targeting a specific slot
    pub fn checkout_into(slot: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Checkout { slot: slot.into() },
            name: None,
            env: Vec::new(),
            ok_exit_codes: Vec::new(),
            artifact: None,
        }
    }

    /// Sets the step name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a scoped overlay entry for this step
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Treats the given nonzero exit codes as success
    pub fn with_ok_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.ok_exit_codes = codes;
        self
    }

    /// Records an artifact path after the step, regardless of outcome
    pub fn with_artifact(mut self, path: impl Into<String>) -> Self {
        self.artifact = Some(path.into());
        self
    }

    /// Display name used in the report and in error messages
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("step-{index}"),
        }
    }
}

impl fmt::Display for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Step({}): {}", name, self.kind),
            None => write!(f, "Step: {}", self.kind),
        }
    }
}

/// A named node of the stage graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNode {
    /// Human-readable node name; dots are reserved for report paths
    pub name: String,

    /// Kind of this node
    pub kind: NodeKind,

    /// Steps of a leaf, in declared order
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub steps: Vec<StepSpec>,

    /// Children of a group, in declared order
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<StageNode>,

    /// Per-step timeout for a leaf, or the gate deadline, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl StageNode {
    /// Creates a leaf node
    pub fn leaf(name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Leaf,
            steps,
            children: Vec::new(),
            timeout_secs: None,
        }
    }

    /// Creates a sequential group
    pub fn sequential(name: impl Into<String>, children: Vec<StageNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::SequentialGroup,
            steps: Vec::new(),
            children,
            timeout_secs: None,
        }
    }

    /// Creates a parallel group
    pub fn parallel(name: impl Into<String>, children: Vec<StageNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::ParallelGroup,
            steps: Vec::new(),
            children,
            timeout_secs: None,
        }
    }

    /// Creates a quality gate node with the given deadline
    pub fn gate(name: impl Into<String>, deadline: Duration) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Gate,
            steps: Vec::new(),
            children: Vec::new(),
            timeout_secs: Some(deadline.as_secs().max(1)),
        }
    }

    /// Sets the per-step timeout (leaf) or deadline (gate)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Returns the configured timeout, if any
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Largest declared parallel fan-out anywhere in this subtree
    #[must_use]
    pub fn max_fan_out(&self) -> usize {
        let own = match self.kind {
            NodeKind::ParallelGroup => self.children.len(),
            _ => 0,
        };
        self.children
            .iter()
            .map(StageNode::max_fan_out)
            .fold(own, usize::max)
    }

    /// Visits every node of the subtree with its dotted path
    pub fn walk<'a>(&'a self, prefix: &str, visit: &mut impl FnMut(&'a StageNode, &str)) {
        let path = if prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{prefix}.{}", self.name)
        };
        visit(self, &path);
        for child in &self.children {
            child.walk(&path, visit);
        }
    }
}

impl Validate for StageNode {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.name.contains('.') || self.name.len() > 100 {
            return Err(ValidationError::InvalidNameChars {
                name: self.name.clone(),
            });
        }

        match self.kind {
            NodeKind::Leaf => {
                if self.steps.is_empty() {
                    return Err(ValidationError::EmptyLeaf {
                        node: self.name.clone(),
                    });
                }
                if !self.children.is_empty() {
                    return Err(ValidationError::MixedNode {
                        node: self.name.clone(),
                    });
                }
            }
            NodeKind::SequentialGroup | NodeKind::ParallelGroup => {
                if self.children.is_empty() {
                    return Err(ValidationError::EmptyGroup {
                        node: self.name.clone(),
                    });
                }
                if !self.steps.is_empty() {
                    return Err(ValidationError::MixedNode {
                        node: self.name.clone(),
                    });
                }
            }
            NodeKind::Gate => {
                if !self.steps.is_empty() || !self.children.is_empty() {
                    return Err(ValidationError::MixedNode {
                        node: self.name.clone(),
                    });
                }
                if self.timeout_secs.unwrap_or(0) == 0 {
                    return Err(ValidationError::InvalidDuration {
                        node: self.name.clone(),
                    });
                }
            }
        }

        if matches!(self.timeout_secs, Some(0)) {
            return Err(ValidationError::InvalidDuration {
                node: self.name.clone(),
            });
        }

        // Commands must at least tokenize; catches unbalanced quoting
        // before any step runs.
        for step in &self.steps {
            if let StepKind::Command { command } = &step.kind {
                if shell_words::split(command).is_err() {
                    return Err(ValidationError::BadCommand {
                        node: self.name.clone(),
                        command: command.clone(),
                    });
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for child in &self.children {
            if !seen.insert(child.name.as_str()) {
                return Err(ValidationError::DuplicateName {
                    name: child.name.clone(),
                    parent: self.name.clone(),
                });
            }
            child.validate()?;
        }

        Ok(())
    }
}

impl fmt::Display for StageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::Leaf => write!(f, "{}({}): {} steps", self.kind, self.name, self.steps.len()),
            NodeKind::Gate => write!(f, "{}({})", self.kind, self.name),
            _ => write!(
                f,
                "{}({}): {} children",
                self.kind,
                self.name,
                self.children.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_creation() {
        let node = StageNode::leaf("build", vec![StepSpec::command("make all")]);
        assert_eq!(node.kind, NodeKind::Leaf);
        assert_eq!(node.steps.len(), 1);
        assert!(node.validate().is_ok());
    }

    #[test]
    fn test_leaf_requires_steps() {
        let node = StageNode::leaf("build", vec![]);
        assert!(matches!(
            node.validate(),
            Err(ValidationError::EmptyLeaf { .. })
        ));
    }

    #[test]
    fn test_group_requires_children() {
        let node = StageNode::parallel("checks", vec![]);
        assert!(matches!(
            node.validate(),
            Err(ValidationError::EmptyGroup { .. })
        ));
    }

    #[test]
    fn test_name_rejects_dots() {
        let node = StageNode::leaf("a.b", vec![StepSpec::command("true")]);
        assert!(matches!(
            node.validate(),
            Err(ValidationError::InvalidNameChars { .. })
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let node = StageNode::leaf("", vec![StepSpec::command("true")]);
        assert!(matches!(node.validate(), Err(ValidationError::EmptyName)));
    }

    #[test]
    fn test_duplicate_sibling_names_rejected() {
        let node = StageNode::sequential(
            "root",
            vec![
                StageNode::leaf("build", vec![StepSpec::command("true")]),
                StageNode::leaf("build", vec![StepSpec::command("true")]),
            ],
        );
        assert!(matches!(
            node.validate(),
            Err(ValidationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_unbalanced_quotes_rejected() {
        let node = StageNode::leaf("build", vec![StepSpec::command("echo 'oops")]);
        assert!(matches!(
            node.validate(),
            Err(ValidationError::BadCommand { .. })
        ));
    }

    #[test]
    fn test_gate_requires_deadline() {
        let mut node = StageNode::gate("quality gate", Duration::from_secs(60));
        assert!(node.validate().is_ok());

        node.timeout_secs = None;
        assert!(matches!(
            node.validate(),
            Err(ValidationError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let node =
            StageNode::leaf("build", vec![StepSpec::command("true")]).with_timeout(Duration::ZERO);
        assert!(matches!(
            node.validate(),
            Err(ValidationError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_max_fan_out() {
        let tree = StageNode::sequential(
            "root",
            vec![
                StageNode::leaf("a", vec![StepSpec::command("true")]),
                StageNode::parallel(
                    "par",
                    vec![
                        StageNode::leaf("b", vec![StepSpec::command("true")]),
                        StageNode::leaf("c", vec![StepSpec::command("true")]),
                        StageNode::leaf("d", vec![StepSpec::command("true")]),
                    ],
                ),
            ],
        );
        assert_eq!(tree.max_fan_out(), 3);
    }

    #[test]
    fn test_walk_produces_dotted_paths() {
        let tree = StageNode::sequential(
            "root",
            vec![StageNode::sequential(
                "mid",
                vec![StageNode::leaf("leaf", vec![StepSpec::command("true")])],
            )],
        );
        let mut paths = Vec::new();
        tree.walk("", &mut |_, path| paths.push(path.to_string()));
        assert_eq!(paths, vec!["root", "root.mid", "root.mid.leaf"]);
    }

    #[test]
    fn test_step_label() {
        assert_eq!(StepSpec::command("true").label(2), "step-2");
        assert_eq!(
            StepSpec::command("true").with_name("lint").label(2),
            "lint"
        );
    }

    #[test]
    fn test_serde_round_trip_yaml() {
        let yaml = r#"
name: root
kind: sequential-group
children:
  - name: checkout
    kind: leaf
    steps:
      - type: checkout
  - name: build
    kind: leaf
    timeout_secs: 600
    steps:
      - type: command
        command: make all
  - name: quality gate
    kind: gate
    timeout_secs: 300
"#;
        let node: StageNode = serde_yaml::from_str(yaml).unwrap();
        assert!(node.validate().is_ok());
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.children[2].kind, NodeKind::Gate);
        assert!(matches!(
            node.children[0].steps[0].kind,
            StepKind::Checkout { ref slot } if slot == "GIT_COMMIT"
        ));
    }

    #[test]
    fn test_display() {
        let node = StageNode::leaf("build", vec![StepSpec::command("true")]);
        assert_eq!(node.to_string(), "leaf(build): 1 steps");
    }
}
