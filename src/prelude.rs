//! Prelude module for common imports

// Re-export graph types with full paths
pub use crate::graph::context::EnvContext;
pub use crate::graph::definition::{GraphDefinition, GraphDefinitionBuilder};
pub use crate::graph::errors::{EngineError, ValidationError};
pub use crate::graph::node::{NodeKind, StageNode, StepKind, StepSpec};
pub use crate::graph::post::PostActions;
pub use crate::graph::types::{NodeStatus, RunStatus, Validate};

// Re-export executor types
pub use crate::executor::{
    AbortSignal, Collaborators, CommandSource, GateChannel, GateHandle, GateVerdict, ManualGate,
    SilentGate, SourceControl, StepExecutor, StepOutcome, StepRecord,
};

// Re-export runner and report types
pub use crate::infrastructure::EngineConfig;
pub use crate::report::{ArtifactRef, PostStepRecord, ReportNode, RunReport};
pub use crate::runner::{GatePolicy, QualityGateWaiter, StageGraphRunner};
