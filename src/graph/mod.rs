//! Stage-graph domain types
//!
//! The declarative side of the engine: node topology, step specs,
//! environment context, post-run hooks, and the error taxonomy.

pub mod context;
pub mod definition;
pub mod errors;
pub mod node;
pub mod post;
pub mod types;

pub use context::EnvContext;
pub use definition::{GraphDefinition, GraphDefinitionBuilder};
pub use errors::{EngineError, ValidationError};
pub use node::{NodeKind, StageNode, StepKind, StepSpec};
pub use post::PostActions;
pub use types::{NodeStatus, RunStatus, Validate};
