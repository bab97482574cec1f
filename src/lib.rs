//! # Gantry - A pipeline orchestration engine
//!
//! Gantry executes declarative stage graphs: trees of named nodes where
//! groups run their children sequentially or in parallel and leaves run
//! ordered shell steps. Runs carry a shared environment context with
//! write-once slots and scoped overlays, can suspend on quality gates
//! awaiting external verdicts, and produce a sealed report of every
//! node, step, and artifact.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gantry::{Collaborators, EngineConfig, GraphDefinition, StageGraphRunner, StageNode, StepSpec};
//!
//! # async fn demo() -> Result<(), gantry::EngineError> {
//! let definition = GraphDefinition::builder(StageNode::sequential(
//!     "pipeline",
//!     vec![
//!         StageNode::leaf("build", vec![StepSpec::command("make all")]),
//!         StageNode::leaf("test", vec![StepSpec::command("make test")]),
//!     ],
//! ))
//! .name("ci")
//! .build()?;
//!
//! let runner = StageGraphRunner::new(EngineConfig::default(), Collaborators::default());
//! let report = runner.run(&definition).await?;
//! println!("{}", report.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Declarative definitions**: YAML/JSON stage trees validated before anything runs
//! - **Parallel regions**: bounded worker pool, failing children never cancel siblings
//! - **Quality gates**: suspend a run awaiting an external verdict, with timeout escalation
//! - **Bounded capture**: per-stream output limits that never block the child process
//! - **Sealed reports**: immutable post-run record of statuses, steps, and artifacts
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <https://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or <https://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod executor;
pub mod graph;
pub mod infrastructure;
pub mod report;
pub mod runner;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use executor::{
    AbortSignal, Collaborators, CommandSource, GateChannel, GateHandle, GateVerdict, ManualGate,
    SilentGate, SourceControl, StepExecutor, StepOutcome, StepRecord, TRUNCATION_MARKER,
};
pub use graph::{
    EngineError, EnvContext, GraphDefinition, GraphDefinitionBuilder, NodeKind, NodeStatus,
    PostActions, RunStatus, StageNode, StepKind, StepSpec, Validate, ValidationError,
};
pub use infrastructure::{init_logging, EngineConfig};
pub use report::{ArtifactRef, PostStepRecord, ReportNode, RunReport};
pub use runner::{GatePolicy, GateRequest, PostRunDispatcher, QualityGateWaiter, StageGraphRunner};

/// Version of the gantry crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
