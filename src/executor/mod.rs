//! Step execution layer
//!
//! The step executor runs opaque external commands; collaborator traits
//! cover the two calls that are not plain commands (source checkout and
//! the quality-gate verdict channel).

mod abort;
mod collaborators;
mod step;

pub use abort::AbortSignal;
pub use collaborators::{
    Collaborators, CommandSource, GateChannel, GateHandle, GateVerdict, ManualGate, SilentGate,
    SourceControl,
};
pub use step::{StepExecutor, StepOutcome, StepRecord, TRUNCATION_MARKER};
