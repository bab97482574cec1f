//! `gantry run` - Execute a stage graph definition
//!
//! Loads a definition, runs it to completion with command-backed
//! collaborators, and emits the sealed run report as JSON.

use anyhow::{Context, Result};
use gantry::{
    Collaborators, CommandSource, EngineConfig, GraphDefinition, RunStatus, SilentGate,
    SourceControl, StageGraphRunner,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for one CLI-driven run
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Worker-pool override
    pub max_parallel: Option<usize>,
    /// Default per-step timeout override, in seconds
    pub step_timeout: Option<u64>,
    /// Command resolving the revision id for checkout steps
    pub checkout_command: Option<String>,
    /// Report destination; stdout when unset
    pub output: Option<PathBuf>,
}

/// Run a definition file to completion and emit the report.
///
/// Gates resolve by deadline expiry on the CLI; delivering external
/// verdicts needs the library API and a gate handle.
///
/// # Errors
///
/// Returns an error when the definition cannot be loaded or is rejected,
/// or when the report cannot be written. Step failures are reported
/// through the returned status, not as errors.
pub fn run_definition(file: &Path, options: &RunOptions) -> Result<RunStatus> {
    let definition = GraphDefinition::from_path(file)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to load definition: {}", file.display()))?;

    let mut config = EngineConfig::default();
    if let Some(max_parallel) = options.max_parallel {
        config.max_parallel = Some(max_parallel);
    }
    if let Some(step_timeout) = options.step_timeout {
        config.default_step_timeout_secs = step_timeout;
    }

    let source: Arc<dyn SourceControl> = match &options.checkout_command {
        Some(command) => Arc::new(CommandSource::new(command.clone())),
        None => Arc::new(CommandSource::default()),
    };
    let runner = StageGraphRunner::new(config, Collaborators::new(source, Arc::new(SilentGate)));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let report = runtime.block_on(runner.run(&definition))?;

    let json = serde_json::to_string_pretty(&report.to_json())
        .context("Failed to render run report")?;
    match &options.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Failed to write report to: {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(report.status())
}
