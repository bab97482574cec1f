//! Stage graph runner
//!
//! Walks a validated definition depth first and drives every node to a
//! terminal status. Sequential groups stop launching children after a
//! failure and skip the rest; parallel groups always let started children
//! reach a terminal state. A run-wide abort signal kills running steps
//! and skips everything not yet started. The final status is fixed before
//! post-run hooks execute and the report is sealed after them.

mod dispatch;
mod gate;

pub use dispatch::PostRunDispatcher;
pub use gate::{GatePolicy, GateRequest, QualityGateWaiter};

use crate::executor::{AbortSignal, Collaborators, StepExecutor, StepOutcome, StepRecord};
use crate::graph::context::EnvContext;
use crate::graph::definition::GraphDefinition;
use crate::graph::errors::EngineError;
use crate::graph::node::{NodeKind, StageNode, StepKind, StepSpec};
use crate::graph::types::{NodeStatus, RunStatus, Validate};
use crate::infrastructure::EngineConfig;
use crate::report::{ArtifactRef, RunReport};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) fn artifact_ref(path: String, produced_by: &str) -> ArtifactRef {
    let name = path.rsplit('/').next().unwrap_or(path.as_str()).to_string();
    ArtifactRef {
        name,
        path,
        produced_by: produced_by.to_string(),
    }
}

/// Drives one run of a stage graph definition.
///
/// A runner instance is meant for a single run: its abort signal is
/// sticky, so a runner whose run was aborted skips everything on reuse.
#[derive(Debug, Clone)]
pub struct StageGraphRunner {
    config: EngineConfig,
    executor: StepExecutor,
    collaborators: Collaborators,
    abort: AbortSignal,
}

impl StageGraphRunner {
    /// Creates a runner from configuration and collaborators
    #[must_use]
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let executor = StepExecutor::new(config.shell.clone(), config.output_limit_bytes);
        Self {
            config,
            executor,
            collaborators,
            abort: AbortSignal::new(),
        }
    }

    /// Handle for cancelling the run from outside
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Runs the definition to completion and returns the sealed report.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when the definition is
    /// rejected; execution problems (failed steps, timeouts, aborts) are
    /// reported through the run status, not as errors.
    pub async fn run(&self, definition: &GraphDefinition) -> Result<Arc<RunReport>, EngineError> {
        definition.validate()?;

        let context = definition.context();
        let pool = self
            .config
            .max_parallel
            .unwrap_or_else(|| definition.max_fan_out())
            .max(1);
        let permits = Arc::new(Semaphore::new(pool));
        let report = Arc::new(RunReport::new(definition));

        tracing::info!(
            run_id = %report.run_id(),
            name = definition.display_name(),
            pool,
            "Run started"
        );

        let root_path = definition.root.name.clone();
        let root_status = self
            .exec_node(&definition.root, root_path, &context, &report, &permits)
            .await;

        let status = if root_status.is_failed() {
            RunStatus::Failed
        } else if self.abort.is_triggered() || !root_status.is_succeeded() {
            RunStatus::Aborted
        } else {
            RunStatus::Succeeded
        };
        report.finalize(status);

        PostRunDispatcher::new(&self.executor, self.config.default_step_timeout())
            .dispatch(&definition.post, status, &context, &report)
            .await;
        report.seal();

        tracing::info!(
            run_id = %report.run_id(),
            %status,
            duration_ms = report.duration().as_millis() as u64,
            "Run finished"
        );
        Ok(report)
    }

    fn exec_node<'a>(
        &'a self,
        node: &'a StageNode,
        path: String,
        context: &'a EnvContext,
        report: &'a Arc<RunReport>,
        permits: &'a Arc<Semaphore>,
    ) -> BoxFuture<'a, NodeStatus> {
        Box::pin(async move {
            if self.abort.is_triggered() {
                self.skip_subtree(node, &path, report);
                return NodeStatus::Skipped;
            }
            report.transition(&path, NodeStatus::Running);

            let status = match node.kind {
                NodeKind::Leaf => self.exec_leaf(node, &path, context, report, permits).await,
                NodeKind::Gate => self.exec_gate(node, &path, report).await,
                NodeKind::SequentialGroup => {
                    self.exec_sequential(node, &path, context, report, permits)
                        .await
                }
                NodeKind::ParallelGroup => {
                    self.exec_parallel(node, &path, context, report, permits)
                        .await
                }
            };

            report.transition(&path, status);
            status
        })
    }

    /// Marks a never-started subtree skipped in the report
    fn skip_subtree(&self, node: &StageNode, path: &str, report: &RunReport) {
        let prefix = path
            .strip_suffix(node.name.as_str())
            .map(|p| p.trim_end_matches('.'))
            .unwrap_or("");
        node.walk(prefix, &mut |_, node_path| {
            report.transition(node_path, NodeStatus::Skipped);
        });
    }

    async fn exec_leaf(
        &self,
        node: &StageNode,
        path: &str,
        context: &EnvContext,
        report: &RunReport,
        permits: &Arc<Semaphore>,
    ) -> NodeStatus {
        // Only leaves hold a pool permit; groups never do, so nested
        // parallel regions cannot deadlock the pool.
        let _permit = match permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return NodeStatus::Aborted,
        };

        let timeout = node
            .timeout()
            .unwrap_or_else(|| self.config.default_step_timeout());

        for (index, step) in node.steps.iter().enumerate() {
            if self.abort.is_triggered() {
                return NodeStatus::Aborted;
            }

            let label = step.label(index);
            let status = match &step.kind {
                StepKind::Command { command } => {
                    self.run_command_step(&label, command, step, path, context, timeout, report)
                        .await
                }
                StepKind::Checkout { slot } => {
                    self.run_checkout_step(&label, slot, path, context, report)
                        .await
                }
            };

            // Artifacts are recorded even for failed steps; a partial
            // test report is still worth keeping.
            if let Some(artifact) = &step.artifact {
                report.archive(artifact_ref(context.expand(artifact), path));
            }

            if !status.is_succeeded() {
                return status;
            }
        }
        NodeStatus::Succeeded
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_command_step(
        &self,
        label: &str,
        command: &str,
        step: &StepSpec,
        path: &str,
        context: &EnvContext,
        timeout: Duration,
        report: &RunReport,
    ) -> NodeStatus {
        let scoped = if step.env.is_empty() {
            context.clone()
        } else {
            context.overlaid(step.env.iter().cloned())
        };

        match self
            .executor
            .run(label, command, &step.ok_exit_codes, &scoped, timeout, &self.abort)
            .await
        {
            Ok(record) => {
                let outcome = record.outcome;
                report.record_step(path, record);
                match outcome {
                    StepOutcome::Succeeded => NodeStatus::Succeeded,
                    StepOutcome::Failed | StepOutcome::TimedOut => NodeStatus::Failed,
                    StepOutcome::Aborted => NodeStatus::Aborted,
                }
            }
            Err(err) => {
                tracing::error!(node = path, step = label, %err, "Step could not start");
                report.record_step(
                    path,
                    StepRecord {
                        name: label.to_string(),
                        command: command.to_string(),
                        outcome: StepOutcome::Failed,
                        exit_code: None,
                        stdout: String::new(),
                        stderr: err.to_string(),
                        started_at: SystemTime::now(),
                        duration: Duration::ZERO,
                    },
                );
                NodeStatus::Failed
            }
        }
    }

    async fn run_checkout_step(
        &self,
        label: &str,
        slot: &str,
        path: &str,
        context: &EnvContext,
        report: &RunReport,
    ) -> NodeStatus {
        let started_at = SystemTime::now();
        let start = Instant::now();

        let (outcome, stdout, stderr) = match self.collaborators.source.checkout().await {
            Ok(revision) => match context.set(slot, revision.clone()) {
                Ok(()) => {
                    tracing::info!(node = path, slot, revision = %revision, "Checkout resolved revision");
                    (StepOutcome::Succeeded, revision, String::new())
                }
                Err(err) => {
                    tracing::error!(node = path, slot, %err, "Revision slot rejected write");
                    (StepOutcome::Failed, revision, err.to_string())
                }
            },
            Err(err) => {
                tracing::error!(node = path, %err, "Checkout failed");
                (StepOutcome::Failed, String::new(), err.to_string())
            }
        };

        let status = if outcome.is_succeeded() {
            NodeStatus::Succeeded
        } else {
            NodeStatus::Failed
        };
        report.record_step(
            path,
            StepRecord {
                name: label.to_string(),
                command: format!("checkout -> {slot}"),
                outcome,
                exit_code: None,
                stdout,
                stderr,
                started_at,
                duration: start.elapsed(),
            },
        );
        status
    }

    async fn exec_gate(&self, node: &StageNode, path: &str, report: &RunReport) -> NodeStatus {
        let deadline = node
            .timeout()
            .unwrap_or_else(|| self.config.default_step_timeout());
        let waiter = QualityGateWaiter::new(
            Arc::clone(&self.collaborators.gate),
            GatePolicy {
                timeout_escalates: self.config.gate_timeout_escalates,
                fail_escalates: self.config.gate_fail_escalates,
            },
        );

        let started_at = SystemTime::now();
        let start = Instant::now();
        let (status, request) = waiter.wait(path, deadline, &self.abort).await;

        let outcome = match status {
            NodeStatus::Succeeded => StepOutcome::Succeeded,
            NodeStatus::Failed => StepOutcome::Failed,
            _ => StepOutcome::Aborted,
        };
        let verdict = request
            .verdict()
            .map_or_else(|| "none".to_string(), |v| format!("{v:?}").to_lowercase());
        report.record_step(
            path,
            StepRecord {
                name: "await-verdict".to_string(),
                command: format!("gate {}", request.id),
                outcome,
                exit_code: None,
                stdout: verdict,
                stderr: String::new(),
                started_at,
                duration: start.elapsed(),
            },
        );
        status
    }

    async fn exec_sequential(
        &self,
        node: &StageNode,
        path: &str,
        context: &EnvContext,
        report: &Arc<RunReport>,
        permits: &Arc<Semaphore>,
    ) -> NodeStatus {
        let mut aggregate = NodeStatus::Succeeded;
        let mut halted = false;

        for child in &node.children {
            let child_path = format!("{path}.{}", child.name);
            if halted || self.abort.is_triggered() {
                self.skip_subtree(child, &child_path, report);
                halted = true;
                continue;
            }

            let status = self
                .exec_node(child, child_path, context, report, permits)
                .await;
            match status {
                NodeStatus::Failed | NodeStatus::Aborted => {
                    aggregate = aggregate.worse(status);
                    halted = true;
                }
                NodeStatus::Skipped => halted = true,
                _ => {}
            }
        }

        if aggregate.is_succeeded() && halted {
            // Nothing failed locally; children were cut short by an abort.
            NodeStatus::Aborted
        } else {
            aggregate
        }
    }

    async fn exec_parallel(
        &self,
        node: &StageNode,
        path: &str,
        context: &EnvContext,
        report: &Arc<RunReport>,
        permits: &Arc<Semaphore>,
    ) -> NodeStatus {
        let mut tasks = JoinSet::new();
        for child in node.children.clone() {
            let runner = self.clone();
            let context = context.clone();
            let report = Arc::clone(report);
            let permits = Arc::clone(permits);
            let child_path = format!("{path}.{}", child.name);
            tasks.spawn(async move {
                runner
                    .exec_node(&child, child_path, &context, &report, &permits)
                    .await
            });
        }

        // A failing child never short-circuits its siblings; every
        // started child reaches a terminal state before the group does.
        let mut aggregate = NodeStatus::Succeeded;
        let mut incomplete = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(NodeStatus::Skipped) => incomplete = true,
                Ok(status) => aggregate = aggregate.worse(status),
                Err(err) => {
                    tracing::error!(node = path, %err, "Parallel child task panicked");
                    aggregate = aggregate.worse(NodeStatus::Failed);
                }
            }
        }

        if aggregate.is_succeeded() && incomplete {
            NodeStatus::Aborted
        } else {
            aggregate
        }
    }
}

impl Default for StageGraphRunner {
    fn default() -> Self {
        Self::new(EngineConfig::default(), Collaborators::default())
    }
}
