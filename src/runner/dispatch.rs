//! Post-run hook dispatch
//!
//! Hooks execute after the run status is fixed: `always` first, then the
//! set keyed by the outcome. A hook failure is logged and recorded but
//! never changes the run status and never stops later hooks.

use crate::executor::{AbortSignal, StepExecutor, StepOutcome, StepRecord};
use crate::graph::context::EnvContext;
use crate::graph::node::{StepKind, StepSpec};
use crate::graph::post::PostActions;
use crate::graph::types::RunStatus;
use crate::report::RunReport;
use std::time::{Duration, SystemTime};

/// Runs the terminal hook sets of one run
pub struct PostRunDispatcher<'a> {
    executor: &'a StepExecutor,
    timeout: Duration,
}

impl<'a> PostRunDispatcher<'a> {
    /// Creates a dispatcher with a per-hook timeout
    #[must_use]
    pub fn new(executor: &'a StepExecutor, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    /// Executes every selected hook, recording each into the report.
    ///
    /// Hooks run on a fresh abort signal so cleanup still happens after
    /// an aborted run.
    pub async fn dispatch(
        &self,
        actions: &PostActions,
        status: RunStatus,
        context: &EnvContext,
        report: &RunReport,
    ) {
        if actions.is_empty() {
            return;
        }

        let abort = AbortSignal::new();
        for (hook_set, steps) in actions.selected(status) {
            for (index, step) in steps.iter().enumerate() {
                self.run_hook(hook_set, index, step, context, report, &abort)
                    .await;
            }
        }
    }

    async fn run_hook(
        &self,
        hook_set: &'static str,
        index: usize,
        step: &StepSpec,
        context: &EnvContext,
        report: &RunReport,
        abort: &AbortSignal,
    ) {
        let label = step.label(index);
        let StepKind::Command { command } = &step.kind else {
            tracing::warn!(hook_set, step = %label, "Only command steps run as hooks, skipping");
            return;
        };

        let scoped = if step.env.is_empty() {
            context.clone()
        } else {
            context.overlaid(step.env.iter().cloned())
        };

        match self
            .executor
            .run(&label, command, &step.ok_exit_codes, &scoped, self.timeout, abort)
            .await
        {
            Ok(record) => {
                if !record.outcome.is_succeeded() {
                    tracing::warn!(
                        hook_set,
                        step = %label,
                        outcome = ?record.outcome,
                        "Post hook did not succeed"
                    );
                }
                if let Some(artifact) = &step.artifact {
                    report.archive(super::artifact_ref(
                        scoped.expand(artifact),
                        &format!("post.{hook_set}"),
                    ));
                }
                report.record_post_step(hook_set, record);
            }
            Err(err) => {
                tracing::error!(hook_set, step = %label, %err, "Post hook could not start");
                report.record_post_step(
                    hook_set,
                    StepRecord {
                        name: label,
                        command: command.clone(),
                        outcome: StepOutcome::Failed,
                        exit_code: None,
                        stdout: String::new(),
                        stderr: err.to_string(),
                        started_at: SystemTime::now(),
                        duration: Duration::ZERO,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::definition::GraphDefinition;
    use crate::graph::node::{StageNode, StepSpec};

    fn executor() -> StepExecutor {
        StepExecutor::new("sh", 64 * 1024)
    }

    fn report_for(post: PostActions) -> (GraphDefinition, RunReport) {
        let def = GraphDefinition::builder(StageNode::leaf(
            "pipeline",
            vec![StepSpec::command("true")],
        ))
        .post(post)
        .build()
        .unwrap();
        let report = RunReport::new(&def);
        (def, report)
    }

    #[tokio::test]
    async fn test_always_runs_before_keyed_set() {
        let post = PostActions::new()
            .always(StepSpec::command("echo cleanup"))
            .on_success(StepSpec::command("echo notify"));
        let (def, report) = report_for(post);
        let executor = executor();

        PostRunDispatcher::new(&executor, Duration::from_secs(5))
            .dispatch(&def.post, RunStatus::Succeeded, &def.context(), &report)
            .await;

        let recorded = report.post_steps();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].hook_set, "always");
        assert_eq!(recorded[1].hook_set, "on_success");
    }

    #[tokio::test]
    async fn test_aborted_run_selects_failure_hooks() {
        let post = PostActions::new()
            .on_success(StepSpec::command("echo good"))
            .on_failure(StepSpec::command("echo bad"));
        let (def, report) = report_for(post);
        let executor = executor();

        PostRunDispatcher::new(&executor, Duration::from_secs(5))
            .dispatch(&def.post, RunStatus::Aborted, &def.context(), &report)
            .await;

        let recorded = report.post_steps();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].hook_set, "on_failure");
        assert_eq!(recorded[0].record.stdout.trim(), "bad");
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_stop_later_hooks() {
        let post = PostActions::new()
            .always(StepSpec::command("exit 1"))
            .always(StepSpec::command("echo still-here"));
        let (def, report) = report_for(post);
        let executor = executor();

        PostRunDispatcher::new(&executor, Duration::from_secs(5))
            .dispatch(&def.post, RunStatus::Succeeded, &def.context(), &report)
            .await;

        let recorded = report.post_steps();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].record.outcome, StepOutcome::Failed);
        assert_eq!(recorded[1].record.stdout.trim(), "still-here");
    }

    #[tokio::test]
    async fn test_launch_error_recorded_as_failed_hook() {
        let post = PostActions::new().always(StepSpec::command("true"));
        let (def, report) = report_for(post);
        let executor = StepExecutor::new("/nonexistent/shell", 1024);

        PostRunDispatcher::new(&executor, Duration::from_secs(5))
            .dispatch(&def.post, RunStatus::Succeeded, &def.context(), &report)
            .await;

        let recorded = report.post_steps();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].record.outcome, StepOutcome::Failed);
        assert!(!recorded[0].record.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_hook_artifact_archived() {
        let post = PostActions::new()
            .always(StepSpec::command("true").with_artifact("logs/run.txt"));
        let (def, report) = report_for(post);
        let executor = executor();

        PostRunDispatcher::new(&executor, Duration::from_secs(5))
            .dispatch(&def.post, RunStatus::Succeeded, &def.context(), &report)
            .await;

        let artifacts = report.artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "run.txt");
        assert_eq!(artifacts[0].produced_by, "post.always");
    }

    #[tokio::test]
    async fn test_empty_hooks_record_nothing() {
        let (def, report) = report_for(PostActions::new());
        let executor = executor();

        PostRunDispatcher::new(&executor, Duration::from_secs(5))
            .dispatch(&def.post, RunStatus::Succeeded, &def.context(), &report)
            .await;

        assert!(report.post_steps().is_empty());
    }
}
