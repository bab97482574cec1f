//! Quality gate waiter
//!
//! A gate is a special leaf: on entry it publishes a request to the
//! external verdict channel and suspends its stage until a verdict
//! arrives or the deadline elapses. A timeout resolves the node aborted
//! and, by default, escalates to a full-run abort: a silent gate signals
//! an unreliable external system, so further execution is unsafe. A fail
//! verdict is an ordinary stage failure unless configured to escalate.

use crate::executor::{AbortSignal, GateChannel, GateVerdict};
use crate::graph::types::NodeStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One outstanding verdict request.
///
/// The verdict slot is written exactly once, by the first resolution
/// (external verdict, timeout, or run abort).
#[derive(Debug)]
pub struct GateRequest {
    /// Unique request id published to the external channel
    pub id: Uuid,
    /// Deadline after which the request resolves as timed out
    pub deadline: Duration,
    verdict: Mutex<Option<GateVerdict>>,
}

impl GateRequest {
    /// Creates a pending request
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            deadline,
            verdict: Mutex::new(None),
        }
    }

    /// Sets the verdict; only the first resolution sticks
    pub fn resolve(&self, verdict: GateVerdict) {
        let mut slot = self.verdict.lock();
        if slot.is_none() {
            *slot = Some(verdict);
        }
    }

    /// The recorded verdict, if resolved
    #[must_use]
    pub fn verdict(&self) -> Option<GateVerdict> {
        *self.verdict.lock()
    }
}

/// Escalation policy for gate outcomes
#[derive(Debug, Clone, Copy)]
pub struct GatePolicy {
    /// Abort the whole run when the deadline elapses with no verdict
    pub timeout_escalates: bool,
    /// Abort the whole run on a fail verdict as well
    pub fail_escalates: bool,
}

/// Blocks a stage awaiting an external verdict
pub struct QualityGateWaiter {
    channel: Arc<dyn GateChannel>,
    policy: GatePolicy,
}

impl QualityGateWaiter {
    /// Creates a waiter around a verdict channel
    #[must_use]
    pub fn new(channel: Arc<dyn GateChannel>, policy: GatePolicy) -> Self {
        Self { channel, policy }
    }

    /// Suspends until the gate resolves, returning the node's status.
    ///
    /// Returns the resolved request alongside the status so the caller
    /// can record the verdict.
    pub async fn wait(
        &self,
        node_path: &str,
        deadline: Duration,
        abort: &AbortSignal,
    ) -> (NodeStatus, GateRequest) {
        let request = GateRequest::new(deadline);
        tracing::info!(
            node = node_path,
            request_id = %request.id,
            ?deadline,
            "Quality gate waiting for verdict"
        );

        let verdict = tokio::select! {
            verdict = self.channel.await_verdict(request.id, deadline) => verdict,
            () = abort.cancelled() => {
                request.resolve(GateVerdict::Timeout);
                tracing::warn!(node = node_path, "Quality gate interrupted by run abort");
                return (NodeStatus::Aborted, request);
            }
        };
        request.resolve(verdict);

        let status = match verdict {
            GateVerdict::Pass => {
                tracing::info!(node = node_path, "Quality gate passed");
                NodeStatus::Succeeded
            }
            GateVerdict::Fail => {
                if self.policy.fail_escalates {
                    tracing::error!(node = node_path, "Quality gate failed, aborting run");
                    abort.trigger(format!("quality gate '{node_path}' failed"));
                } else {
                    tracing::error!(node = node_path, "Quality gate failed");
                }
                NodeStatus::Failed
            }
            GateVerdict::Timeout => {
                if self.policy.timeout_escalates {
                    tracing::error!(
                        node = node_path,
                        "Quality gate timed out, aborting run"
                    );
                    abort.trigger(format!("quality gate '{node_path}' timed out"));
                } else {
                    tracing::error!(node = node_path, "Quality gate timed out");
                }
                NodeStatus::Aborted
            }
        };

        (status, request)
    }
}
