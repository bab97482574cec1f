//! Run report
//!
//! The report owns a mirror of the stage node tree and aggregates step
//! records, artifact references, and the final status of one run.
//! Parallel children record into it concurrently; a single writer lock
//! serializes mutation so the tree is consistent at seal time. After
//! `seal()` the report is read-only; sealing twice is a no-op.

#![allow(clippy::must_use_candidate)]

use crate::executor::StepRecord;
use crate::graph::definition::GraphDefinition;
use crate::graph::node::{NodeKind, StageNode};
use crate::graph::types::{NodeStatus, RunStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

/// Reference to an archived artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Artifact name, usually the file name
    pub name: String,
    /// Path as reported by the producing step
    pub path: String,
    /// Dotted path of the node whose step produced it
    pub produced_by: String,
}

/// One node of the report's status tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportNode {
    /// Node name
    pub name: String,
    /// Node kind
    pub kind: NodeKind,
    /// Current status
    pub status: NodeStatus,
    /// Step records, in execution order
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub steps: Vec<StepRecord>,
    /// Child nodes, in declared order
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    fn mirror(node: &StageNode) -> Self {
        Self {
            name: node.name.clone(),
            kind: node.kind,
            status: NodeStatus::Pending,
            steps: Vec::new(),
            children: node.children.iter().map(Self::mirror).collect(),
        }
    }

    fn find_mut(&mut self, path: &str) -> Option<&mut ReportNode> {
        let mut segments = path.split('.');
        if segments.next() != Some(self.name.as_str()) {
            return None;
        }
        let mut current = self;
        for segment in segments {
            current = current
                .children
                .iter_mut()
                .find(|c| c.name == segment)?;
        }
        Some(current)
    }

    fn find(&self, path: &str) -> Option<&ReportNode> {
        let mut segments = path.split('.');
        if segments.next() != Some(self.name.as_str()) {
            return None;
        }
        let mut current = self;
        for segment in segments {
            current = current.children.iter().find(|c| c.name == segment)?;
        }
        Some(current)
    }
}

/// Step record from a post-run hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStepRecord {
    /// Hook set the step belonged to (`always`, `on_success`, `on_failure`)
    pub hook_set: String,
    /// The step's result record
    pub record: StepRecord,
}

#[derive(Debug)]
struct Inner {
    root: ReportNode,
    status: Option<RunStatus>,
    artifacts: Vec<ArtifactRef>,
    post_steps: Vec<PostStepRecord>,
    duration: Option<Duration>,
}

/// Aggregated result of one run
#[derive(Debug)]
pub struct RunReport {
    run_id: Uuid,
    name: String,
    started_at: SystemTime,
    started: Instant,
    sealed: AtomicBool,
    inner: Mutex<Inner>,
}

impl RunReport {
    /// Creates a report mirroring the definition's node tree
    #[must_use]
    pub fn new(definition: &GraphDefinition) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            name: definition.display_name().to_string(),
            started_at: SystemTime::now(),
            started: Instant::now(),
            sealed: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                root: ReportNode::mirror(&definition.root),
                status: None,
                artifacts: Vec::new(),
                post_steps: Vec::new(),
                duration: None,
            }),
        }
    }

    /// Unique id of this run
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns true once the report has been sealed
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Transitions the node at `path` to `status`.
    ///
    /// Ignored with a warning after sealing or for unknown paths; those
    /// are recording bugs, never run failures.
    pub fn transition(&self, path: &str, status: NodeStatus) {
        if self.is_sealed() {
            tracing::warn!(path, %status, "Transition on sealed report ignored");
            return;
        }
        let mut inner = self.inner.lock();
        match inner.root.find_mut(path) {
            Some(node) => node.status = status,
            None => tracing::warn!(path, "Transition for unknown node path ignored"),
        }
    }

    /// Appends a step record to the leaf at `path`
    pub fn record_step(&self, path: &str, record: StepRecord) {
        if self.is_sealed() {
            tracing::warn!(path, "Step record on sealed report ignored");
            return;
        }
        let mut inner = self.inner.lock();
        match inner.root.find_mut(path) {
            Some(node) => node.steps.push(record),
            None => tracing::warn!(path, "Step record for unknown node path ignored"),
        }
    }

    /// Appends an artifact reference
    pub fn archive(&self, artifact: ArtifactRef) {
        if self.is_sealed() {
            tracing::warn!(name = %artifact.name, "Artifact on sealed report ignored");
            return;
        }
        self.inner.lock().artifacts.push(artifact);
    }

    /// Appends a post-run hook step record
    pub fn record_post_step(&self, hook_set: &str, record: StepRecord) {
        if self.is_sealed() {
            tracing::warn!(hook_set, "Post step on sealed report ignored");
            return;
        }
        self.inner.lock().post_steps.push(PostStepRecord {
            hook_set: hook_set.to_string(),
            record,
        });
    }

    /// Fixes the final run status and total duration, exactly once.
    ///
    /// Post-run hooks execute after this point and can never change the
    /// status again.
    pub fn finalize(&self, status: RunStatus) {
        let mut inner = self.inner.lock();
        if inner.status.is_some() {
            tracing::warn!("Report already finalized, keeping original status");
            return;
        }
        inner.status = Some(status);
        inner.duration = Some(self.started.elapsed());
    }

    /// Seals the report; all later mutation is ignored.
    ///
    /// Idempotent: a second call is a no-op, not an error.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    /// Final run status.
    ///
    /// A report that was never finalized reads as aborted, matching a
    /// run interrupted before its tree completed.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.inner.lock().status.unwrap_or(RunStatus::Aborted)
    }

    /// Total wall-clock duration of the run
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.inner
            .lock()
            .duration
            .unwrap_or_else(|| self.started.elapsed())
    }

    /// Snapshot of the node at a dotted path, e.g. `"pipeline.build"`
    #[must_use]
    pub fn node(&self, path: &str) -> Option<ReportNode> {
        self.inner.lock().root.find(path).cloned()
    }

    /// Snapshot of the whole status tree
    #[must_use]
    pub fn root(&self) -> ReportNode {
        self.inner.lock().root.clone()
    }

    /// Archived artifacts, in recording order
    #[must_use]
    pub fn artifacts(&self) -> Vec<ArtifactRef> {
        self.inner.lock().artifacts.clone()
    }

    /// Post-run hook records, in execution order
    #[must_use]
    pub fn post_steps(&self) -> Vec<PostStepRecord> {
        self.inner.lock().post_steps.clone()
    }

    /// Renders the report as JSON
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let inner = self.inner.lock();
        serde_json::json!({
            "run_id": self.run_id,
            "name": self.name,
            "status": inner.status,
            "started_at": self.started_at,
            "duration_ms": inner.duration.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            "root": inner.root,
            "artifacts": inner.artifacts,
            "post": inner.post_steps,
        })
    }
}
