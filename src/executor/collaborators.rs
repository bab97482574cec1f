//! External collaborator contracts
//!
//! The engine talks to the outside world through two narrow seams: the
//! source collaborator that resolves a revision id at the start of the
//! run, and the quality-gate channel that delivers an asynchronous
//! pass/fail verdict. Everything else (build, test, scan, publish,
//! deploy) is an opaque command handled by the step executor.

use crate::graph::errors::EngineError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Verdict delivered on the quality-gate channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    /// The external system accepted the submission
    Pass,
    /// The external system rejected the submission
    Fail,
    /// The deadline elapsed with no verdict
    Timeout,
}

/// Source collaborator: one call at run start resolving the revision id
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Checks out the source and returns the resolved revision id
    async fn checkout(&self) -> Result<String, EngineError>;
}

/// Asynchronous quality-gate verdict channel
#[async_trait]
pub trait GateChannel: Send + Sync {
    /// Blocks until a verdict arrives or the deadline elapses
    async fn await_verdict(&self, request_id: Uuid, deadline: Duration) -> GateVerdict;
}

/// Source collaborator backed by a shell command.
///
/// The command's trimmed stdout becomes the revision id, e.g.
/// `git rev-parse --short HEAD`.
#[derive(Debug, Clone)]
pub struct CommandSource {
    command: String,
}

impl CommandSource {
    /// Creates a command-backed source collaborator
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for CommandSource {
    fn default() -> Self {
        Self::new("git rev-parse --short HEAD")
    }
}

#[async_trait]
impl SourceControl for CommandSource {
    async fn checkout(&self) -> Result<String, EngineError> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|e| EngineError::Launch {
                command: self.command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(EngineError::Checkout(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if revision.is_empty() {
            return Err(EngineError::Checkout("empty revision id".to_string()));
        }
        Ok(revision)
    }
}

/// Gate channel that never receives a verdict.
///
/// Used when no external reporting system is wired up; every gate then
/// resolves by deadline expiry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentGate;

#[async_trait]
impl GateChannel for SilentGate {
    async fn await_verdict(&self, request_id: Uuid, deadline: Duration) -> GateVerdict {
        tracing::debug!(%request_id, ?deadline, "No gate channel configured, waiting out deadline");
        tokio::time::sleep(deadline).await;
        GateVerdict::Timeout
    }
}

/// In-process gate channel fed by a [`GateHandle`].
///
/// The embedding application holds the handle and posts the verdict when
/// the external callback arrives.
#[derive(Debug, Clone)]
pub struct ManualGate {
    rx: watch::Receiver<Option<GateVerdict>>,
}

/// Publisher side of a [`ManualGate`]
#[derive(Debug, Clone)]
pub struct GateHandle {
    tx: Arc<watch::Sender<Option<GateVerdict>>>,
}

impl ManualGate {
    /// Creates a connected channel/handle pair
    #[must_use]
    pub fn new() -> (Self, GateHandle) {
        let (tx, rx) = watch::channel(None);
        (Self { rx }, GateHandle { tx: Arc::new(tx) })
    }
}

impl GateHandle {
    /// Posts the verdict; the slot is write-once, later posts are ignored
    pub fn resolve(&self, verdict: GateVerdict) {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(verdict);
                true
            } else {
                false
            }
        });
    }
}

#[async_trait]
impl GateChannel for ManualGate {
    async fn await_verdict(&self, request_id: Uuid, deadline: Duration) -> GateVerdict {
        let mut rx = self.rx.clone();
        let wait = async {
            loop {
                if let Some(verdict) = *rx.borrow_and_update() {
                    return verdict;
                }
                if rx.changed().await.is_err() {
                    return GateVerdict::Timeout;
                }
            }
        };
        match tokio::time::timeout(deadline, wait).await {
            Ok(verdict) => verdict,
            Err(_) => {
                tracing::debug!(%request_id, "Gate deadline elapsed with no verdict");
                GateVerdict::Timeout
            }
        }
    }
}

/// The set of collaborators one run is wired to
#[derive(Clone)]
pub struct Collaborators {
    /// Source collaborator used by checkout steps
    pub source: Arc<dyn SourceControl>,
    /// Quality-gate verdict channel
    pub gate: Arc<dyn GateChannel>,
}

impl Collaborators {
    /// Creates a collaborator set
    #[must_use]
    pub fn new(source: Arc<dyn SourceControl>, gate: Arc<dyn GateChannel>) -> Self {
        Self { source, gate }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            source: Arc::new(CommandSource::default()),
            gate: Arc::new(SilentGate),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
