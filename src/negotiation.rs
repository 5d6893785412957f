//! Two-phase device access negotiation.
//!
//! A [`Negotiation`] starts out pending with its [`DeviceAccessResult`]
//! available for inspection. The caller resumes it at most once, from any
//! thread, with the action it decided on; or abandons it. Resuming with a
//! proceeding action schedules the session change on the session queue and
//! hands back a [`Completion`] for its outcome.

use crate::access::{classify_action, DeviceAccessAction, DeviceAccessResult, DeviceAccessState};
use crate::coordinator::PendingAttach;
use crate::errors::{AccessError, EngineError, Result};
use crate::permissions::PermissionKind;
use crate::session::DeviceInput;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// What finally happened to a resumed negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AccessOutcome {
    /// The input is attached to the session.
    Installed(DeviceInput),
    /// The caller chose not to proceed; the session was not touched.
    Skipped(DeviceAccessAction),
    /// Follow-up result explaining why the input could not be attached.
    Failed(DeviceAccessResult),
}

impl AccessOutcome {
    /// Why the input was not attached. `None` for installed and skipped outcomes.
    pub fn error(&self) -> Option<AccessError> {
        match self {
            AccessOutcome::Installed(_) | AccessOutcome::Skipped(_) => None,
            AccessOutcome::Failed(result) => match &result.state {
                DeviceAccessState::Other(message) => {
                    Some(AccessError::InputConstructionFailed(message.clone()))
                }
                state => state.to_error(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationPhase {
    Pending,
    Resumed,
    Abandoned,
}

enum Phase {
    Pending(PendingAttach),
    Resumed,
    Abandoned,
}

impl Phase {
    fn public(&self) -> NegotiationPhase {
        match self {
            Phase::Pending(_) => NegotiationPhase::Pending,
            Phase::Resumed => NegotiationPhase::Resumed,
            Phase::Abandoned => NegotiationPhase::Abandoned,
        }
    }
}

pub struct Negotiation {
    id: Uuid,
    started_at: DateTime<Utc>,
    result: DeviceAccessResult,
    phase: Mutex<Phase>,
}

impl Negotiation {
    pub(crate) fn new(result: DeviceAccessResult, attach: PendingAttach) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            result,
            phase: Mutex::new(Phase::Pending(attach)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn kind(&self) -> PermissionKind {
        self.result.kind
    }

    pub fn result(&self) -> &DeviceAccessResult {
        &self.result
    }

    /// The action the default policy would take for this result.
    pub fn suggested_action(&self) -> DeviceAccessAction {
        classify_action(&self.result)
    }

    pub fn phase(&self) -> NegotiationPhase {
        self.lock_phase().public()
    }

    pub fn is_pending(&self) -> bool {
        self.phase() == NegotiationPhase::Pending
    }

    /// Continue the negotiation with `action`.
    ///
    /// Fails with [`EngineError::AlreadyResumed`] on every call after the
    /// first, and after [`abandon`](Self::abandon).
    pub fn resume(&self, action: DeviceAccessAction) -> Result<Completion> {
        let attach = {
            let mut phase = self.lock_phase();
            match std::mem::replace(&mut *phase, Phase::Resumed) {
                Phase::Pending(attach) => attach,
                other => {
                    *phase = other;
                    return Err(EngineError::AlreadyResumed);
                }
            }
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        if action.proceeds() {
            log::info!("Resuming {} negotiation {} with {}", self.result.kind, self.id, action);
            attach.run(action, tx)?;
        } else {
            // Inputs attached earlier stay in place on this path.
            log::info!(
                "Negotiation {} resumed with {}, leaving the session unchanged",
                self.id,
                action
            );
            let _ = tx.send(AccessOutcome::Skipped(action));
        }

        Ok(Completion { rx })
    }

    /// Resume with [`suggested_action`](Self::suggested_action).
    pub fn resume_with_default(&self) -> Result<Completion> {
        self.resume(self.suggested_action())
    }

    /// Give up on the negotiation. Returns `false` when it was no longer pending.
    pub fn abandon(&self) -> bool {
        let mut phase = self.lock_phase();
        if matches!(*phase, Phase::Pending(_)) {
            *phase = Phase::Abandoned;
            log::debug!("Negotiation {} abandoned", self.id);
            true
        } else {
            false
        }
    }

    fn lock_phase(&self) -> std::sync::MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Negotiation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiation")
            .field("id", &self.id)
            .field("result", &self.result)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Drop for Negotiation {
    fn drop(&mut self) {
        if self.is_pending() {
            log::debug!(
                "Negotiation {} for {} dropped without being resumed",
                self.id,
                self.result.kind
            );
        }
    }
}

/// Receives the [`AccessOutcome`] of a resumed negotiation.
///
/// The session queue sends exactly one outcome; if the queue shuts down
/// before running the attach, every receive reports `QueueClosed`.
#[derive(Debug)]
pub struct Completion {
    rx: Receiver<AccessOutcome>,
}

impl Completion {
    /// Block until the outcome is available.
    ///
    /// Blocks the calling thread; async callers use [`outcome`](Self::outcome).
    pub fn wait(self) -> Result<AccessOutcome> {
        self.rx.recv().map_err(|_| EngineError::QueueClosed)
    }

    /// Block for at most `timeout`. `Ok(None)` means the outcome is not ready yet.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<AccessOutcome>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::QueueClosed),
        }
    }

    pub fn try_outcome(&self) -> Result<Option<AccessOutcome>> {
        match self.rx.try_recv() {
            Ok(outcome) => Ok(Some(outcome)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(EngineError::QueueClosed),
        }
    }

    /// Await the outcome without blocking the runtime's worker threads.
    pub async fn outcome(self) -> Result<AccessOutcome> {
        let rx = self.rx;
        tokio::task::spawn_blocking(move || rx.recv())
            .await
            .map_err(|e| {
                log::error!("Completion wait task failed: {}", e);
                EngineError::QueueClosed
            })?
            .map_err(|_| EngineError::QueueClosed)
    }
}
