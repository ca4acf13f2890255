use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::coordinator::Completion;
use crate::operation::OperationError;
use crate::phase::Phase;

/// Run-state shared between an operation handle and its driving task.
///
/// The phase channel doubles as the run slot: a run holds it from `begin`
/// until `finish` publishes a terminal phase.
pub(crate) struct Control {
    cancel: CancellationToken,
    phase: watch::Sender<Phase>,
    completion: Mutex<Option<Completion>>,
}

impl Control {
    pub(crate) fn new() -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            cancel: CancellationToken::new(),
            phase,
            completion: Mutex::new(None),
        }
    }

    /// Claims the single run slot.
    pub(crate) fn begin(&self, completion: Option<Completion>) -> Result<(), OperationError> {
        if self.cancel.is_cancelled() {
            return Err(OperationError::Aborted);
        }
        let claimed = self.phase.send_if_modified(|current| {
            if current.is_running() {
                return false;
            }
            *current = Phase::Scheduled;
            true
        });
        if !claimed {
            return Err(OperationError::AlreadyRunning);
        }
        *self.completion_slot() = completion;
        Ok(())
    }

    /// Publishes the final phase, which frees the run slot in the same step,
    /// then tells the coordinator.
    pub(crate) fn finish(&self, phase: Phase) {
        debug_assert!(phase.is_terminal());
        // Taken first: once the phase is published a new run may store its own.
        let completion = self.completion_slot().take();
        self.phase.send_replace(phase);
        if let Some(completion) = completion {
            completion.notify();
        }
    }

    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop on behalf of the coordinator, which no longer wants a completion notice.
    pub(crate) fn close(&self) {
        self.completion_slot().take();
        self.cancel.cancel();
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.send_replace(phase);
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Sleeps for `delay` in `phase`. Returns false if the operation was stopped first.
    pub(crate) async fn wait(&self, phase: Phase, delay: Duration) -> bool {
        self.set_phase(phase);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn completion_slot(&self) -> MutexGuard<'_, Option<Completion>> {
        self.completion.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
