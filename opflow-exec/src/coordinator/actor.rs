use std::sync::Weak;

use crate::coordinator::{Coordinator, Shared};
use crate::operation::OperationError;

/// A unit of work the [`Coordinator`] can admit.
///
/// `start` must return promptly (spawn, don't block) and arrange for
/// `completion.notify()` to be called once the work has finished. `close`
/// stops the work; after it the coordinator no longer expects a notice.
pub trait Actor: Send + Sync {
    fn start(&self, completion: Completion) -> Result<(), OperationError>;
    fn close(&self);
}

/// Per-actor completion handle owned by the coordinator's admission logic.
pub struct Completion {
    id: String,
    coordinator: Weak<Shared>,
}

impl Completion {
    pub(crate) fn new(id: String, coordinator: Weak<Shared>) -> Self {
        Self { id, coordinator }
    }

    /// A handle that notifies nobody, for driving actors outside a coordinator.
    pub fn detached(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            coordinator: Weak::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tells the coordinator this actor is done. Consumes the handle so it can
    /// only be sent once.
    pub fn notify(self) {
        let Some(shared) = self.coordinator.upgrade() else {
            return;
        };
        let coordinator = Coordinator { shared };
        if let Err(e) = coordinator.complete(&self.id) {
            // The actor was removed or the coordinator closed while it was finishing.
            tracing::debug!(id = %self.id, error = %e, "ignoring late completion");
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").field("id", &self.id).finish()
    }
}
