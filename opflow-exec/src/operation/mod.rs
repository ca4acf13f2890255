//! Request operations: one logical network interaction driven through its
//! attempt/retry/poll lifecycle.

mod builder;
mod driver;
mod state;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use opflow_core::OperationPolicy;
use serde_json::Value as JsonValue;
use tokio::sync::watch;

use crate::callbacks::Callbacks;
use crate::control::Control;
use crate::coordinator::{Actor, Completion};
use crate::phase::Phase;
use crate::source::Source;
use crate::transport::Transport;

pub use builder::OperationBuilder;
pub use state::OperationState;

pub type PollPredicate = Arc<dyn Fn(&JsonValue, u16) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("operation is already running")]
    AlreadyRunning,
    #[error("operation was stopped and cannot be restarted")]
    Aborted,
    #[error("no tokio runtime available to drive the operation")]
    NoRuntime,
}

/// Method, headers and body sent on each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }
}

pub(crate) struct Descriptor {
    pub(crate) endpoint: Source<String>,
    pub(crate) params: Source<RequestParams>,
    pub(crate) policy: OperationPolicy,
    pub(crate) should_poll: Option<PollPredicate>,
}

pub(crate) struct Inner {
    pub(crate) descriptor: Descriptor,
    pub(crate) transport: Arc<dyn Transport>,
    /// Parked here between runs; the driving task owns them while running.
    pub(crate) callbacks: Mutex<Option<Callbacks>>,
    pub(crate) control: Control,
}

/// Handle to a request operation. Clones share the same operation.
#[derive(Clone)]
pub struct Operation {
    inner: Arc<Inner>,
}

impl Operation {
    pub fn builder(endpoint: impl Into<String>) -> OperationBuilder {
        OperationBuilder::new(Source::Fixed(endpoint.into()), OperationPolicy::default())
    }

    pub fn foreground(endpoint: impl Into<String>) -> OperationBuilder {
        OperationBuilder::new(Source::Fixed(endpoint.into()), OperationPolicy::foreground())
    }

    pub fn background(endpoint: impl Into<String>) -> OperationBuilder {
        OperationBuilder::new(Source::Fixed(endpoint.into()), OperationPolicy::background())
    }

    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Schedules the first attempt after the start delay and returns immediately.
    pub fn start(&self) -> Result<(), OperationError> {
        self.launch(None)
    }

    /// Cancels any pending wait and marks the operation aborted. Idempotent.
    ///
    /// An attempt already in flight is not interrupted; its result is reported
    /// through `post_load` followed by `abort`.
    pub fn stop(&self) {
        self.inner.control.stop();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.control.is_aborted()
    }

    pub fn phase(&self) -> Phase {
        self.inner.control.phase()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.inner.control.subscribe()
    }

    pub fn policy(&self) -> &OperationPolicy {
        &self.inner.descriptor.policy
    }

    fn launch(&self, completion: Option<Completion>) -> Result<(), OperationError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| OperationError::NoRuntime)?;
        self.inner.control.begin(completion)?;

        let callbacks = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();

        let inner = self.inner.clone();
        handle.spawn(driver::drive(inner, callbacks));
        Ok(())
    }
}

impl Actor for Operation {
    fn start(&self, completion: Completion) -> Result<(), OperationError> {
        self.launch(Some(completion))
    }

    fn close(&self) {
        self.inner.control.close();
    }
}
