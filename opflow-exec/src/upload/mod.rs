//! Binary uploads with progress reporting.
//!
//! Uploads share the request lifecycle contract but never retry or poll:
//! re-sending a partially applied upload is unsafe without idempotency keys.
//! Unlike request operations, closing an upload aborts the transfer itself.

mod builder;
mod driver;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use opflow_core::UploadPolicy;
use tokio::sync::watch;

use crate::callbacks::{Callbacks, ErrorInfo};
use crate::control::Control;
use crate::coordinator::{Actor, Completion};
use crate::operation::OperationError;
use crate::phase::Phase;
use crate::source::Source;
use crate::transport::UploadTransport;

pub use builder::UploadBuilder;

/// Where the bytes come from.
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Source<Vec<u8>>),
    /// Read when the transfer starts.
    File(PathBuf),
}

impl Payload {
    pub(crate) async fn load(&self) -> Result<Vec<u8>, ErrorInfo> {
        match self {
            Payload::Bytes(src) => Ok(src.resolve()),
            Payload::File(path) => tokio::fs::read(path).await.map_err(|e| {
                ErrorInfo::new(format!("failed to read {}: {e}", path.display()), None)
            }),
        }
    }
}

pub(crate) struct UploadDescriptor {
    pub(crate) endpoint: Source<String>,
    pub(crate) method: String,
    pub(crate) headers: Source<std::collections::BTreeMap<String, String>>,
    pub(crate) payload: Payload,
    pub(crate) policy: UploadPolicy,
}

pub(crate) struct UploadInner {
    pub(crate) descriptor: UploadDescriptor,
    pub(crate) transport: Arc<dyn UploadTransport>,
    pub(crate) callbacks: Mutex<Option<Callbacks>>,
    pub(crate) control: Control,
}

/// Handle to an upload. Clones share the same upload.
#[derive(Clone)]
pub struct UploadOperation {
    inner: Arc<UploadInner>,
}

impl UploadOperation {
    pub fn builder(endpoint: impl Into<String>) -> UploadBuilder {
        UploadBuilder::new(Source::Fixed(endpoint.into()))
    }

    pub(crate) fn from_inner(inner: UploadInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn start(&self) -> Result<(), OperationError> {
        self.launch(None)
    }

    /// Aborts the transfer if one is in flight, otherwise just cancels the
    /// pending start. Safe to call at any time, any number of times.
    pub fn close(&self) {
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

        handle.spawn(driver::drive(self.inner.clone(), callbacks));
        Ok(())
    }
}

impl Actor for UploadOperation {
    fn start(&self, completion: Completion) -> Result<(), OperationError> {
        self.launch(Some(completion))
    }

    fn close(&self) {
        self.inner.control.close();
    }
}
