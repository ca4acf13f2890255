#![forbid(unsafe_code)]

//! Runtime engine for opflow: a retrying/polling request executor, a
//! progress-reporting upload operation and a coordinator that bounds how many
//! of them run at once.
//!
//! Policy types and backoff math live in `opflow-core`.

pub mod callbacks;
pub mod coordinator;
pub mod operation;
pub mod phase;
mod response;
pub mod source;
pub mod transport;
pub mod upload;

mod control;

pub use opflow_core::{BackoffStrategy, ConfigError, OperationPolicy, Preset, UploadPolicy};

pub use crate::callbacks::ErrorInfo;
pub use crate::coordinator::{Actor, Completion, Coordinator, CoordinatorBuilder, CoordinatorError};
pub use crate::operation::{Operation, OperationBuilder, OperationError, RequestParams};
pub use crate::phase::Phase;
pub use crate::source::Source;
pub use crate::transport::{
    ProgressEvent, ReqwestTransport, ReqwestUploadTransport, RequestParts, ResponseParts,
    Transport, TransportError, UploadTransport,
};
pub use crate::upload::{UploadBuilder, UploadOperation};
