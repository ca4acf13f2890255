#![forbid(unsafe_code)]

//! Policy types and backoff math shared by the opflow executor and CLI.
//!
//! Nothing in here performs I/O; the runtime lives in `opflow-exec`.

pub mod backoff;
pub mod error;
pub mod policy;
pub mod status;

pub use crate::backoff::BackoffStrategy;
pub use crate::error::ConfigError;
pub use crate::policy::{OperationPolicy, Preset, UploadPolicy};
pub use crate::status::{StatusClass, NO_CONTENT};
