//! Transport seams: one buffered request/response call per attempt, or one
//! streaming upload with progress ticks.

mod http;
mod upload;

use std::collections::BTreeMap;

pub use http::{default_transport, ReqwestTransport, Transport};
pub use upload::{default_upload_transport, ProgressEvent, ProgressSender, ReqwestUploadTransport, UploadTransport};

/// Shared client setup for the reqwest transports.
///
/// Building only fails if the TLS backend cannot initialise, which no caller
/// can recover from.
pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("opflow-exec/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            panic!("failed to create reqwest HTTP client: {e}. This is a bug - please report it.");
        })
}

/// Response bodies above this size are rejected by the reqwest transports.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: String,
    pub url: url::Url,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ResponseParts {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// No response was received (or it could not be read).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("timeout")]
    Timeout,
    #[error("connect/dns/tls error: {0}")]
    Network(String),
    #[error("response too large (>{max_bytes} bytes)")]
    ResponseTooLarge { max_bytes: usize },
    #[error("transport error: {0}")]
    Other(String),
}
